//! Storage traits used by the MCD transformers
use async_trait::async_trait;
use ethers::types::H160;
use mockall::automock;
use thiserror::Error;

use crate::models::Header;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Could not find {0} with id `{1}`!")]
    NotFound(String, String),
    #[error("The entity {0} with id {1} was already present!")]
    DuplicateEntry(String, String),
    #[error("Could not find related {0} for {1} with id `{2}`!")]
    NoRelatedEntity(String, String, String),
    #[error("DecodeError: {0}")]
    DecodeError(String),
    #[error("Unexpected storage error: {0}")]
    Unexpected(String),
    #[error("Currently unsupported operation: {0}")]
    Unsupported(String),
}

/// A column of an event table holding an identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdentifierColumn {
    /// Column stored as is, e.g. a bid id or an urn owner address.
    Plain(&'static str),
    /// The `ilk_id` foreign key, reported as the 0x prefixed ilk.
    Ilk,
}

/// One event table that may introduce identifiers of a class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IdentifierColumns {
    pub table: &'static str,
    pub primary: IdentifierColumn,
    /// Set for classes keyed by two identifiers, e.g. (ilk, guy) of an urn.
    pub secondary: Option<IdentifierColumn>,
}

impl IdentifierColumns {
    pub const fn single(table: &'static str, primary: IdentifierColumn) -> Self {
        IdentifierColumns { table, primary, secondary: None }
    }

    pub const fn pair(
        table: &'static str,
        primary: IdentifierColumn,
        secondary: IdentifierColumn,
    ) -> Self {
        IdentifierColumns { table, primary, secondary: Some(secondary) }
    }
}

/// A class of dynamic identifiers and every table it can first appear in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IdentifierClass {
    pub name: &'static str,
    pub sources: &'static [IdentifierColumns],
}

/// An identifier observed for a contract. `secondary` is set for paired
/// classes only.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KnownIdentifier {
    pub primary: String,
    pub secondary: Option<String>,
}

impl KnownIdentifier {
    pub fn single(primary: impl Into<String>) -> Self {
        KnownIdentifier { primary: primary.into(), secondary: None }
    }

    pub fn pair(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        KnownIdentifier { primary: primary.into(), secondary: Some(secondary.into()) }
    }
}

/// Read only view over identifiers already persisted by the event
/// transformers.
#[automock]
#[async_trait]
pub trait IdentifierSource: Send + Sync {
    /// Retrieves every identifier of a class observed for a contract.
    ///
    /// # Parameters
    /// - `contract`: address of the emitting contract, events of other
    ///   contracts are ignored.
    /// - `class`: the identifier class, listing the tables to union over.
    ///
    /// # Returns
    /// A duplicate free list of identifiers, in no particular order.
    async fn known_identifiers(
        &self,
        contract: &H160,
        class: &IdentifierClass,
    ) -> Result<Vec<KnownIdentifier>, StorageError>;
}

/// Tracks which headers a decoder has processed.
///
/// Markers are written by the event transformers; this trait exposes them
/// to the scheduler that redelivers headers.
#[automock]
#[async_trait]
pub trait CheckedHeadersGateway: Send + Sync {
    /// Headers within `[from, to]` that `label` never processed.
    async fn missing_headers(
        &self,
        label: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<Header>, StorageError>;

    /// Headers within `[from, to]` that `label` processed fewer times than
    /// the configured recheck cap.
    async fn recheck_headers(
        &self,
        label: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<Header>, StorageError>;
}
