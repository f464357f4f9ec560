//! # Storage diff transformers
//!
//! A storage transformer turns a single diff of one contract into fact rows:
//!
//! 1. [`StorageKeysLookup`] maps the storage key to the field it holds,
//!    reloading dynamic keys on a miss.
//! 2. The field metadata decodes the raw value, fanning packed slots out into
//!    one value per member.
//! 3. The contract's [`StorageRepository`] turns every member into a
//!    [`StorageWrite`].
//! 4. The [`StorageGateway`] persists all writes of the diff atomically.
//!
//! Contract layouts live in [`auction`], [`vat`], [`jug`] and [`cat`]. Each
//! declares a closed field enum shared by its layout and its repository, so
//! every field the lookup can produce has to be handled by the repository.
use std::fmt::Debug;

use async_trait::async_trait;
use ethers::types::H160;
use mockall::automock;
use tracing::{debug, instrument, warn};

use mcd_core::{
    checksum,
    insertion::StorageWrite,
    layout::{DecodeError, DecodedValue, StorageKey, ValueMetadata},
    models::StorageDiff,
    storage::{IdentifierClass, KnownIdentifier, StorageError},
};
use mcd_storage::postgres::PooledGateway;

use crate::transformer::ExtractionError;

pub mod auction;
pub mod cat;
mod facts;
pub mod jug;
pub mod lookup;
pub mod vat;

pub use lookup::{LookupState, StorageKeysLookup};

/// Solidity storage layout of one contract.
pub trait StorageLayout: Send + Sync {
    type Field: Copy + Debug + Eq + Send + Sync + 'static;
    /// Identifier classes dynamic keys are derived from.
    type Class: Copy + Debug + Send + Sync;

    /// Keys of the contract's static variables.
    fn static_keys(&self) -> Vec<(StorageKey, ValueMetadata<Self::Field>)>;

    fn identifier_classes(&self) -> Vec<(Self::Class, &'static IdentifierClass)>;

    /// Every key implied by a single identifier of `class`, e.g. all members
    /// of the struct stored under a bid id.
    fn dynamic_keys(
        &self,
        class: Self::Class,
        identifier: &KnownIdentifier,
    ) -> Result<Vec<(StorageKey, ValueMetadata<Self::Field>)>, DecodeError>;
}

/// Routes decoded values of one contract to the tables holding them.
pub trait StorageRepository: Send + Sync {
    type Field: Copy + Debug;

    /// Describes the write of a single scalar member.
    fn write(
        &self,
        diff: &StorageDiff,
        metadata: &ValueMetadata<Self::Field>,
        field: Self::Field,
        value: &DecodedValue,
    ) -> Result<StorageWrite, ExtractionError>;

    /// Describes the writes of a decoded slot. Packed slots produce one write
    /// per member.
    fn writes(
        &self,
        diff: &StorageDiff,
        metadata: &ValueMetadata<Self::Field>,
        values: &[(Self::Field, DecodedValue)],
    ) -> Result<Vec<StorageWrite>, ExtractionError> {
        values
            .iter()
            .map(|(field, value)| self.write(diff, metadata, *field, value))
            .collect()
    }
}

#[automock]
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Persists the writes of a single diff in one transaction, returns the
    /// number of newly inserted rows.
    async fn persist(&self, writes: &[StorageWrite]) -> Result<usize, StorageError>;
}

pub struct StoragePgGateway {
    state_gateway: PooledGateway,
}

impl StoragePgGateway {
    pub fn new(state_gateway: PooledGateway) -> Self {
        Self { state_gateway }
    }
}

#[async_trait]
impl StorageGateway for StoragePgGateway {
    async fn persist(&self, writes: &[StorageWrite]) -> Result<usize, StorageError> {
        self.state_gateway
            .persist_storage_writes(writes)
            .await
    }
}

/// Handles the diffs of a single contract.
#[automock]
#[async_trait]
pub trait DiffTransformer: Send + Sync {
    fn contract(&self) -> H160;

    /// Decodes and persists a diff, returns the number of inserted rows.
    async fn execute(&self, diff: &StorageDiff) -> Result<usize, ExtractionError>;
}

pub struct StorageTransformer<L: StorageLayout, R, G> {
    name: String,
    lookup: StorageKeysLookup<L>,
    repository: R,
    gateway: G,
}

impl<L, R, G> StorageTransformer<L, R, G>
where
    L: StorageLayout,
    R: StorageRepository<Field = L::Field>,
    G: StorageGateway,
{
    pub fn new(name: &str, lookup: StorageKeysLookup<L>, repository: R, gateway: G) -> Self {
        Self { name: name.to_owned(), lookup, repository, gateway }
    }
}

#[async_trait]
impl<L, R, G> DiffTransformer for StorageTransformer<L, R, G>
where
    L: StorageLayout,
    R: StorageRepository<Field = L::Field>,
    G: StorageGateway,
{
    fn contract(&self) -> H160 {
        self.lookup.contract()
    }

    #[instrument(skip_all, fields(name = %self.name, block = diff.block_height))]
    async fn execute(&self, diff: &StorageDiff) -> Result<usize, ExtractionError> {
        if diff.contract != self.lookup.contract() {
            return Err(ExtractionError::DispatchMismatch(format!(
                "diff of {} routed to {}",
                checksum(&diff.contract),
                self.name
            )));
        }
        let metadata = self
            .lookup
            .lookup(&diff.storage_key)
            .await?;
        let values = metadata
            .decode(diff.value.as_bytes())
            .map_err(|err| {
                warn!(field = ?metadata.field, %err, "StorageValueDecodeFailed");
                ExtractionError::from(err)
            })?;
        let writes = self
            .repository
            .writes(diff, &metadata, &values)?;
        let inserted = self.gateway.persist(&writes).await?;
        debug!(
            field = ?metadata.field,
            tables = ?writes.iter().map(StorageWrite::table).collect::<Vec<_>>(),
            inserted,
            "DiffTransformed"
        );
        Ok(inserted)
    }
}
