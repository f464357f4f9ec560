//! # Storage layout engine
//!
//! Reproduces enough of the Solidity storage layout of the indexed contracts
//! to map an opaque 32 byte storage key back to a named, typed field.
//!
//! * [`keys`] derives storage keys for static slots, (nested) mappings and
//!   struct members following a mapping base slot.
//! * [`codec`] interprets a raw 32 byte slot value, including slots packing
//!   several struct members.
//! * [`metadata`] ties a storage key to the field it holds, together with the
//!   identifiers (bid id, ilk, guy) needed to tell which entity it belongs to.
use thiserror::Error;

pub mod codec;
pub mod keys;
pub mod metadata;

pub use codec::{DecodedValue, ValueType};
pub use keys::StorageKey;
pub use metadata::{KeyName, ValueMetadata};

/// Structural decode failures.
///
/// These are fatal for the record being decoded and are never retried.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("{0:?} can not be a member of a packed slot")]
    UnsupportedPackedMember(ValueType),
    #[error("Packed members span {0} bytes, a slot only holds 32")]
    PackedOverflow(usize),
    #[error("Packed slot decoded without member types")]
    MissingPackedTypes,
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}
