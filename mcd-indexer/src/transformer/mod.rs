use thiserror::Error;

use mcd_core::{
    layout::{DecodeError, StorageKey},
    storage::StorageError,
};

pub mod event;
pub mod registry;
pub mod storage;

/// Schema holding every MCD fact table.
pub(crate) const MAKER_SCHEMA: &str = "maker";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("Transformer setup failed: {0}")]
    Setup(String),
    /// A single diff or log could not be decoded. Skipped, never retried.
    #[error("Failed to decode: {0}")]
    Decode(String),
    /// The key is unknown even after reloading every dynamic key.
    #[error("Unrecognized storage key {key:#x} for contract {contract}")]
    UnknownStorageKey { contract: String, key: StorageKey },
    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),
    /// The lookup produced metadata the repository can not write. This is a
    /// bug, not bad data.
    #[error("Dispatch mismatch: {0}")]
    DispatchMismatch(String),
}

impl From<DecodeError> for ExtractionError {
    fn from(value: DecodeError) -> Self {
        ExtractionError::Decode(value.to_string())
    }
}
