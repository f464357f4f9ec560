//! Chain records handed to the transformers by the chain-sync collaborator.
use ethers::types::{Bytes, H160, H256};
use serde::{Deserialize, Serialize};

use crate::hash_to_hex;

/// A block header as persisted by chain-sync.
///
/// `id` is the stable surrogate key assigned once the header is stored;
/// event facts and checked-header markers reference it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub id: i64,
    pub block_number: i64,
    pub hash: String,
    pub timestamp: i64,
}

impl Header {
    pub fn new(id: i64, block_number: i64, hash: &H256, timestamp: i64) -> Self {
        Header { id, block_number, hash: hash_to_hex(hash), timestamp }
    }
}

/// A single observed storage slot write.
///
/// Diffs are immutable and may be redelivered; processing the same diff
/// twice must not change persisted state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDiff {
    pub contract: H160,
    pub block_height: u64,
    pub block_hash: H256,
    pub storage_key: H256,
    pub value: H256,
}

impl StorageDiff {
    pub fn new(
        contract: H160,
        block_height: u64,
        block_hash: H256,
        storage_key: H256,
        value: H256,
    ) -> Self {
        StorageDiff { contract, block_height, block_hash, storage_key, value }
    }

    pub fn block(&self) -> BlockRef {
        BlockRef { number: self.block_height, hash: self.block_hash }
    }
}

/// Block coordinates of a storage fact, as reported by the diff.
///
/// The hash is not guaranteed to be canonical.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub number: u64,
    pub hash: H256,
}

/// A raw event log, already filtered for the contracts we index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    pub address: H160,
    pub topics: Vec<H256>,
    pub data: Bytes,
    pub block_number: u64,
    pub block_hash: H256,
    pub tx_index: u64,
    pub log_index: u64,
}

/// An event log joined with the header it was synced under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSyncLog {
    pub header_id: i64,
    pub log: EventLog,
}
