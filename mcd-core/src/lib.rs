pub mod insertion;
pub mod layout;
pub mod models;
pub mod storage;

#[cfg(test)]
#[macro_use]
extern crate pretty_assertions;

use ethers::types::{H160, H256};
use tiny_keccak::{Hasher, Keccak};

/// Compute the Keccak-256 hash of input bytes.
///
/// Note that strings are interpreted as UTF-8 bytes,
pub fn keccak256<T: AsRef<[u8]>>(bytes: T) -> [u8; 32] {
    let mut output = [0u8; 32];

    let mut hasher = Keccak::v256();
    hasher.update(bytes.as_ref());
    hasher.finalize(&mut output);

    output
}

/// Formats a 32 byte hash as a full, 0x prefixed lower case hex string.
///
/// `H256`'s `Display` impl abbreviates the value, which is not what we want
/// to persist or compare against.
pub fn hash_to_hex(hash: &H256) -> String {
    format!("0x{}", hex::encode(hash.as_bytes()))
}

/// EIP-55 checksummed form of an address, the canonical textual form we
/// persist and match addresses by.
pub fn checksum(address: &H160) -> String {
    ethers::utils::to_checksum(address, None)
}

/// Human readable form of a right padded `bytes32` string, e.g. an ilk
/// (`ETH-A`) or a `file` parameter name (`duty`).
///
/// Bytes after the first zero byte are dropped; invalid UTF-8 is replaced.
pub fn bytes32_to_string(word: &H256) -> String {
    let bytes = word.as_bytes();
    let end = bytes
        .iter()
        .position(|b| *b == 0)
        .unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
