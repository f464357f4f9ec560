//! Decoding of raw slot values into typed scalars.
use ethers::{
    types::{H160, H256, U256},
    utils::to_checksum,
};

use super::DecodeError;
use crate::hash_to_hex;

const WORD: usize = 32;

/// Solidity types a storage slot (or a packed member of one) may hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Uint256,
    Uint48,
    Address,
    Bytes32,
    /// Several members share one slot, see [`decode_packed`].
    PackedSlot,
}

impl ValueType {
    /// Number of bytes the type occupies in storage.
    ///
    /// `None` for `PackedSlot`, which is a container rather than a type.
    pub fn width(&self) -> Option<usize> {
        match self {
            ValueType::Uint256 | ValueType::Bytes32 => Some(32),
            ValueType::Uint48 => Some(6),
            ValueType::Address => Some(20),
            ValueType::PackedSlot => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodedValue {
    Uint(U256),
    Address(H160),
    /// Opaque identifier, e.g. an ilk tag. Never interpreted as a number.
    Bytes32(H256),
    /// Members in slot order, index 0 being the least significant.
    Packed(Vec<DecodedValue>),
}

impl DecodedValue {
    /// Textual form used for persistence: decimal for integers, checksummed
    /// hex for addresses and 0x prefixed hex for fixed bytes.
    ///
    /// Returns `None` for packed values, those are persisted member by member.
    pub fn to_db_string(&self) -> Option<String> {
        match self {
            DecodedValue::Uint(v) => Some(v.to_string()),
            DecodedValue::Address(a) => Some(to_checksum(a, None)),
            DecodedValue::Bytes32(b) => Some(hash_to_hex(b)),
            DecodedValue::Packed(_) => None,
        }
    }
}

/// Decodes a full 32 byte slot value as a single scalar.
///
/// Narrow types are truncated to their width, reading from the least
/// significant end of the word.
pub fn decode(raw: &[u8], value_type: ValueType) -> Result<DecodedValue, DecodeError> {
    if raw.len() != WORD {
        return Err(DecodeError::InvalidLength { expected: WORD, actual: raw.len() });
    }
    match value_type.width() {
        Some(width) => decode_scalar(&raw[WORD - width..], value_type),
        None => Err(DecodeError::MissingPackedTypes),
    }
}

/// Splits a slot into consecutive members and decodes each of them.
///
/// Solidity packs struct members starting at the least significant byte, so
/// `members[0]` is read from the right end of the word, `members[1]` from
/// the bytes just left of it and so on.
pub fn decode_packed(raw: &[u8], members: &[ValueType]) -> Result<DecodedValue, DecodeError> {
    if raw.len() != WORD {
        return Err(DecodeError::InvalidLength { expected: WORD, actual: raw.len() });
    }
    let mut widths = Vec::with_capacity(members.len());
    for member in members {
        let width = member
            .width()
            .ok_or(DecodeError::UnsupportedPackedMember(*member))?;
        widths.push(width);
    }
    let total: usize = widths.iter().sum();
    if total > WORD {
        return Err(DecodeError::PackedOverflow(total));
    }

    let mut end = WORD;
    let mut values = Vec::with_capacity(members.len());
    for (member, width) in members.iter().zip(widths) {
        values.push(decode_scalar(&raw[end - width..end], *member)?);
        end -= width;
    }
    Ok(DecodedValue::Packed(values))
}

// `bytes` is exactly as wide as the type.
fn decode_scalar(bytes: &[u8], value_type: ValueType) -> Result<DecodedValue, DecodeError> {
    match value_type {
        ValueType::Uint256 | ValueType::Uint48 => Ok(DecodedValue::Uint(U256::from_big_endian(bytes))),
        ValueType::Address => Ok(DecodedValue::Address(H160::from_slice(bytes))),
        ValueType::Bytes32 => Ok(DecodedValue::Bytes32(H256::from_slice(bytes))),
        ValueType::PackedSlot => Err(DecodeError::UnsupportedPackedMember(value_type)),
    }
}
