//! Storage key derivation.
//!
//! Follows the Solidity layout rules: a static variable lives at its slot
//! index, a mapping entry at `keccak(pad32(key) ++ pad32(slot))` and struct
//! members at consecutive offsets from the entry's base key.
use ethers::types::{H256, U256};

use super::DecodeError;
use crate::keccak256;

pub type StorageKey = H256;

/// Key of a variable stored directly at `slot`.
pub fn static_key(slot: u64) -> StorageKey {
    H256::from_low_u64_be(slot)
}

/// Key of `mapping[identifier]` where the mapping is declared at `slot`.
pub fn mapping_key(slot: u64, identifier: &str) -> Result<StorageKey, DecodeError> {
    Ok(hash_pair(&identifier_word(identifier)?, &static_key(slot)))
}

/// Key of `mapping[primary][secondary]` where the mapping is declared at `slot`.
pub fn nested_mapping_key(
    slot: u64,
    primary: &str,
    secondary: &str,
) -> Result<StorageKey, DecodeError> {
    let inner = mapping_key(slot, primary)?;
    Ok(hash_pair(&identifier_word(secondary)?, &inner))
}

/// Key of the `n`th slot of a struct whose first member lives at `base`.
///
/// The addition wraps around like the EVM does.
pub fn field_offset(base: &StorageKey, n: u64) -> StorageKey {
    let (key, _) = U256::from_big_endian(base.as_bytes()).overflowing_add(U256::from(n));
    let mut out = [0u8; 32];
    key.to_big_endian(&mut out);
    H256(out)
}

/// Left pads an identifier to a full 32 byte word.
///
/// Identifiers are 0x prefixed hex (ilks, addresses) or decimal integers
/// (bid ids).
pub fn identifier_word(identifier: &str) -> Result<[u8; 32], DecodeError> {
    let mut word = [0u8; 32];
    if let Some(stripped) = identifier.strip_prefix("0x") {
        let bytes = hex::decode(stripped)
            .map_err(|e| DecodeError::InvalidIdentifier(format!("{identifier}: {e}")))?;
        if bytes.len() > 32 {
            return Err(DecodeError::InvalidIdentifier(format!(
                "{identifier}: longer than 32 bytes"
            )));
        }
        word[32 - bytes.len()..].copy_from_slice(&bytes);
    } else {
        let value = U256::from_dec_str(identifier)
            .map_err(|e| DecodeError::InvalidIdentifier(format!("{identifier}: {e}")))?;
        value.to_big_endian(&mut word);
    }
    Ok(word)
}

fn hash_pair(key: &[u8; 32], slot: &StorageKey) -> StorageKey {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(key);
    preimage[32..].copy_from_slice(slot.as_bytes());
    H256(keccak256(preimage))
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    const ETH_A: &str = "0x4554482d41000000000000000000000000000000000000000000000000000000";
    const GUY: &str = "0x7d7bEe5fCfD8028cf7b00876C5b1421c800561A6";

    fn key(hex_str: &str) -> StorageKey {
        H256::from_str(hex_str).unwrap()
    }

    #[test]
    fn test_static_key() {
        assert_eq!(
            static_key(7),
            key("0x0000000000000000000000000000000000000000000000000000000000000007")
        );
    }

    #[rstest]
    #[case::bid_id(1, "42", "0xd9ae7388d2083c2e208c0dfdf9b10bc72bbfb00d63d88b3c7fd7c315bfc1cf40")]
    #[case::flip_bid_id(1, "7", "0xdc686ec4a0ff239c70e7c7c36e8f853eced3bc8618f48d2b816da2a74311237e")]
    #[case::ilk(2, ETH_A, "0x5cd43a2b0a7e767504a508ed07c6f6d26130368a2a5ce573193b4c24eba603bb")]
    #[case::address(5, GUY, "0x84d95f4eba20b18d469c682c8315693310d70d3ed31ba4182114123e85cf684e")]
    fn test_mapping_key(#[case] slot: u64, #[case] identifier: &str, #[case] exp: &str) {
        let res = mapping_key(slot, identifier).unwrap();

        assert_eq!(res, key(exp));
    }

    #[rstest]
    #[case::urn(3, "0xd8b93419c7bd860c7c79221749249bd764f0390b182dfa8bbec63a319c1acf1a")]
    #[case::gem(4, "0xa1c6907bf3a8090cb1cb135a14a80cef6d914667cf3474c520fc257adae09c4e")]
    fn test_nested_mapping_key(#[case] slot: u64, #[case] exp: &str) {
        let res = nested_mapping_key(slot, ETH_A, GUY).unwrap();

        assert_eq!(res, key(exp));
    }

    #[rstest]
    #[case(0, "0xd9ae7388d2083c2e208c0dfdf9b10bc72bbfb00d63d88b3c7fd7c315bfc1cf40")]
    #[case(1, "0xd9ae7388d2083c2e208c0dfdf9b10bc72bbfb00d63d88b3c7fd7c315bfc1cf41")]
    #[case(2, "0xd9ae7388d2083c2e208c0dfdf9b10bc72bbfb00d63d88b3c7fd7c315bfc1cf42")]
    fn test_field_offset(#[case] n: u64, #[case] exp: &str) {
        let base = mapping_key(1, "42").unwrap();

        assert_eq!(field_offset(&base, n), key(exp));
    }

    #[test]
    fn test_field_offset_carries_into_higher_bytes() {
        let base = key("0xdc686ec4a0ff239c70e7c7c36e8f853eced3bc8618f48d2b816da2a74311237e");

        let res = field_offset(&base, 2);

        assert_eq!(res, key("0xdc686ec4a0ff239c70e7c7c36e8f853eced3bc8618f48d2b816da2a743112380"));
    }

    #[test]
    fn test_field_offset_wraps() {
        let res = field_offset(&H256::repeat_byte(0xff), 1);

        assert_eq!(res, H256::zero());
    }

    #[rstest]
    #[case::decimal("42", 42u64)]
    #[case::hex("0x2a", 42u64)]
    #[case::zero("0", 0u64)]
    fn test_identifier_word(#[case] identifier: &str, #[case] exp: u64) {
        let res = identifier_word(identifier).unwrap();

        assert_eq!(H256(res), H256::from_low_u64_be(exp));
    }

    #[rstest]
    #[case::bad_hex("0xzz")]
    #[case::not_a_number("ETH-A")]
    #[case::too_long("0x4554482d4100000000000000000000000000000000000000000000000000000000")]
    fn test_identifier_word_invalid(#[case] identifier: &str) {
        let res = identifier_word(identifier);

        assert!(matches!(res, Err(DecodeError::InvalidIdentifier(_))));
    }
}
