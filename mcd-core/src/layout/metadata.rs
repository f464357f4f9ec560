use std::collections::BTreeMap;

use super::{
    codec::{decode, decode_packed},
    DecodeError, DecodedValue, ValueType,
};

/// Names of the identifiers a storage value may be keyed by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyName {
    BidId,
    Ilk,
    Guy,
}

/// Describes what a storage key holds.
///
/// `F` is the contract specific field enum. Scalar values carry a single
/// field; packed slots list their members least significant first, each
/// with its own field tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueMetadata<F> {
    pub field: F,
    pub keys: BTreeMap<KeyName, String>,
    pub value_type: ValueType,
    pub packed: Vec<(F, ValueType)>,
}

impl<F> ValueMetadata<F> {
    pub fn key(&self, name: KeyName) -> Option<&str> {
        self.keys.get(&name).map(String::as_str)
    }

    pub fn is_packed(&self) -> bool {
        self.value_type == ValueType::PackedSlot
    }
}

impl<F: Copy> ValueMetadata<F> {
    /// Metadata of a static variable.
    pub fn new(field: F, value_type: ValueType) -> Self {
        Self::with_keys(field, BTreeMap::new(), value_type)
    }

    /// Metadata of a mapping entry, or a struct member of one.
    pub fn with_keys(field: F, keys: BTreeMap<KeyName, String>, value_type: ValueType) -> Self {
        ValueMetadata { field, keys, value_type, packed: Vec::new() }
    }

    /// Metadata of a slot packing several members.
    pub fn packed(field: F, keys: BTreeMap<KeyName, String>, members: Vec<(F, ValueType)>) -> Self {
        ValueMetadata { field, keys, value_type: ValueType::PackedSlot, packed: members }
    }

    /// Decodes a raw slot value into one `(field, value)` pair per member.
    ///
    /// Scalars yield exactly one pair tagged with `self.field`.
    pub fn decode(&self, raw: &[u8]) -> Result<Vec<(F, DecodedValue)>, DecodeError> {
        if !self.is_packed() {
            return Ok(vec![(self.field, decode(raw, self.value_type)?)]);
        }
        let types: Vec<_> = self.packed.iter().map(|(_, t)| *t).collect();
        match decode_packed(raw, &types)? {
            DecodedValue::Packed(values) => Ok(self
                .packed
                .iter()
                .map(|(f, _)| *f)
                .zip(values)
                .collect()),
            other => Ok(vec![(self.field, other)]),
        }
    }
}
