//! Storage layout of the Cat, the liquidation module.
use std::collections::BTreeMap;

use mcd_core::{
    insertion::{ForeignKeyField, StorageWrite},
    layout::{
        keys::{field_offset, mapping_key, static_key},
        DecodeError, DecodedValue, KeyName, StorageKey, ValueMetadata, ValueType,
    },
    models::StorageDiff,
    storage::{IdentifierClass, IdentifierColumn, IdentifierColumns, KnownIdentifier},
};

use super::{
    facts::{required_key, storage_fact, value_column},
    StorageLayout, StorageRepository,
};
use crate::transformer::ExtractionError;

const ILKS_SLOT: u64 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CatField {
    IlkFlip,
    IlkChop,
    IlkLump,
    Live,
    Vat,
    Vow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatIdentifiers {
    Ilks,
}

pub const CAT_ILKS: IdentifierClass = IdentifierClass {
    name: "cat_ilks",
    sources: &[
        IdentifierColumns::single("cat_file_chop_lump", IdentifierColumn::Ilk),
        IdentifierColumns::single("cat_file_flip", IdentifierColumn::Ilk),
        IdentifierColumns::single("cat_bite", IdentifierColumn::Ilk),
    ],
};

#[derive(Clone, Copy, Debug, Default)]
pub struct CatLayout;

impl StorageLayout for CatLayout {
    type Field = CatField;
    type Class = CatIdentifiers;

    fn static_keys(&self) -> Vec<(StorageKey, ValueMetadata<CatField>)> {
        vec![
            (static_key(2), ValueMetadata::new(CatField::Live, ValueType::Uint256)),
            (static_key(3), ValueMetadata::new(CatField::Vat, ValueType::Address)),
            (static_key(4), ValueMetadata::new(CatField::Vow, ValueType::Address)),
        ]
    }

    fn identifier_classes(&self) -> Vec<(CatIdentifiers, &'static IdentifierClass)> {
        vec![(CatIdentifiers::Ilks, &CAT_ILKS)]
    }

    fn dynamic_keys(
        &self,
        _class: CatIdentifiers,
        identifier: &KnownIdentifier,
    ) -> Result<Vec<(StorageKey, ValueMetadata<CatField>)>, DecodeError> {
        let base = mapping_key(ILKS_SLOT, &identifier.primary)?;
        let keys = BTreeMap::from([(KeyName::Ilk, identifier.primary.clone())]);
        Ok([
            (CatField::IlkFlip, ValueType::Address),
            (CatField::IlkChop, ValueType::Uint256),
            (CatField::IlkLump, ValueType::Uint256),
        ]
        .into_iter()
        .zip(0u64..)
        .map(|((field, ty), n)| {
            (field_offset(&base, n), ValueMetadata::with_keys(field, keys.clone(), ty))
        })
        .collect())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CatRepository;

impl StorageRepository for CatRepository {
    type Field = CatField;

    fn write(
        &self,
        diff: &StorageDiff,
        metadata: &ValueMetadata<CatField>,
        field: CatField,
        value: &DecodedValue,
    ) -> Result<StorageWrite, ExtractionError> {
        let (table, column) = match field {
            CatField::IlkFlip => ("cat_ilk_flip", "flip"),
            CatField::IlkChop => ("cat_ilk_chop", "chop"),
            CatField::IlkLump => ("cat_ilk_lump", "lump"),
            CatField::Live => ("cat_live", "live"),
            CatField::Vat => ("cat_vat", "vat"),
            CatField::Vow => ("cat_vow", "vow"),
        };
        let mut model = storage_fact(table, diff);
        if matches!(field, CatField::IlkFlip | CatField::IlkChop | CatField::IlkLump) {
            model = model.foreign_key(ForeignKeyField::Ilk, required_key(metadata, KeyName::Ilk)?);
        }
        Ok(StorageWrite::Upsert(model.column(column, value_column(table, value)?)))
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use ethers::types::{H160, H256, U256};

    use mcd_core::insertion::ColumnValue;

    use super::*;

    const ETH_A: &str = "0x4554482d41000000000000000000000000000000000000000000000000000000";

    #[test]
    fn test_ilk_members() {
        let res = CatLayout
            .dynamic_keys(CatIdentifiers::Ilks, &KnownIdentifier::single(ETH_A))
            .unwrap();

        assert_eq!(res.len(), 3);
        assert_eq!(
            res[2].0,
            H256::from_str("0xddedd75666d350fcd985cb35e3b9f2d4f288318d97268199e03d4405df947017")
                .unwrap()
        );
        assert_eq!(res[0].1.value_type, ValueType::Address);
        assert_eq!(res[2].1.field, CatField::IlkLump);
    }

    #[test]
    fn test_write_ilk_flip() {
        let keys = BTreeMap::from([(KeyName::Ilk, ETH_A.to_string())]);
        let meta = ValueMetadata::with_keys(CatField::IlkFlip, keys, ValueType::Address);
        let diff = StorageDiff::new(
            H160::repeat_byte(0x44),
            10,
            H256::repeat_byte(0x0a),
            H256::zero(),
            H256::zero(),
        );

        let res = CatRepository
            .write(&diff, &meta, CatField::IlkFlip, &DecodedValue::Address(H160::repeat_byte(0x55)))
            .unwrap();

        let StorageWrite::Upsert(model) = res else { panic!("expected an upsert") };
        assert_eq!(model.table, "cat_ilk_flip");
        assert_eq!(
            model.ordered_columns,
            vec!["block_number", "block_hash", "address_id", "ilk_id", "flip"]
        );
        assert_eq!(
            model.column_values["flip"],
            ColumnValue::Text("0x5555555555555555555555555555555555555555".to_string())
        );
    }

    #[test]
    fn test_write_live_has_no_ilk() {
        let meta = ValueMetadata::new(CatField::Live, ValueType::Uint256);
        let diff = StorageDiff::new(
            H160::repeat_byte(0x44),
            10,
            H256::repeat_byte(0x0a),
            H256::zero(),
            H256::zero(),
        );

        let res = CatRepository
            .write(&diff, &meta, CatField::Live, &DecodedValue::Uint(U256::one()))
            .unwrap();

        let StorageWrite::Upsert(model) = res else { panic!("expected an upsert") };
        assert!(model.foreign_keys.get(&ForeignKeyField::Ilk).is_none());
    }
}
