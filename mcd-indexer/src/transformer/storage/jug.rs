//! Storage layout of the Jug, which accrues stability fees per ilk.
use std::collections::BTreeMap;

use mcd_core::{
    insertion::{ForeignKeyField, InsertionModel, StorageWrite},
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
pub enum JugField {
    IlkDuty,
    IlkRho,
    Vat,
    Vow,
    Base,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JugIdentifiers {
    Ilks,
}

pub const JUG_ILKS: IdentifierClass = IdentifierClass {
    name: "jug_ilks",
    sources: &[
        IdentifierColumns::single("jug_init", IdentifierColumn::Ilk),
        IdentifierColumns::single("jug_drip", IdentifierColumn::Ilk),
        IdentifierColumns::single("jug_file_ilk", IdentifierColumn::Ilk),
    ],
};

#[derive(Clone, Copy, Debug, Default)]
pub struct JugLayout;

impl StorageLayout for JugLayout {
    type Field = JugField;
    type Class = JugIdentifiers;

    fn static_keys(&self) -> Vec<(StorageKey, ValueMetadata<JugField>)> {
        vec![
            (static_key(2), ValueMetadata::new(JugField::Vat, ValueType::Address)),
            (static_key(3), ValueMetadata::new(JugField::Vow, ValueType::Address)),
            (static_key(4), ValueMetadata::new(JugField::Base, ValueType::Uint256)),
        ]
    }

    fn identifier_classes(&self) -> Vec<(JugIdentifiers, &'static IdentifierClass)> {
        vec![(JugIdentifiers::Ilks, &JUG_ILKS)]
    }

    fn dynamic_keys(
        &self,
        _class: JugIdentifiers,
        identifier: &KnownIdentifier,
    ) -> Result<Vec<(StorageKey, ValueMetadata<JugField>)>, DecodeError> {
        let base = mapping_key(ILKS_SLOT, &identifier.primary)?;
        let keys = BTreeMap::from([(KeyName::Ilk, identifier.primary.clone())]);
        Ok(vec![
            (base, ValueMetadata::with_keys(JugField::IlkDuty, keys.clone(), ValueType::Uint256)),
            (field_offset(&base, 1), ValueMetadata::with_keys(JugField::IlkRho, keys, ValueType::Uint256)),
        ])
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct JugRepository;

fn ilk_fact(
    table: &'static str,
    diff: &StorageDiff,
    metadata: &ValueMetadata<JugField>,
) -> Result<InsertionModel, ExtractionError> {
    let ilk = required_key(metadata, KeyName::Ilk)?;
    Ok(storage_fact(table, diff).foreign_key(ForeignKeyField::Ilk, ilk))
}

impl StorageRepository for JugRepository {
    type Field = JugField;

    fn write(
        &self,
        diff: &StorageDiff,
        metadata: &ValueMetadata<JugField>,
        field: JugField,
        value: &DecodedValue,
    ) -> Result<StorageWrite, ExtractionError> {
        let model = match field {
            JugField::IlkDuty => ilk_fact("jug_ilk_duty", diff, metadata)?
                .column("duty", value_column("jug_ilk_duty", value)?),
            JugField::IlkRho => ilk_fact("jug_ilk_rho", diff, metadata)?
                .column("rho", value_column("jug_ilk_rho", value)?),
            JugField::Vat => storage_fact("jug_vat", diff).column("vat", value_column("jug_vat", value)?),
            JugField::Vow => storage_fact("jug_vow", diff).column("vow", value_column("jug_vow", value)?),
            JugField::Base => {
                storage_fact("jug_base", diff).column("base", value_column("jug_base", value)?)
            }
        };
        Ok(StorageWrite::Upsert(model))
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
        let res = JugLayout
            .dynamic_keys(JugIdentifiers::Ilks, &KnownIdentifier::single(ETH_A))
            .unwrap();

        assert_eq!(
            res.iter()
                .map(|(k, m)| (*k, m.field))
                .collect::<Vec<_>>(),
            vec![
                (
                    H256::from_str(
                        "0xddedd75666d350fcd985cb35e3b9f2d4f288318d97268199e03d4405df947015"
                    )
                    .unwrap(),
                    JugField::IlkDuty
                ),
                (
                    H256::from_str(
                        "0xddedd75666d350fcd985cb35e3b9f2d4f288318d97268199e03d4405df947016"
                    )
                    .unwrap(),
                    JugField::IlkRho
                ),
            ]
        );
    }

    #[test]
    fn test_write_rho() {
        let keys = BTreeMap::from([(KeyName::Ilk, ETH_A.to_string())]);
        let meta = ValueMetadata::with_keys(JugField::IlkRho, keys, ValueType::Uint256);
        let diff = StorageDiff::new(
            H160::repeat_byte(0x33),
            10,
            H256::repeat_byte(0x0a),
            H256::zero(),
            H256::zero(),
        );

        let res = JugRepository
            .write(&diff, &meta, JugField::IlkRho, &DecodedValue::Uint(U256::from(1_573_672_000)))
            .unwrap();

        let StorageWrite::Upsert(model) = res else { panic!("expected an upsert") };
        assert_eq!(model.table, "jug_ilk_rho");
        assert_eq!(model.foreign_keys[&ForeignKeyField::Ilk], ETH_A);
        assert_eq!(model.column_values["rho"], ColumnValue::Numeric("1573672000".to_string()));
    }
}
