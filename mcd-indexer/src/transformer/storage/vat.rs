//! Storage layout of the Vat, the core CDP engine.
use std::collections::BTreeMap;

use mcd_core::{
    insertion::{ColumnValue, ForeignKeyField, InsertionModel, StorageWrite},
    layout::{
        keys::{field_offset, mapping_key, nested_mapping_key, static_key},
        DecodeError, DecodedValue, KeyName, StorageKey, ValueMetadata, ValueType,
    },
    models::StorageDiff,
    storage::{IdentifierClass, IdentifierColumn, IdentifierColumns, KnownIdentifier},
};

use super::{
    facts::{headerless_fact, required_key, storage_fact, value_column},
    StorageLayout, StorageRepository,
};
use crate::transformer::ExtractionError;

const ILKS_SLOT: u64 = 2;
const URNS_SLOT: u64 = 3;
const GEM_SLOT: u64 = 4;
const DAI_SLOT: u64 = 5;
const SIN_SLOT: u64 = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VatField {
    IlkArt,
    IlkRate,
    IlkSpot,
    IlkLine,
    IlkDust,
    UrnInk,
    UrnArt,
    Gem,
    Dai,
    Sin,
    Debt,
    Vice,
    Line,
    Live,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VatIdentifiers {
    Ilks,
    Urns,
    GemHolders,
    DaiHolders,
    SinHolders,
}

const U: IdentifierColumn = IdentifierColumn::Plain("u");
const V: IdentifierColumn = IdentifierColumn::Plain("v");
const W: IdentifierColumn = IdentifierColumn::Plain("w");
const SRC: IdentifierColumn = IdentifierColumn::Plain("src");
const DST: IdentifierColumn = IdentifierColumn::Plain("dst");

pub const VAT_ILKS: IdentifierClass = IdentifierClass {
    name: "vat_ilks",
    sources: &[
        IdentifierColumns::single("vat_init", IdentifierColumn::Ilk),
        IdentifierColumns::single("vat_frob", IdentifierColumn::Ilk),
        IdentifierColumns::single("vat_grab", IdentifierColumn::Ilk),
        IdentifierColumns::single("vat_fork", IdentifierColumn::Ilk),
        IdentifierColumns::single("vat_slip", IdentifierColumn::Ilk),
        IdentifierColumns::single("vat_flux", IdentifierColumn::Ilk),
        IdentifierColumns::single("vat_fold", IdentifierColumn::Ilk),
    ],
};

pub const VAT_URNS: IdentifierClass = IdentifierClass {
    name: "vat_urns",
    sources: &[
        IdentifierColumns::pair("vat_frob", IdentifierColumn::Ilk, U),
        IdentifierColumns::pair("vat_grab", IdentifierColumn::Ilk, U),
        IdentifierColumns::pair("vat_fork", IdentifierColumn::Ilk, SRC),
        IdentifierColumns::pair("vat_fork", IdentifierColumn::Ilk, DST),
    ],
};

pub const VAT_GEM_HOLDERS: IdentifierClass = IdentifierClass {
    name: "vat_gem_holders",
    sources: &[
        IdentifierColumns::pair("vat_slip", IdentifierColumn::Ilk, IdentifierColumn::Plain("usr")),
        IdentifierColumns::pair("vat_flux", IdentifierColumn::Ilk, SRC),
        IdentifierColumns::pair("vat_flux", IdentifierColumn::Ilk, DST),
        IdentifierColumns::pair("vat_frob", IdentifierColumn::Ilk, V),
        IdentifierColumns::pair("vat_grab", IdentifierColumn::Ilk, V),
    ],
};

pub const VAT_DAI_HOLDERS: IdentifierClass = IdentifierClass {
    name: "vat_dai_holders",
    sources: &[
        IdentifierColumns::single("vat_move", SRC),
        IdentifierColumns::single("vat_move", DST),
        IdentifierColumns::single("vat_frob", W),
        IdentifierColumns::single("vat_fold", U),
        IdentifierColumns::single("vat_suck", V),
    ],
};

pub const VAT_SIN_HOLDERS: IdentifierClass = IdentifierClass {
    name: "vat_sin_holders",
    sources: &[
        IdentifierColumns::single("vat_grab", W),
        IdentifierColumns::single("vat_suck", U),
    ],
};

fn secondary(identifier: &KnownIdentifier) -> Result<&str, DecodeError> {
    identifier
        .secondary
        .as_deref()
        .ok_or_else(|| {
            DecodeError::InvalidIdentifier(format!("{} has no guy", identifier.primary))
        })
}

#[derive(Clone, Copy, Debug, Default)]
pub struct VatLayout;

impl StorageLayout for VatLayout {
    type Field = VatField;
    type Class = VatIdentifiers;

    fn static_keys(&self) -> Vec<(StorageKey, ValueMetadata<VatField>)> {
        vec![
            (static_key(7), ValueMetadata::new(VatField::Debt, ValueType::Uint256)),
            (static_key(8), ValueMetadata::new(VatField::Vice, ValueType::Uint256)),
            (static_key(9), ValueMetadata::new(VatField::Line, ValueType::Uint256)),
            (static_key(10), ValueMetadata::new(VatField::Live, ValueType::Uint256)),
        ]
    }

    fn identifier_classes(&self) -> Vec<(VatIdentifiers, &'static IdentifierClass)> {
        vec![
            (VatIdentifiers::Ilks, &VAT_ILKS),
            (VatIdentifiers::Urns, &VAT_URNS),
            (VatIdentifiers::GemHolders, &VAT_GEM_HOLDERS),
            (VatIdentifiers::DaiHolders, &VAT_DAI_HOLDERS),
            (VatIdentifiers::SinHolders, &VAT_SIN_HOLDERS),
        ]
    }

    fn dynamic_keys(
        &self,
        class: VatIdentifiers,
        identifier: &KnownIdentifier,
    ) -> Result<Vec<(StorageKey, ValueMetadata<VatField>)>, DecodeError> {
        use VatField::*;
        let res: Vec<_> = match class {
            VatIdentifiers::Ilks => {
                let base = mapping_key(ILKS_SLOT, &identifier.primary)?;
                let keys = BTreeMap::from([(KeyName::Ilk, identifier.primary.clone())]);
                [IlkArt, IlkRate, IlkSpot, IlkLine, IlkDust]
                    .into_iter()
                    .zip(0u64..)
                    .map(|(field, n)| {
                        (
                            field_offset(&base, n),
                            ValueMetadata::with_keys(field, keys.clone(), ValueType::Uint256),
                        )
                    })
                    .collect()
            }
            VatIdentifiers::Urns => {
                let guy = secondary(identifier)?;
                let base = nested_mapping_key(URNS_SLOT, &identifier.primary, guy)?;
                let keys = BTreeMap::from([
                    (KeyName::Ilk, identifier.primary.clone()),
                    (KeyName::Guy, guy.to_string()),
                ]);
                vec![
                    (
                        base,
                        ValueMetadata::with_keys(UrnInk, keys.clone(), ValueType::Uint256),
                    ),
                    (field_offset(&base, 1), ValueMetadata::with_keys(UrnArt, keys, ValueType::Uint256)),
                ]
            }
            VatIdentifiers::GemHolders => {
                let guy = secondary(identifier)?;
                let keys = BTreeMap::from([
                    (KeyName::Ilk, identifier.primary.clone()),
                    (KeyName::Guy, guy.to_string()),
                ]);
                vec![(
                    nested_mapping_key(GEM_SLOT, &identifier.primary, guy)?,
                    ValueMetadata::with_keys(Gem, keys, ValueType::Uint256),
                )]
            }
            VatIdentifiers::DaiHolders | VatIdentifiers::SinHolders => {
                let (slot, field) = if class == VatIdentifiers::DaiHolders {
                    (DAI_SLOT, Dai)
                } else {
                    (SIN_SLOT, Sin)
                };
                let keys = BTreeMap::from([(KeyName::Guy, identifier.primary.clone())]);
                vec![(
                    mapping_key(slot, &identifier.primary)?,
                    ValueMetadata::with_keys(field, keys, ValueType::Uint256),
                )]
            }
        };
        Ok(res)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct VatRepository;

impl VatRepository {
    fn ilk_fact(
        table: &'static str,
        diff: &StorageDiff,
        metadata: &ValueMetadata<VatField>,
    ) -> Result<InsertionModel, ExtractionError> {
        let ilk = required_key(metadata, KeyName::Ilk)?;
        Ok(storage_fact(table, diff).foreign_key(ForeignKeyField::Ilk, ilk))
    }

    /// An ilk keyed fact holding `value` in `column`.
    fn ilk_value(
        table: &'static str,
        column: &'static str,
        diff: &StorageDiff,
        metadata: &ValueMetadata<VatField>,
        value: &DecodedValue,
    ) -> Result<InsertionModel, ExtractionError> {
        Ok(Self::ilk_fact(table, diff, metadata)?.column(column, value_column(table, value)?))
    }

    fn guy(metadata: &ValueMetadata<VatField>) -> Result<ColumnValue, ExtractionError> {
        Ok(ColumnValue::Text(required_key(metadata, KeyName::Guy)?.to_string()))
    }
}

impl StorageRepository for VatRepository {
    type Field = VatField;

    fn write(
        &self,
        diff: &StorageDiff,
        metadata: &ValueMetadata<VatField>,
        field: VatField,
        value: &DecodedValue,
    ) -> Result<StorageWrite, ExtractionError> {
        use VatField::*;
        let model = match field {
            IlkArt => Self::ilk_value("vat_ilk_art", "art", diff, metadata, value)?,
            IlkRate => Self::ilk_value("vat_ilk_rate", "rate", diff, metadata, value)?,
            IlkSpot => Self::ilk_value("vat_ilk_spot", "spot", diff, metadata, value)?,
            IlkLine => Self::ilk_value("vat_ilk_line", "line", diff, metadata, value)?,
            IlkDust => Self::ilk_value("vat_ilk_dust", "dust", diff, metadata, value)?,
            UrnInk => Self::ilk_fact("vat_urn_ink", diff, metadata)?
                .column("urn", Self::guy(metadata)?)
                .column("ink", value_column("vat_urn_ink", value)?),
            UrnArt => Self::ilk_fact("vat_urn_art", diff, metadata)?
                .column("urn", Self::guy(metadata)?)
                .column("art", value_column("vat_urn_art", value)?),
            Gem => Self::ilk_fact("vat_gem", diff, metadata)?
                .column("guy", Self::guy(metadata)?)
                .column("gem", value_column("vat_gem", value)?),
            Dai => storage_fact("vat_dai", diff)
                .column("guy", Self::guy(metadata)?)
                .column("dai", value_column("vat_dai", value)?),
            Sin => storage_fact("vat_sin", diff)
                .column("guy", Self::guy(metadata)?)
                .column("sin", value_column("vat_sin", value)?),
            Debt => return headerless_fact("vat_debt", "debt", diff, value),
            Vice => return headerless_fact("vat_vice", "vice", diff, value),
            Line => return headerless_fact("vat_line", "line", diff, value),
            Live => return headerless_fact("vat_live", "live", diff, value),
        };
        Ok(StorageWrite::Upsert(model))
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use ethers::types::{H160, H256, U256};

    use mcd_core::insertion::HeaderlessValue;

    use super::*;

    const ETH_A: &str = "0x4554482d41000000000000000000000000000000000000000000000000000000";
    const GUY: &str = "0x7d7bEe5fCfD8028cf7b00876C5b1421c800561A6";

    fn key(hex_str: &str) -> StorageKey {
        H256::from_str(hex_str).unwrap()
    }

    fn diff() -> StorageDiff {
        StorageDiff::new(
            H160::from_str("0x35d1b3f3d7966a1dfe207aa4514c12a259a0492b").unwrap(),
            8928300,
            H256::repeat_byte(0x02),
            H256::zero(),
            H256::zero(),
        )
    }

    #[test]
    fn test_ilk_members() {
        let res = VatLayout
            .dynamic_keys(VatIdentifiers::Ilks, &KnownIdentifier::single(ETH_A))
            .unwrap();

        assert_eq!(res.len(), 5);
        assert_eq!(
            (res[0].0, res[0].1.field),
            (
                key("0x5cd43a2b0a7e767504a508ed07c6f6d26130368a2a5ce573193b4c24eba603bb"),
                VatField::IlkArt
            )
        );
        assert_eq!(
            (res[1].0, res[1].1.field),
            (
                key("0x5cd43a2b0a7e767504a508ed07c6f6d26130368a2a5ce573193b4c24eba603bc"),
                VatField::IlkRate
            )
        );
        assert_eq!(res[4].1.field, VatField::IlkDust);
        assert_eq!(res[4].1.key(KeyName::Ilk), Some(ETH_A));
    }

    #[test]
    fn test_urn_members() {
        let res = VatLayout
            .dynamic_keys(VatIdentifiers::Urns, &KnownIdentifier::pair(ETH_A, GUY))
            .unwrap();

        assert_eq!(
            res.iter()
                .map(|(k, m)| (*k, m.field))
                .collect::<Vec<_>>(),
            vec![
                (
                    key("0xd8b93419c7bd860c7c79221749249bd764f0390b182dfa8bbec63a319c1acf1a"),
                    VatField::UrnInk
                ),
                (
                    key("0xd8b93419c7bd860c7c79221749249bd764f0390b182dfa8bbec63a319c1acf1b"),
                    VatField::UrnArt
                ),
            ]
        );
        assert_eq!(res[1].1.key(KeyName::Guy), Some(GUY));
    }

    #[test]
    fn test_gem_dai_sin_keys() {
        let gem = VatLayout
            .dynamic_keys(VatIdentifiers::GemHolders, &KnownIdentifier::pair(ETH_A, GUY))
            .unwrap();
        let dai = VatLayout
            .dynamic_keys(VatIdentifiers::DaiHolders, &KnownIdentifier::single(GUY))
            .unwrap();
        let sin = VatLayout
            .dynamic_keys(VatIdentifiers::SinHolders, &KnownIdentifier::single(GUY))
            .unwrap();

        assert_eq!(
            gem[0].0,
            key("0xa1c6907bf3a8090cb1cb135a14a80cef6d914667cf3474c520fc257adae09c4e")
        );
        assert_eq!(
            dai[0].0,
            key("0x84d95f4eba20b18d469c682c8315693310d70d3ed31ba4182114123e85cf684e")
        );
        assert_eq!(
            sin[0].0,
            key("0x86da8552a1690309a2ad7b99c67b2adc7f2fd8f74681ccf1616789653c76c401")
        );
        assert_eq!(sin[0].1.field, VatField::Sin);
    }

    #[test]
    fn test_urn_requires_guy() {
        let res = VatLayout.dynamic_keys(VatIdentifiers::Urns, &KnownIdentifier::single(ETH_A));

        assert!(matches!(res, Err(DecodeError::InvalidIdentifier(_))));
    }

    #[test]
    fn test_write_urn_ink() {
        let keys = BTreeMap::from([
            (KeyName::Ilk, ETH_A.to_string()),
            (KeyName::Guy, GUY.to_string()),
        ]);
        let meta = ValueMetadata::with_keys(VatField::UrnInk, keys, ValueType::Uint256);

        let res = VatRepository
            .write(&diff(), &meta, VatField::UrnInk, &DecodedValue::Uint(U256::exp10(18)))
            .unwrap();

        let StorageWrite::Upsert(model) = res else { panic!("expected an upsert") };
        assert_eq!(model.table, "vat_urn_ink");
        assert_eq!(
            model.ordered_columns,
            vec!["block_number", "block_hash", "address_id", "ilk_id", "urn", "ink"]
        );
        assert_eq!(model.foreign_keys[&ForeignKeyField::Ilk], ETH_A);
        assert_eq!(model.column_values["urn"], ColumnValue::Text(GUY.to_string()));
        assert_eq!(
            model.column_values["ink"],
            ColumnValue::Numeric("1000000000000000000".to_string())
        );
    }

    #[test]
    fn test_write_debt_is_headerless() {
        let meta = ValueMetadata::new(VatField::Debt, ValueType::Uint256);

        let res = VatRepository
            .write(&diff(), &meta, VatField::Debt, &DecodedValue::Uint(U256::from(5)))
            .unwrap();

        assert_eq!(
            res,
            StorageWrite::Headerless(HeaderlessValue {
                schema: "maker",
                table: "vat_debt",
                column: "debt",
                address: "0x35D1b3F3D7966A1DFe207aa4514C12a259A0492B".to_string(),
                block_number: 8928300,
                block_hash: format!("0x{}", "02".repeat(32)),
                value: ColumnValue::Numeric("5".to_string()),
            })
        );
    }

    #[test]
    fn test_write_dai_without_guy() {
        let meta = ValueMetadata::new(VatField::Dai, ValueType::Uint256);

        let res = VatRepository.write(&diff(), &meta, VatField::Dai, &DecodedValue::Uint(U256::one()));

        assert!(matches!(res, Err(ExtractionError::DispatchMismatch(_))));
    }

    #[test]
    fn test_write_ilk_members() {
        let expected = [
            (VatField::IlkArt, "vat_ilk_art", "art"),
            (VatField::IlkRate, "vat_ilk_rate", "rate"),
            (VatField::IlkSpot, "vat_ilk_spot", "spot"),
            (VatField::IlkLine, "vat_ilk_line", "line"),
            (VatField::IlkDust, "vat_ilk_dust", "dust"),
        ];
        for (field, table, column) in expected {
            let keys = BTreeMap::from([(KeyName::Ilk, ETH_A.to_string())]);
            let meta = ValueMetadata::with_keys(field, keys, ValueType::Uint256);

            let res = VatRepository
                .write(&diff(), &meta, field, &DecodedValue::Uint(U256::from(7)))
                .unwrap();

            let StorageWrite::Upsert(model) = res else { panic!("expected an upsert") };
            assert_eq!(model.table, table);
            assert_eq!(
                model.ordered_columns,
                vec!["block_number", "block_hash", "address_id", "ilk_id", column]
            );
            assert_eq!(model.column_values[column], ColumnValue::Numeric("7".to_string()));
        }
    }
}
