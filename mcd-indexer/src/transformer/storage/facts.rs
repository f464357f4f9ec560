//! Helpers shared by the storage repositories to describe fact rows.
use std::fmt::Debug;

use mcd_core::{
    checksum, hash_to_hex,
    insertion::{ColumnValue, ForeignKeyField, HeaderlessValue, InsertionModel, StorageWrite},
    layout::{DecodedValue, KeyName, ValueMetadata},
    models::StorageDiff,
};

use crate::transformer::{ExtractionError, MAKER_SCHEMA};

/// A storage fact keyed by the diff's block and emitting contract.
pub(crate) fn storage_fact(table: &'static str, diff: &StorageDiff) -> InsertionModel {
    InsertionModel::new(MAKER_SCHEMA, table)
        .column("block_number", ColumnValue::BigInt(diff.block_height as i64))
        .column("block_hash", ColumnValue::Text(hash_to_hex(&diff.block_hash)))
        .foreign_key(ForeignKeyField::Address, checksum(&diff.contract))
}

/// A contract level value linked to its header by the headerless tracker.
pub(crate) fn headerless_fact(
    table: &'static str,
    column: &'static str,
    diff: &StorageDiff,
    value: &DecodedValue,
) -> Result<StorageWrite, ExtractionError> {
    Ok(StorageWrite::Headerless(HeaderlessValue {
        schema: MAKER_SCHEMA,
        table,
        column,
        address: checksum(&diff.contract),
        block_number: diff.block_height as i64,
        block_hash: hash_to_hex(&diff.block_hash),
        value: value_column(table, value)?,
    }))
}

/// Column value of a scalar. Packed values must have been fanned out before.
pub(crate) fn value_column(
    table: &str,
    value: &DecodedValue,
) -> Result<ColumnValue, ExtractionError> {
    match value {
        DecodedValue::Uint(v) => Ok(ColumnValue::Numeric(v.to_string())),
        DecodedValue::Address(_) | DecodedValue::Bytes32(_) => value
            .to_db_string()
            .map(ColumnValue::Text)
            .ok_or_else(|| ExtractionError::DispatchMismatch(format!("{} got {:?}", table, value))),
        DecodedValue::Packed(_) => Err(ExtractionError::DispatchMismatch(format!(
            "{} can not hold a packed value",
            table
        ))),
    }
}

/// The `ilk` natural key of a bytes32 value.
pub(crate) fn ilk_value(table: &str, value: &DecodedValue) -> Result<String, ExtractionError> {
    match value {
        DecodedValue::Bytes32(ilk) => Ok(hash_to_hex(ilk)),
        other => {
            Err(ExtractionError::DispatchMismatch(format!("{} expects an ilk, got {:?}", table, other)))
        }
    }
}

pub(crate) fn required_key<'a, F: Debug>(
    metadata: &'a ValueMetadata<F>,
    name: KeyName,
) -> Result<&'a str, ExtractionError> {
    metadata.key(name).ok_or_else(|| {
        ExtractionError::DispatchMismatch(format!("{:?} is missing key {:?}", metadata.field, name))
    })
}
