//! Header linkage of contract level values.
//!
//! A value is stored together with two nullable references into `headers`:
//! `confirmed_header_id` when a header with the same number and hash exists,
//! `conflicting_header_id` when only a header with the same number but a
//! different hash exists. Both use `ON DELETE SET NULL`, so a reorg that
//! removes a header unlinks the value without deleting it. Writing the value
//! again recomputes the linkage; the value itself is never rewritten.
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tracing::trace;

use mcd_core::insertion::{ForeignKeyField, HeaderlessValue};

use super::{
    foreign_keys::ForeignKeyResolver,
    insertion::{placeholder, quote, Bind, Statement},
    storage_error_from_diesel, PostgresError, PostgresGateway,
};

pub(crate) fn render_headerless_upsert(value: &HeaderlessValue, address_id: i64) -> Statement {
    let mut binds = vec![
        Bind::BigInt(address_id),
        Bind::BigInt(value.block_number),
        Bind::Text(value.block_hash.clone()),
    ];
    let value_placeholder = placeholder(&value.value, &mut binds);
    let sql = format!(
        r#"
        WITH linkage AS (
            SELECT
                (SELECT id FROM public.headers
                 WHERE block_number = $2 AND hash = $3
                 ORDER BY id LIMIT 1) AS confirmed,
                (SELECT id FROM public.headers
                 WHERE block_number = $2 AND hash <> $3
                 ORDER BY id LIMIT 1) AS conflicting
        )
        INSERT INTO {table} (address_id, block_number, block_hash, {column},
                             confirmed_header_id, conflicting_header_id)
        SELECT $1, $2, $3, {value},
               linkage.confirmed,
               CASE WHEN linkage.confirmed IS NULL THEN linkage.conflicting END
        FROM linkage
        ON CONFLICT (address_id, block_number, block_hash) DO UPDATE SET
            confirmed_header_id = EXCLUDED.confirmed_header_id,
            conflicting_header_id = EXCLUDED.conflicting_header_id
        "#,
        table = value.qualified_table(),
        column = quote(value.column),
        value = value_placeholder,
    );
    Statement { sql, binds }
}

impl PostgresGateway {
    pub(crate) async fn upsert_headerless(
        &self,
        value: &HeaderlessValue,
        resolver: &mut ForeignKeyResolver,
        conn: &mut AsyncPgConnection,
    ) -> Result<(), PostgresError> {
        let address_id = resolver
            .resolve(ForeignKeyField::Address, &value.address, conn)
            .await?;
        let statement = render_headerless_upsert(value, address_id);
        trace!(table = value.table, block = value.block_number, "UpsertHeaderless");
        statement
            .into_query()
            .execute(conn)
            .await
            .map_err(|err| {
                storage_error_from_diesel(err, value.table, &value.block_hash)
            })?;
        Ok(())
    }
}
