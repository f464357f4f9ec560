//! Identifier discovery over persisted event facts.
//!
//! A bid id, ilk or urn can first show up in any of several event tables
//! (a missed kick does not hide the bid from a later `tend`), so a class is
//! answered by a `UNION` over all of them, restricted to one emitting
//! contract.
use diesel::{
    sql_query,
    sql_types::{Nullable, Text},
    QueryableByName,
};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use ethers::types::H160;
use itertools::Itertools;
use tracing::debug;

use mcd_core::{
    checksum,
    storage::{IdentifierClass, IdentifierColumn, IdentifierColumns, KnownIdentifier, StorageError},
};

use super::{storage_error_from_diesel, PostgresGateway};

#[derive(QueryableByName, Debug)]
struct IdentifierRow {
    #[diesel(sql_type = Text)]
    primary_id: String,
    #[diesel(sql_type = Nullable<Text>)]
    secondary_id: Option<String>,
}

fn column_expr(column: &IdentifierColumn) -> String {
    match column {
        IdentifierColumn::Plain(name) => format!("e.\"{}\"::TEXT", name),
        IdentifierColumn::Ilk => "i.ilk".to_string(),
    }
}

fn render_source(source: &IdentifierColumns) -> String {
    let uses_ilk = source.primary == IdentifierColumn::Ilk ||
        source.secondary == Some(IdentifierColumn::Ilk);
    let secondary = source
        .secondary
        .as_ref()
        .map(column_expr)
        .unwrap_or_else(|| "NULL::TEXT".to_string());
    format!(
        "SELECT {} AS primary_id, {} AS secondary_id FROM maker.{} e \
         JOIN public.addresses a ON a.id = e.address_id{} WHERE a.address = $1",
        column_expr(&source.primary),
        secondary,
        source.table,
        if uses_ilk { " JOIN maker.ilks i ON i.id = e.ilk_id" } else { "" },
    )
}

/// Renders the union query of a class; `$1` is the contract address.
///
/// `UNION` (not `UNION ALL`) makes the result duplicate free.
pub(crate) fn render_identifier_query(class: &IdentifierClass) -> Option<String> {
    if class.sources.is_empty() {
        return None;
    }
    Some(
        class
            .sources
            .iter()
            .map(render_source)
            .join(" UNION "),
    )
}

impl PostgresGateway {
    pub(crate) async fn known_identifiers(
        &self,
        contract: &H160,
        class: &IdentifierClass,
        conn: &mut AsyncPgConnection,
    ) -> Result<Vec<KnownIdentifier>, StorageError> {
        let Some(query) = render_identifier_query(class) else {
            return Ok(Vec::new());
        };
        let address = checksum(contract);
        let rows = sql_query(query)
            .bind::<Text, _>(&address)
            .load::<IdentifierRow>(conn)
            .await
            .map_err(|err| storage_error_from_diesel(err, class.name, &address))?;
        debug!(class = class.name, contract = %address, n = rows.len(), "LoadedIdentifiers");
        Ok(rows
            .into_iter()
            .map(|row| KnownIdentifier { primary: row.primary_id, secondary: row.secondary_id })
            .collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const BID_IDS: IdentifierClass = IdentifierClass {
        name: "bid_ids",
        sources: &[
            IdentifierColumns::single("flap_kick", IdentifierColumn::Plain("bid_id")),
            IdentifierColumns::single("tend", IdentifierColumn::Plain("bid_id")),
        ],
    };

    const URNS: IdentifierClass = IdentifierClass {
        name: "urns",
        sources: &[IdentifierColumns::pair("vat_frob", IdentifierColumn::Ilk, IdentifierColumn::Plain("u"))],
    };

    #[test]
    fn test_render_union() {
        let res = render_identifier_query(&BID_IDS).unwrap();

        assert_eq!(
            res,
            "SELECT e.\"bid_id\"::TEXT AS primary_id, NULL::TEXT AS secondary_id \
             FROM maker.flap_kick e JOIN public.addresses a ON a.id = e.address_id \
             WHERE a.address = $1 UNION \
             SELECT e.\"bid_id\"::TEXT AS primary_id, NULL::TEXT AS secondary_id \
             FROM maker.tend e JOIN public.addresses a ON a.id = e.address_id \
             WHERE a.address = $1"
        );
    }

    #[test]
    fn test_render_pair_joins_ilks() {
        let res = render_identifier_query(&URNS).unwrap();

        assert_eq!(
            res,
            "SELECT i.ilk AS primary_id, e.\"u\"::TEXT AS secondary_id \
             FROM maker.vat_frob e JOIN public.addresses a ON a.id = e.address_id \
             JOIN maker.ilks i ON i.id = e.ilk_id WHERE a.address = $1"
        );
    }

    #[test]
    fn test_render_empty_class() {
        let class = IdentifierClass { name: "none", sources: &[] };

        assert_eq!(render_identifier_query(&class), None);
    }

    mod test_serial_db {
        use std::str::FromStr;

        use diesel_async::{AsyncConnection, AsyncPgConnection};

        use super::*;
        use crate::postgres::db_fixtures;

        #[tokio::test]
        async fn test_known_identifiers_unions_and_filters_by_contract() {
            let db_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
            let mut conn = AsyncPgConnection::establish(&db_url)
                .await
                .unwrap();
            conn.begin_test_transaction()
                .await
                .unwrap();
            let flap = H160::from_str("0x4d95a049d5b0b7d32058cd3f2163015747522e99").unwrap();
            let other = H160::repeat_byte(0x11);
            let header = db_fixtures::insert_header(&mut conn, 1, "0x01").await;
            let flap_id = db_fixtures::insert_address(&mut conn, &checksum(&flap)).await;
            let other_id = db_fixtures::insert_address(&mut conn, &checksum(&other)).await;
            // bid 1 seen by kick and tend, bid 2 only by tend, bid 3 on another contract
            db_fixtures::insert_bid_event(&mut conn, "flap_kick", header, flap_id, 0, "1").await;
            db_fixtures::insert_bid_event(&mut conn, "tend", header, flap_id, 1, "1").await;
            db_fixtures::insert_bid_event(&mut conn, "tend", header, flap_id, 2, "2").await;
            db_fixtures::insert_bid_event(&mut conn, "tend", header, other_id, 3, "3").await;

            let mut res = PostgresGateway::new(5)
                .known_identifiers(&flap, &BID_IDS, &mut conn)
                .await
                .unwrap();
            res.sort();

            assert_eq!(res, vec![KnownIdentifier::single("1"), KnownIdentifier::single("2")]);
        }
    }
}
