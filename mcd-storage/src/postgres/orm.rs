use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use mcd_core::models;

use super::schema::{addresses, headers, ilks};

#[derive(Identifiable, Queryable, Selectable, Debug)]
#[diesel(table_name = headers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Header {
    pub id: i64,
    pub block_number: i64,
    pub hash: String,
    pub block_timestamp: i64,
}

impl From<Header> for models::Header {
    fn from(value: Header) -> Self {
        models::Header {
            id: value.id,
            block_number: value.block_number,
            hash: value.hash,
            timestamp: value.block_timestamp,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = headers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewHeader<'a> {
    pub block_number: i64,
    pub hash: &'a str,
    pub block_timestamp: i64,
}

#[derive(Identifiable, Queryable, Selectable, Debug)]
#[diesel(table_name = addresses)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Address {
    pub id: i64,
    pub address: String,
}

impl Address {
    pub async fn id_by_address(address: &str, conn: &mut AsyncPgConnection) -> QueryResult<Option<i64>> {
        addresses::table
            .filter(addresses::address.eq(address))
            .select(addresses::id)
            .first::<i64>(conn)
            .await
            .optional()
    }

    /// Inserts the address unless present. Returns `None` if another
    /// transaction created it first.
    pub async fn insert_if_absent(
        address: &str,
        conn: &mut AsyncPgConnection,
    ) -> QueryResult<Option<i64>> {
        diesel::insert_into(addresses::table)
            .values(addresses::address.eq(address))
            .on_conflict_do_nothing()
            .returning(addresses::id)
            .get_result::<i64>(conn)
            .await
            .optional()
    }
}

/// A collateral type.
///
/// `ilk` is the natural key (0x prefixed bytes32), `identifier` its readable
/// form such as `ETH-A`.
#[derive(Identifiable, Queryable, Selectable, Debug)]
#[diesel(table_name = ilks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Ilk {
    pub id: i64,
    pub ilk: String,
    pub identifier: String,
}

#[derive(Insertable)]
#[diesel(table_name = ilks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewIlk<'a> {
    pub ilk: &'a str,
    pub identifier: &'a str,
}

impl Ilk {
    pub async fn id_by_ilk(ilk: &str, conn: &mut AsyncPgConnection) -> QueryResult<Option<i64>> {
        ilks::table
            .filter(ilks::ilk.eq(ilk))
            .select(ilks::id)
            .first::<i64>(conn)
            .await
            .optional()
    }

    pub async fn insert_if_absent(
        new: &NewIlk<'_>,
        conn: &mut AsyncPgConnection,
    ) -> QueryResult<Option<i64>> {
        diesel::insert_into(ilks::table)
            .values(new)
            .on_conflict_do_nothing()
            .returning(ilks::id)
            .get_result::<i64>(conn)
            .await
            .optional()
    }
}
