use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tracing::debug;

use mcd_core::{models, storage::StorageError};

use super::{orm, schema, storage_error_from_diesel, PostgresError, PostgresGateway};

impl PostgresGateway {
    /// Records that `label` processed the header, bumping its check count if
    /// it did so before.
    pub(crate) async fn mark_header_checked(
        &self,
        header_id: i64,
        label: &str,
        conn: &mut AsyncPgConnection,
    ) -> Result<(), PostgresError> {
        use schema::checked_headers::dsl;
        diesel::insert_into(dsl::checked_headers)
            .values((dsl::header_id.eq(header_id), dsl::label.eq(label), dsl::check_count.eq(1)))
            .on_conflict((dsl::header_id, dsl::label))
            .do_update()
            .set(dsl::check_count.eq(dsl::check_count + 1))
            .execute(conn)
            .await
            .map_err(|err| {
                storage_error_from_diesel(err, "CheckedHeader", &header_id.to_string())
            })?;
        debug!(header_id, label, "MarkedHeaderChecked");
        Ok(())
    }

    pub(crate) async fn missing_headers(
        &self,
        label: &str,
        from: i64,
        to: i64,
        conn: &mut AsyncPgConnection,
    ) -> Result<Vec<models::Header>, StorageError> {
        use schema::{checked_headers, headers};
        let rows = headers::table
            .left_join(
                checked_headers::table.on(checked_headers::header_id
                    .eq(headers::id)
                    .and(checked_headers::label.eq(label))),
            )
            .filter(headers::block_number.between(from, to))
            .filter(checked_headers::id.is_null())
            .order_by(headers::block_number.asc())
            .select(orm::Header::as_select())
            .load::<orm::Header>(conn)
            .await
            .map_err(|err| storage_error_from_diesel(err, "Header", label))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Headers in range checked fewer than `recheck_cap` times, including
    /// headers never checked.
    pub(crate) async fn recheck_headers(
        &self,
        label: &str,
        from: i64,
        to: i64,
        conn: &mut AsyncPgConnection,
    ) -> Result<Vec<models::Header>, StorageError> {
        use schema::{checked_headers, headers};
        let rows = headers::table
            .left_join(
                checked_headers::table.on(checked_headers::header_id
                    .eq(headers::id)
                    .and(checked_headers::label.eq(label))),
            )
            .filter(headers::block_number.between(from, to))
            .filter(
                checked_headers::check_count
                    .nullable()
                    .lt(self.recheck_cap)
                    .or(checked_headers::id.nullable().is_null()),
            )
            .order_by(headers::block_number.asc())
            .select(orm::Header::as_select())
            .load::<orm::Header>(conn)
            .await
            .map_err(|err| storage_error_from_diesel(err, "Header", label))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod test {
    mod test_serial_db {
        use diesel_async::{AsyncConnection, AsyncPgConnection};

        use crate::postgres::{db_fixtures, PostgresGateway};

        async fn setup_db() -> AsyncPgConnection {
            let db_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
            let mut conn = AsyncPgConnection::establish(&db_url)
                .await
                .unwrap();
            conn.begin_test_transaction()
                .await
                .unwrap();
            conn
        }

        #[tokio::test]
        async fn test_missing_headers() {
            let mut conn = setup_db().await;
            let gw = PostgresGateway::new(5);
            let h1 = db_fixtures::insert_header(&mut conn, 1, "0x01").await;
            let h2 = db_fixtures::insert_header(&mut conn, 2, "0x02").await;
            db_fixtures::insert_header(&mut conn, 3, "0x03").await;
            gw.mark_header_checked(h1, "flap_kick", &mut conn)
                .await
                .unwrap();
            gw.mark_header_checked(h2, "tend", &mut conn)
                .await
                .unwrap();

            let res = gw
                .missing_headers("flap_kick", 1, 2, &mut conn)
                .await
                .unwrap();

            assert_eq!(res.iter().map(|h| h.id).collect::<Vec<_>>(), vec![h2]);
        }

        #[tokio::test]
        async fn test_recheck_headers_respects_cap() {
            let mut conn = setup_db().await;
            let gw = PostgresGateway::new(2);
            let h1 = db_fixtures::insert_header(&mut conn, 1, "0x01").await;
            let h2 = db_fixtures::insert_header(&mut conn, 2, "0x02").await;
            let h3 = db_fixtures::insert_header(&mut conn, 3, "0x03").await;
            for _ in 0..2 {
                gw.mark_header_checked(h1, "deal", &mut conn)
                    .await
                    .unwrap();
            }
            gw.mark_header_checked(h2, "deal", &mut conn)
                .await
                .unwrap();

            let res = gw
                .recheck_headers("deal", 1, 3, &mut conn)
                .await
                .unwrap();

            assert_eq!(res.iter().map(|h| h.id).collect::<Vec<_>>(), vec![h2, h3]);
        }
    }
}
