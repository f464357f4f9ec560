//! # Postgres based storage backend
//!
//! This postgres-based storage backend provides implementations for the
//! traits defined in `mcd_core::storage` plus the write paths used by the
//! storage and event transformers.
//!
//! ## Design Decisions
//!
//! ### Dynamic fact tables
//!
//! Every decoded field lands in its own narrow fact table in the `maker`
//! schema (`maker.flap_bid_bid`, `maker.vat_ilk_rate`, ...). There are dozens
//! of them and they only differ in their value column, so they are not
//! modelled as diesel tables. Instead transformers describe rows as
//! `InsertionModel`s which are rendered into parameterized upserts here.
//! Shared tables (`headers`, `addresses`, `checked_headers`, `maker.ilks`) are
//! regular diesel tables, see [`schema`].
//!
//! ### Idempotency
//!
//! Diffs and logs are delivered at least once. Storage facts are keyed by
//! `(block_number, block_hash, address_id[, entity])` and inserted with
//! `ON CONFLICT DO NOTHING`: the value of a slot at a given block never
//! changes. Event facts are keyed by `(header_id, tx_idx, log_idx)` and
//! overwrite their columns on conflict, which rewrites identical values.
//!
//! ### Reorgs
//!
//! Headers are owned by chain-sync, which deletes them when it detects a
//! reorg. Event facts reference their header with `ON DELETE CASCADE`.
//! Storage facts carry the block hash reported by the diff and are never
//! deleted. Contract level values that must be attributed to a header use
//! the headerless linkage described in the `headerless` module.
//!
//! ### Atomic Transactions
//!
//! Operations on [`PostgresGateway`] receive a connection reference which can
//! either be a simple DB connection, or a DB connection within a
//! transactional context. [`gateway::PooledGateway`] owns the pool and opens
//! one transaction per batch of writes, so a failed write leaves nothing
//! behind and a header is only marked checked if all of its facts were
//! written.
use diesel::{Connection, PgConnection};
use diesel_async::{
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager},
    AsyncPgConnection,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

use mcd_core::storage::StorageError;

pub mod builder;
mod checked_headers;
mod foreign_keys;
pub mod gateway;
mod headerless;
mod identifiers;
mod insertion;
mod orm;
pub mod schema;

pub use gateway::PooledGateway;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations/");

/// How often a header is handed out by `recheck_headers` before it is
/// considered settled.
pub const DEFAULT_RECHECK_CAP: i32 = 5;

#[derive(Clone, Debug)]
pub(crate) struct PostgresGateway {
    recheck_cap: i32,
}

impl PostgresGateway {
    pub fn new(recheck_cap: i32) -> Self {
        Self { recheck_cap }
    }
}

impl Default for PostgresGateway {
    fn default() -> Self {
        Self::new(DEFAULT_RECHECK_CAP)
    }
}

#[derive(Debug)]
pub(crate) struct PostgresError(StorageError);

impl From<diesel::result::Error> for PostgresError {
    fn from(value: diesel::result::Error) -> Self {
        PostgresError(StorageError::Unexpected(format!("DieselError: {}", value)))
    }
}

impl From<PostgresError> for StorageError {
    fn from(value: PostgresError) -> Self {
        value.0
    }
}

impl From<StorageError> for PostgresError {
    fn from(value: StorageError) -> Self {
        PostgresError(value)
    }
}

fn storage_error_from_diesel(err: diesel::result::Error, entity: &str, id: &str) -> PostgresError {
    let err_string = err.to_string();
    match err {
        diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        ) => PostgresError(StorageError::DuplicateEntry(entity.to_owned(), id.to_owned())),
        diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::ForeignKeyViolation,
            _,
        ) => PostgresError(StorageError::NoRelatedEntity(
            entity.to_owned(),
            id.to_owned(),
            err_string,
        )),
        diesel::result::Error::NotFound => {
            PostgresError(StorageError::NotFound(entity.to_owned(), id.to_owned()))
        }
        _ => PostgresError(StorageError::Unexpected(err_string)),
    }
}

/// Establishes a connection to the database and creates a connection pool.
///
/// Pending migrations are applied before the pool is handed out.
///
/// # Arguments
///
/// - `db_url`: A string slice that holds the URL of the database to connect to.
///
/// # Returns
///
/// A Result which is either:
///
/// - `Ok`: Contains a `Pool` of `AsyncPgConnection`s if the connection was established
///   successfully.
/// - `Err`: Contains a `StorageError` if there was an issue creating the connection pool or
///   upgrading the database.
async fn connect(db_url: &str) -> Result<Pool<AsyncPgConnection>, StorageError> {
    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(db_url);
    let pool = Pool::builder(config)
        .build()
        .map_err(|err| StorageError::Unexpected(format!("{}", err)))?;
    run_migrations(db_url)?;
    Ok(pool)
}

fn run_migrations(db_url: &str) -> Result<(), StorageError> {
    info!("Upgrading database...");
    let mut conn = PgConnection::establish(db_url)
        .map_err(|err| StorageError::Unexpected(format!("Connection failed: {}", err)))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|err| StorageError::Unexpected(format!("Migrations failed: {}", err)))?;
    Ok(())
}
