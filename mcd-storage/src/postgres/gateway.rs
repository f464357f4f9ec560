use async_trait::async_trait;
use diesel_async::{
    pooled_connection::deadpool::{Object, Pool},
    scoped_futures::ScopedFutureExt,
    AsyncPgConnection,
};
use ethers::types::H160;
use tracing::{debug, instrument};

use mcd_core::{
    insertion::{InsertionModel, StorageWrite},
    models::Header,
    storage::{
        CheckedHeadersGateway, IdentifierClass, IdentifierSource, KnownIdentifier, StorageError,
    },
};

use super::{foreign_keys::ForeignKeyResolver, PostgresError, PostgresGateway};

/// Pool backed entry point used by the transformers.
///
/// Each write method runs in its own database transaction.
#[derive(Clone)]
pub struct PooledGateway {
    pool: Pool<AsyncPgConnection>,
    state_gateway: PostgresGateway,
}

impl PooledGateway {
    pub(crate) fn new(pool: Pool<AsyncPgConnection>, state_gateway: PostgresGateway) -> Self {
        Self { pool, state_gateway }
    }

    async fn conn(&self) -> Result<Object<AsyncPgConnection>, StorageError> {
        self.pool
            .get()
            .await
            .map_err(|err| StorageError::Unexpected(format!("{}", err)))
    }

    /// Persists the writes derived from a single storage diff.
    ///
    /// Foreign keys are resolved once per transaction. Returns the number of
    /// newly inserted fact rows; redelivered diffs insert none.
    #[instrument(skip_all, fields(n_writes = writes.len()))]
    pub async fn persist_storage_writes(
        &self,
        writes: &[StorageWrite],
    ) -> Result<usize, StorageError> {
        let mut conn = self.conn().await?;
        let state_gateway = &self.state_gateway;
        let inserted = conn
            .build_transaction()
            .run(|conn| {
                async move {
                    let mut resolver = ForeignKeyResolver::new();
                    let mut inserted = 0;
                    for write in writes {
                        match write {
                            StorageWrite::Upsert(model) => {
                                inserted += state_gateway
                                    .upsert_model(model, &mut resolver, conn)
                                    .await?;
                            }
                            StorageWrite::Headerless(value) => {
                                state_gateway
                                    .upsert_headerless(value, &mut resolver, conn)
                                    .await?;
                            }
                        }
                    }
                    Result::<usize, PostgresError>::Ok(inserted)
                }
                .scope_boxed()
            })
            .await?;
        debug!(inserted, "StorageWritesCommitted");
        Ok(inserted)
    }

    /// Persists the event facts of one header and marks the header checked
    /// for `label`, all or nothing.
    #[instrument(skip_all, fields(label, header_id, n_models = models.len()))]
    pub async fn persist_events(
        &self,
        label: &str,
        header_id: i64,
        models: &[InsertionModel],
    ) -> Result<(), StorageError> {
        let mut conn = self.conn().await?;
        let state_gateway = &self.state_gateway;
        conn.build_transaction()
            .run(|conn| {
                async move {
                    let mut resolver = ForeignKeyResolver::new();
                    for model in models {
                        state_gateway
                            .upsert_model(model, &mut resolver, conn)
                            .await?;
                    }
                    state_gateway
                        .mark_header_checked(header_id, label, conn)
                        .await?;
                    Result::<(), PostgresError>::Ok(())
                }
                .scope_boxed()
            })
            .await?;
        debug!("EventsCommitted");
        Ok(())
    }
}

#[async_trait]
impl IdentifierSource for PooledGateway {
    async fn known_identifiers(
        &self,
        contract: &H160,
        class: &IdentifierClass,
    ) -> Result<Vec<KnownIdentifier>, StorageError> {
        let mut conn = self.conn().await?;
        self.state_gateway
            .known_identifiers(contract, class, &mut conn)
            .await
    }
}

#[async_trait]
impl CheckedHeadersGateway for PooledGateway {
    async fn missing_headers(
        &self,
        label: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<Header>, StorageError> {
        let mut conn = self.conn().await?;
        self.state_gateway
            .missing_headers(label, from, to, &mut conn)
            .await
    }

    async fn recheck_headers(
        &self,
        label: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<Header>, StorageError> {
        let mut conn = self.conn().await?;
        self.state_gateway
            .recheck_headers(label, from, to, &mut conn)
            .await
    }
}
