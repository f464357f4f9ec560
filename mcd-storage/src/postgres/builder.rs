use mcd_core::storage::StorageError;

use crate::postgres::{self, PooledGateway, PostgresGateway, DEFAULT_RECHECK_CAP};

pub struct GatewayBuilder {
    database_url: String,
    recheck_cap: i32,
}

impl GatewayBuilder {
    pub fn new(database_url: &str) -> Self {
        Self { database_url: database_url.to_string(), recheck_cap: DEFAULT_RECHECK_CAP }
    }

    pub fn set_recheck_cap(mut self, recheck_cap: i32) -> Self {
        self.recheck_cap = recheck_cap;
        self
    }

    /// Connects, applies pending migrations and returns the gateway.
    pub async fn build(self) -> Result<PooledGateway, StorageError> {
        let pool = postgres::connect(&self.database_url).await?;
        let state_gateway = PostgresGateway::new(self.recheck_cap);
        Ok(PooledGateway::new(pool, state_gateway))
    }
}
