use std::{collections::HashMap, sync::Arc};

use ethers::types::H160;
use tracing::{info, warn};

use mcd_core::{
    checksum,
    models::{EventLog, StorageDiff},
    storage::IdentifierSource,
};
use mcd_storage::postgres::PooledGateway;

use super::{
    event::{catalog::all_converters, EventPgGateway, EventTransformer, LogTransformer},
    storage::{
        auction::{AuctionKind, AuctionLayout, AuctionRepository},
        cat::{CatLayout, CatRepository},
        jug::{JugLayout, JugRepository},
        vat::{VatLayout, VatRepository},
        DiffTransformer, StorageKeysLookup, StorageLayout, StoragePgGateway, StorageRepository,
        StorageTransformer,
    },
    ExtractionError,
};
use crate::config::{ContractConfig, ContractKind, ContractsConfig};

/// Routes diffs and logs to the transformers of the configured contracts.
#[derive(Default)]
pub struct TransformerRegistry {
    storage: HashMap<H160, Box<dyn DiffTransformer>>,
    events: Vec<Box<dyn LogTransformer>>,
}

fn storage_transformer<L, R>(
    contract: &ContractConfig,
    layout: L,
    repository: R,
    gateway: &PooledGateway,
) -> Box<dyn DiffTransformer>
where
    L: StorageLayout + 'static,
    R: StorageRepository<Field = L::Field> + 'static,
{
    let source: Arc<dyn IdentifierSource> = Arc::new(gateway.clone());
    Box::new(StorageTransformer::new(
        &contract.name,
        StorageKeysLookup::new(contract.address, layout, source),
        repository,
        StoragePgGateway::new(gateway.clone()),
    ))
}

fn auction_transformer(
    contract: &ContractConfig,
    kind: AuctionKind,
    gateway: &PooledGateway,
) -> Box<dyn DiffTransformer> {
    storage_transformer(contract, AuctionLayout::new(kind), AuctionRepository::new(kind), gateway)
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates one storage transformer per configured contract and one event
    /// transformer per event emitted by any of them.
    pub fn build(config: &ContractsConfig, gateway: PooledGateway) -> Result<Self, ExtractionError> {
        let mut registry = Self::new();
        for contract in config.contracts.iter() {
            let transformer = match contract.kind {
                ContractKind::Flap => auction_transformer(contract, AuctionKind::Flap, &gateway),
                ContractKind::Flip => auction_transformer(contract, AuctionKind::Flip, &gateway),
                ContractKind::Flop => auction_transformer(contract, AuctionKind::Flop, &gateway),
                ContractKind::Vat => storage_transformer(contract, VatLayout, VatRepository, &gateway),
                ContractKind::Jug => storage_transformer(contract, JugLayout, JugRepository, &gateway),
                ContractKind::Cat => storage_transformer(contract, CatLayout, CatRepository, &gateway),
            };
            registry.register_storage(transformer)?;
        }
        for converter in all_converters()? {
            let emitters: Vec<H160> = config
                .contracts
                .iter()
                .filter(|c| converter.emitters().contains(&c.kind))
                .map(|c| c.address)
                .collect();
            if emitters.is_empty() {
                continue;
            }
            registry.register_event(Box::new(EventTransformer::new(
                converter,
                emitters,
                EventPgGateway::new(gateway.clone()),
            )));
        }
        info!(
            n_storage = registry.storage.len(),
            n_events = registry.events.len(),
            "TransformersRegistered"
        );
        Ok(registry)
    }

    pub fn register_storage(
        &mut self,
        transformer: Box<dyn DiffTransformer>,
    ) -> Result<(), ExtractionError> {
        let contract = transformer.contract();
        if self.storage.contains_key(&contract) {
            return Err(ExtractionError::Setup(format!(
                "Storage transformer for {} registered twice",
                checksum(&contract)
            )));
        }
        self.storage.insert(contract, transformer);
        Ok(())
    }

    pub fn register_event(&mut self, transformer: Box<dyn LogTransformer>) {
        self.events.push(transformer);
    }

    /// Labels checked headers are tracked under.
    pub fn labels(&self) -> Vec<&'static str> {
        self.events
            .iter()
            .map(|t| t.label())
            .collect()
    }

    /// Executes the storage transformer of the diff's contract. Returns
    /// `None` if no transformer is registered for it.
    pub async fn execute_diff(&self, diff: &StorageDiff) -> Result<Option<usize>, ExtractionError> {
        match self.storage.get(&diff.contract) {
            Some(transformer) => transformer.execute(diff).await.map(Some),
            None => {
                warn!(contract = %checksum(&diff.contract), "NoStorageTransformer");
                Ok(None)
            }
        }
    }

    /// Executes every event transformer against the logs of a header.
    ///
    /// Transformers commit independently; a failing one does not stop the
    /// others. The first failure is returned once all of them ran.
    pub async fn execute_logs(
        &self,
        header_id: i64,
        logs: &[EventLog],
    ) -> Result<usize, ExtractionError> {
        let mut total = 0;
        let mut first_err = None;
        for transformer in self.events.iter() {
            match transformer.execute(header_id, logs).await {
                Ok(n) => total += n,
                Err(err) => {
                    warn!(label = transformer.label(), header_id, %err, "LogTransformerFailed");
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(total),
        }
    }
}
