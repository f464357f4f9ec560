//! Storage key → field metadata cache of a single contract.
use std::{collections::HashMap, sync::Arc};

use ethers::types::H160;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument, warn};

use mcd_core::{
    checksum,
    layout::{StorageKey, ValueMetadata},
    storage::IdentifierSource,
};

use super::StorageLayout;
use crate::transformer::ExtractionError;

/// Whether a lookup has loaded dynamic keys yet.
///
/// Reported in logs and through [`StorageKeysLookup::state`] only. A miss
/// reloads in either state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupState {
    /// Only static keys are known.
    Cold,
    /// Dynamic keys are loaded as of the last reload.
    Warm,
}

struct Inner<F> {
    state: LookupState,
    keys: HashMap<StorageKey, ValueMetadata<F>>,
    reloads: usize,
}

/// Resolves storage keys of one contract to the fields they hold.
///
/// Keys of mapping entries depend on identifiers only known once the events
/// introducing them were persisted. A miss therefore reloads every key the
/// identifier source currently implies and retries exactly once; a key still
/// unknown after that is reported as [`ExtractionError::UnknownStorageKey`].
pub struct StorageKeysLookup<L: StorageLayout> {
    contract: H160,
    layout: L,
    source: Arc<dyn IdentifierSource>,
    inner: Mutex<Inner<L::Field>>,
}

impl<L: StorageLayout> StorageKeysLookup<L> {
    pub fn new(contract: H160, layout: L, source: Arc<dyn IdentifierSource>) -> Self {
        let keys = layout
            .static_keys()
            .into_iter()
            .collect();
        Self {
            contract,
            layout,
            source,
            inner: Mutex::new(Inner { state: LookupState::Cold, keys, reloads: 0 }),
        }
    }

    pub fn contract(&self) -> H160 {
        self.contract
    }

    /// Diagnostic only, lookups behave the same in both states.
    pub async fn state(&self) -> LookupState {
        self.inner.lock().await.state
    }

    /// Number of dynamic reloads performed so far.
    pub async fn reloads(&self) -> usize {
        self.inner.lock().await.reloads
    }

    #[instrument(skip(self), fields(contract = %checksum(&self.contract)))]
    pub async fn lookup(&self, key: &StorageKey) -> Result<ValueMetadata<L::Field>, ExtractionError> {
        let mut inner = self.inner.lock().await;
        if let Some(metadata) = inner.keys.get(key) {
            return Ok(metadata.clone());
        }
        debug!(?key, state = ?inner.state, "StorageKeyMiss");

        inner.keys = self.load_all_keys().await?;
        inner.state = LookupState::Warm;
        inner.reloads += 1;

        inner
            .keys
            .get(key)
            .cloned()
            .ok_or_else(|| {
                error!(?key, n_keys = inner.keys.len(), "UnrecognizedStorageKey");
                ExtractionError::UnknownStorageKey { contract: checksum(&self.contract), key: *key }
            })
    }

    /// Recomputes static keys and every key implied by the identifiers
    /// currently known for this contract.
    async fn load_all_keys(
        &self,
    ) -> Result<HashMap<StorageKey, ValueMetadata<L::Field>>, ExtractionError> {
        let mut keys: HashMap<_, _> = self
            .layout
            .static_keys()
            .into_iter()
            .collect();
        for (class, source_class) in self.layout.identifier_classes() {
            let identifiers = self
                .source
                .known_identifiers(&self.contract, source_class)
                .await?;
            for identifier in identifiers.iter() {
                match self
                    .layout
                    .dynamic_keys(class, identifier)
                {
                    Ok(derived) => keys.extend(derived),
                    Err(err) => {
                        warn!(class = source_class.name, ?identifier, %err, "SkippingIdentifier")
                    }
                }
            }
        }
        debug!(n_keys = keys.len(), "LoadedStorageKeys");
        Ok(keys)
    }
}
