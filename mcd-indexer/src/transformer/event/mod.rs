//! # Event log transformers
//!
//! An event transformer handles one event type for one header at a time. It
//! keeps the logs emitted by the configured contracts under the event's
//! first topic, converts each into an [`InsertionModel`] and hands all of
//! them to the [`EventGateway`], which also marks the header as checked for
//! the event's label. Logs that fail to decode are logged and skipped.
use std::collections::HashSet;

use async_trait::async_trait;
use ethers::types::{H160, H256};
use mockall::automock;
use tracing::{debug, instrument, warn};

use mcd_core::{
    checksum,
    insertion::{ColumnValue, ForeignKeyField, InsertionModel, OnConflict},
    models::{EventLog, HeaderSyncLog},
    storage::StorageError,
};
use mcd_storage::postgres::PooledGateway;

use crate::{
    config::ContractKind,
    transformer::{ExtractionError, MAKER_SCHEMA},
};

pub mod abi;
pub mod catalog;
pub mod note;

/// Converts the logs of a single event type into fact rows.
pub trait EventConverter: Send + Sync {
    /// Name of the event, also the table its facts are written to and the
    /// label its checked headers are tracked under.
    fn label(&self) -> &'static str;

    /// First topic of every log of this event.
    fn topic0(&self) -> H256;

    /// Contract kinds emitting this event.
    fn emitters(&self) -> &'static [ContractKind];

    fn to_model(&self, log: &HeaderSyncLog) -> Result<InsertionModel, ExtractionError>;
}

/// An event fact keyed by its position within the header.
///
/// Redelivered logs overwrite the row they produced earlier.
pub(crate) fn event_fact(table: &'static str, log: &HeaderSyncLog) -> InsertionModel {
    InsertionModel::new(MAKER_SCHEMA, table)
        .column("header_id", ColumnValue::BigInt(log.header_id))
        .foreign_key(ForeignKeyField::Address, checksum(&log.log.address))
        .column("tx_idx", ColumnValue::BigInt(log.log.tx_index as i64))
        .column("log_idx", ColumnValue::BigInt(log.log.log_index as i64))
        .on_conflict(OnConflict::Update { key: vec!["header_id", "tx_idx", "log_idx"] })
}

#[automock]
#[async_trait]
pub trait EventGateway: Send + Sync {
    /// Persists the facts of one header and marks it checked for `label`.
    async fn create(
        &self,
        label: &str,
        header_id: i64,
        models: &[InsertionModel],
    ) -> Result<(), StorageError>;
}

pub struct EventPgGateway {
    state_gateway: PooledGateway,
}

impl EventPgGateway {
    pub fn new(state_gateway: PooledGateway) -> Self {
        Self { state_gateway }
    }
}

#[async_trait]
impl EventGateway for EventPgGateway {
    async fn create(
        &self,
        label: &str,
        header_id: i64,
        models: &[InsertionModel],
    ) -> Result<(), StorageError> {
        self.state_gateway
            .persist_events(label, header_id, models)
            .await
    }
}

/// Handles the logs of a single event type.
#[automock]
#[async_trait]
pub trait LogTransformer: Send + Sync {
    fn label(&self) -> &'static str;

    /// Transforms every matching log of a header, returns the number of
    /// persisted facts.
    async fn execute(&self, header_id: i64, logs: &[EventLog]) -> Result<usize, ExtractionError>;
}

pub struct EventTransformer<G> {
    converter: Box<dyn EventConverter>,
    contracts: HashSet<H160>,
    gateway: G,
}

impl<G: EventGateway> EventTransformer<G> {
    pub fn new(
        converter: Box<dyn EventConverter>,
        contracts: impl IntoIterator<Item = H160>,
        gateway: G,
    ) -> Self {
        Self { converter, contracts: contracts.into_iter().collect(), gateway }
    }

    fn is_relevant(&self, log: &EventLog) -> bool {
        self.contracts.contains(&log.address) &&
            log.topics.first() == Some(&self.converter.topic0())
    }
}

#[async_trait]
impl<G: EventGateway> LogTransformer for EventTransformer<G> {
    fn label(&self) -> &'static str {
        self.converter.label()
    }

    #[instrument(skip_all, fields(label = self.converter.label(), header_id))]
    async fn execute(&self, header_id: i64, logs: &[EventLog]) -> Result<usize, ExtractionError> {
        let models: Vec<InsertionModel> = logs
            .iter()
            .filter(|log| self.is_relevant(log))
            .filter_map(|log| {
                let log = HeaderSyncLog { header_id, log: log.clone() };
                match self.converter.to_model(&log) {
                    Ok(model) => Some(model),
                    Err(err) => {
                        warn!(
                            tx_index = log.log.tx_index,
                            log_index = log.log.log_index,
                            %err,
                            "LogDecodeFailed"
                        );
                        None
                    }
                }
            })
            .collect();
        // Headers without a matching log are marked checked as well.
        self.gateway
            .create(self.converter.label(), header_id, &models)
            .await?;
        debug!(n_models = models.len(), "LogsTransformed");
        Ok(models.len())
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::str::FromStr;

    use ethers::types::Bytes;

    use super::{catalog::deal, *};

    pub(crate) const FLIP: &str = "0x7d7bEe5fCfD8028cf7b00876C5b1421c800561A6";

    pub(crate) fn word(hex: &str) -> H256 {
        H256::from_str(&format!("{:0>64}", hex)).unwrap()
    }

    /// A `LogNote` log, `args` are the call data words following the
    /// selector.
    pub(crate) fn note_log(address: H160, topics: Vec<H256>, args: &[H256]) -> EventLog {
        let mut call = topics
            .first()
            .map(|sig| sig.as_bytes()[..4].to_vec())
            .unwrap_or_default();
        for arg in args {
            call.extend_from_slice(arg.as_bytes());
        }
        let mut data = word("20").as_bytes().to_vec();
        data.extend_from_slice(H256::from_low_u64_be(call.len() as u64).as_bytes());
        data.extend_from_slice(&call);
        data.resize(64 + (call.len() + 31) / 32 * 32, 0);
        EventLog {
            address,
            topics,
            data: Bytes::from(data),
            block_number: 8928200,
            block_hash: H256::repeat_byte(0xab),
            tx_index: 3,
            log_index: 7,
        }
    }

    fn deal_log(address: H160, bid_id: u64) -> EventLog {
        let converter = deal();
        note_log(
            address,
            vec![converter.topic0(), word(&FLIP[2..]), word(&format!("{:x}", bid_id)), H256::zero()],
            &[word(&format!("{:x}", bid_id))],
        )
    }

    fn deal_transformer(gateway: MockEventGateway) -> EventTransformer<MockEventGateway> {
        EventTransformer::new(
            Box::new(deal()),
            [H160::from_str(FLIP).unwrap()],
            gateway,
        )
    }

    #[test]
    fn test_event_fact_identity_columns() {
        let log = HeaderSyncLog {
            header_id: 12,
            log: deal_log(H160::from_str(FLIP).unwrap(), 1),
        };

        let res = event_fact("deal", &log);

        assert_eq!(res.ordered_columns, vec!["header_id", "address_id", "tx_idx", "log_idx"]);
        assert_eq!(res.column_values["tx_idx"], ColumnValue::BigInt(3));
        assert_eq!(res.column_values["log_idx"], ColumnValue::BigInt(7));
        assert_eq!(res.foreign_keys[&ForeignKeyField::Address], FLIP);
        assert_eq!(
            res.on_conflict,
            OnConflict::Update { key: vec!["header_id", "tx_idx", "log_idx"] }
        );
    }

    #[tokio::test]
    async fn test_execute_filters_contract_and_topic() {
        let mut gateway = MockEventGateway::new();
        gateway
            .expect_create()
            .withf(|label, header_id, models| {
                label == "deal" &&
                    *header_id == 12 &&
                    models.len() == 1 &&
                    models[0].column_values["bid_id"] == ColumnValue::Numeric("42".to_string())
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let transformer = deal_transformer(gateway);
        let mut other_topic = deal_log(H160::from_str(FLIP).unwrap(), 43);
        other_topic.topics[0] = H256::repeat_byte(0x01);
        let logs = vec![
            deal_log(H160::from_str(FLIP).unwrap(), 42),
            deal_log(H160::repeat_byte(0x11), 44),
            other_topic,
        ];

        let res = transformer.execute(12, &logs).await.unwrap();

        assert_eq!(res, 1);
    }

    #[tokio::test]
    async fn test_header_without_logs_is_checked() {
        let mut gateway = MockEventGateway::new();
        gateway
            .expect_create()
            .withf(|label, header_id, models| label == "deal" && *header_id == 5 && models.is_empty())
            .times(1)
            .returning(|_, _, _| Ok(()));
        let transformer = deal_transformer(gateway);

        let res = transformer.execute(5, &[]).await.unwrap();

        assert_eq!(res, 0);
    }

    #[tokio::test]
    async fn test_malformed_log_is_skipped() {
        let mut gateway = MockEventGateway::new();
        gateway
            .expect_create()
            .withf(|_, _, models| models.len() == 1)
            .times(1)
            .returning(|_, _, _| Ok(()));
        let transformer = deal_transformer(gateway);
        let mut truncated = deal_log(H160::from_str(FLIP).unwrap(), 43);
        truncated.topics.truncate(3);

        let res = transformer
            .execute(12, &[truncated, deal_log(H160::from_str(FLIP).unwrap(), 42)])
            .await
            .unwrap();

        assert_eq!(res, 1);
    }

    #[tokio::test]
    async fn test_gateway_failure_is_surfaced() {
        let mut gateway = MockEventGateway::new();
        gateway
            .expect_create()
            .returning(|_, _, _| Err(StorageError::Unexpected("boom".to_string())));
        let transformer = deal_transformer(gateway);

        let res = transformer
            .execute(12, &[deal_log(H160::from_str(FLIP).unwrap(), 42)])
            .await;

        assert_eq!(res, Err(ExtractionError::Storage(StorageError::Unexpected("boom".to_string()))));
    }
}
