//! Events declared in the contract ABIs, decoded with `ethers`.
use ethers::{
    abi::{parse_abi, Event, RawLog, Token},
    types::{H256, I256},
};

use mcd_core::{
    checksum,
    insertion::{ColumnValue, ForeignKeyField, InsertionModel},
    models::HeaderSyncLog,
};

use super::{event_fact, EventConverter};
use crate::{config::ContractKind, transformer::ExtractionError};

/// Maps a decoded event parameter to a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbiColumn {
    Plain { param: &'static str, column: &'static str },
    /// A `bytes32` ilk, written as the `ilk_id` foreign key.
    Ilk { param: &'static str },
}

impl AbiColumn {
    fn param(&self) -> &'static str {
        match self {
            AbiColumn::Plain { param, .. } | AbiColumn::Ilk { param } => param,
        }
    }
}

pub struct AbiConverter {
    label: &'static str,
    event: Event,
    columns: &'static [AbiColumn],
    emitters: &'static [ContractKind],
}

impl AbiConverter {
    /// `signature` is a human readable event declaration, e.g.
    /// `event Kick(uint256 id, uint256 lot, uint256 bid)`.
    pub fn new(
        label: &'static str,
        signature: &str,
        columns: &'static [AbiColumn],
        emitters: &'static [ContractKind],
    ) -> Result<Self, ExtractionError> {
        let abi = parse_abi(&[signature])
            .map_err(|e| ExtractionError::Setup(format!("Invalid event {}: {}", signature, e)))?;
        let event = abi
            .events()
            .next()
            .cloned()
            .ok_or_else(|| ExtractionError::Setup(format!("No event in {}", signature)))?;
        if let Some(missing) = columns
            .iter()
            .find(|c| !event.inputs.iter().any(|i| i.name == c.param()))
        {
            return Err(ExtractionError::Setup(format!(
                "{} has no parameter {}",
                event.name,
                missing.param()
            )));
        }
        Ok(AbiConverter { label, event, columns, emitters })
    }
}

fn token_value(token: &Token) -> Result<ColumnValue, ExtractionError> {
    match token {
        Token::Uint(v) => Ok(ColumnValue::Numeric(v.to_string())),
        Token::Int(v) => Ok(ColumnValue::Numeric(I256::from_raw(*v).to_string())),
        Token::Address(a) => Ok(ColumnValue::Text(checksum(a))),
        Token::FixedBytes(b) => Ok(ColumnValue::Text(format!("0x{}", hex::encode(b)))),
        other => Err(ExtractionError::Decode(format!("unsupported parameter {:?}", other))),
    }
}

impl EventConverter for AbiConverter {
    fn label(&self) -> &'static str {
        self.label
    }

    fn topic0(&self) -> H256 {
        self.event.signature()
    }

    fn emitters(&self) -> &'static [ContractKind] {
        self.emitters
    }

    fn to_model(&self, log: &HeaderSyncLog) -> Result<InsertionModel, ExtractionError> {
        let parsed = self
            .event
            .parse_log(RawLog { topics: log.log.topics.clone(), data: log.log.data.to_vec() })
            .map_err(|e| ExtractionError::Decode(format!("{}: {}", self.label, e)))?;
        self.columns
            .iter()
            .try_fold(event_fact(self.label, log), |model, column| {
                let token = parsed
                    .params
                    .iter()
                    .find(|p| p.name == column.param())
                    .map(|p| &p.value)
                    .ok_or_else(|| {
                        ExtractionError::Decode(format!("{} lacks {}", self.label, column.param()))
                    })?;
                match (column, token) {
                    (AbiColumn::Ilk { .. }, Token::FixedBytes(ilk)) if ilk.len() == 32 => Ok(
                        model.foreign_key(ForeignKeyField::Ilk, format!("0x{}", hex::encode(ilk))),
                    ),
                    (AbiColumn::Ilk { param }, other) => Err(ExtractionError::Decode(format!(
                        "{} is not an ilk: {:?}",
                        param, other
                    ))),
                    (AbiColumn::Plain { column, .. }, token) => {
                        Ok(model.column(*column, token_value(token)?))
                    }
                }
            })
    }
}
