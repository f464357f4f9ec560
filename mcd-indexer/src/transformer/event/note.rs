//! Anonymous `LogNote` events.
//!
//! Noted functions emit a log with four topics, the selector padded to 32
//! bytes followed by three words, and the raw call data ABI encoded as
//! `bytes`. Which topics carry which arguments differs between the
//! contracts, so every converter declares where each of its columns comes
//! from.
use ethers::types::{H160, H256, I256, U256};

use mcd_core::{
    bytes32_to_string, checksum, hash_to_hex,
    insertion::{ColumnValue, ForeignKeyField, InsertionModel},
    models::HeaderSyncLog,
};

use super::{event_fact, EventConverter};
use crate::{config::ContractKind, transformer::ExtractionError};

const NOTE_TOPICS: usize = 4;
/// Offset of the first call data argument: the `bytes` offset and length
/// words followed by the selector.
const CALL_ARGS_OFFSET: usize = 64 + 4;

/// Position of a word within a note log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteWord {
    Topic(usize),
    /// Call data argument, zero based.
    Arg(usize),
}

/// Interpretation of a note word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteValue {
    Uint,
    /// Two's complement signed integer.
    Int,
    Address,
    /// Written as the `ilk_id` foreign key.
    Ilk,
    /// Right padded `bytes32` string.
    Text,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteColumn {
    pub name: &'static str,
    pub word: NoteWord,
    pub value: NoteValue,
}

impl NoteColumn {
    pub const fn new(name: &'static str, word: NoteWord, value: NoteValue) -> Self {
        NoteColumn { name, word, value }
    }
}

pub struct NoteConverter {
    label: &'static str,
    selector: [u8; 4],
    columns: &'static [NoteColumn],
    emitters: &'static [ContractKind],
}

impl NoteConverter {
    /// `signature` is the canonical signature of the noted function, e.g.
    /// `deal(uint256)`.
    pub fn new(
        label: &'static str,
        signature: &str,
        columns: &'static [NoteColumn],
        emitters: &'static [ContractKind],
    ) -> Self {
        NoteConverter { label, selector: ethers::utils::id(signature), columns, emitters }
    }

    pub fn selector(&self) -> [u8; 4] {
        self.selector
    }
}

fn note_word(log: &HeaderSyncLog, word: NoteWord) -> Result<H256, ExtractionError> {
    match word {
        NoteWord::Topic(i) => log
            .log
            .topics
            .get(i)
            .copied()
            .ok_or_else(|| ExtractionError::Decode(format!("missing topic {}", i))),
        NoteWord::Arg(k) => {
            let start = CALL_ARGS_OFFSET + 32 * k;
            log.log
                .data
                .get(start..start + 32)
                .map(H256::from_slice)
                .ok_or_else(|| {
                    ExtractionError::Decode(format!(
                        "call data of {} bytes has no argument {}",
                        log.log.data.len(),
                        k
                    ))
                })
        }
    }
}

impl EventConverter for NoteConverter {
    fn label(&self) -> &'static str {
        self.label
    }

    fn topic0(&self) -> H256 {
        let mut topic = H256::zero();
        topic.0[..4].copy_from_slice(&self.selector);
        topic
    }

    fn emitters(&self) -> &'static [ContractKind] {
        self.emitters
    }

    fn to_model(&self, log: &HeaderSyncLog) -> Result<InsertionModel, ExtractionError> {
        if log.log.topics.len() < NOTE_TOPICS {
            return Err(ExtractionError::Decode(format!(
                "{} expects {} topics, got {}",
                self.label,
                NOTE_TOPICS,
                log.log.topics.len()
            )));
        }
        self.columns
            .iter()
            .try_fold(event_fact(self.label, log), |model, column| {
                let word = note_word(log, column.word)?;
                Ok(match column.value {
                    NoteValue::Ilk => model.foreign_key(ForeignKeyField::Ilk, hash_to_hex(&word)),
                    NoteValue::Uint => model.column(
                        column.name,
                        ColumnValue::Numeric(U256::from_big_endian(word.as_bytes()).to_string()),
                    ),
                    NoteValue::Int => model.column(
                        column.name,
                        ColumnValue::Numeric(
                            I256::from_raw(U256::from_big_endian(word.as_bytes())).to_string(),
                        ),
                    ),
                    NoteValue::Address => model.column(
                        column.name,
                        ColumnValue::Text(checksum(&H160::from_slice(&word.as_bytes()[12..]))),
                    ),
                    NoteValue::Text => {
                        model.column(column.name, ColumnValue::Text(bytes32_to_string(&word)))
                    }
                })
            })
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use rstest::rstest;

    use super::*;
    use crate::transformer::event::{
        catalog::{cat_file_flip, deal, jug_file_ilk, tend, vat_frob, vat_init},
        test::{note_log, word, FLIP},
    };

    const ETH_A: &str = "0x4554482d41000000000000000000000000000000000000000000000000000000";
    const VAT: &str = "0x35D1b3F3D7966A1DFe207aa4514C12a259A0492B";

    fn sync_log(topics: Vec<H256>, args: &[H256]) -> HeaderSyncLog {
        HeaderSyncLog { header_id: 1, log: note_log(H160::from_str(VAT).unwrap(), topics, args) }
    }

    #[rstest]
    #[case::tend(tend(), "4b43ed12")]
    #[case::deal(deal(), "c959c42b")]
    #[case::vat_init(vat_init(), "3b663195")]
    #[case::vat_frob(vat_frob(), "76088703")]
    #[case::jug_file_ilk(jug_file_ilk(), "1a0b287e")]
    #[case::cat_file_flip(cat_file_flip(), "ebecb39d")]
    fn test_selector(#[case] converter: NoteConverter, #[case] exp: &str) {
        assert_eq!(hex::encode(converter.selector()), exp);
        assert_eq!(&converter.topic0().as_bytes()[..4], converter.selector().as_slice());
        assert_eq!(&converter.topic0().as_bytes()[4..], &[0u8; 28][..]);
    }

    #[test]
    fn test_tend() {
        let converter = tend();
        let log = sync_log(
            vec![converter.topic0(), word(&FLIP[2..]), word("2a"), word("de0b6b3a7640000")],
            &[word("2a"), word("de0b6b3a7640000"), word("3e8")],
        );

        let res = converter.to_model(&log).unwrap();

        assert_eq!(res.table, "tend");
        assert_eq!(res.column_values["bid_id"], ColumnValue::Numeric("42".to_string()));
        assert_eq!(
            res.column_values["lot"],
            ColumnValue::Numeric("1000000000000000000".to_string())
        );
        assert_eq!(res.column_values["bid"], ColumnValue::Numeric("1000".to_string()));
        assert_eq!(res.foreign_keys[&ForeignKeyField::Address], VAT);
    }

    #[test]
    fn test_vat_frob_signed_deltas() {
        let converter = vat_frob();
        let minus_one = H256::repeat_byte(0xff);
        let log = sync_log(
            vec![converter.topic0(), word(&ETH_A[2..]), word(&FLIP[2..]), word(&VAT[2..])],
            &[
                word(&ETH_A[2..]),
                word(&FLIP[2..]),
                word(&VAT[2..]),
                word("1"),
                word("64"),
                minus_one,
            ],
        );

        let res = converter.to_model(&log).unwrap();

        assert_eq!(res.foreign_keys[&ForeignKeyField::Ilk], ETH_A);
        assert_eq!(res.column_values["u"], ColumnValue::Text(FLIP.to_string()));
        assert_eq!(res.column_values["v"], ColumnValue::Text(VAT.to_string()));
        assert_eq!(
            res.column_values["w"],
            ColumnValue::Text("0x0000000000000000000000000000000000000001".to_string())
        );
        assert_eq!(res.column_values["dink"], ColumnValue::Numeric("100".to_string()));
        assert_eq!(res.column_values["dart"], ColumnValue::Numeric("-1".to_string()));
    }

    #[test]
    fn test_jug_file_ilk_what_is_text() {
        let converter = jug_file_ilk();
        let duty = H256::from_slice(&{
            let mut w = [0u8; 32];
            w[..4].copy_from_slice(b"duty");
            w
        });
        let log = sync_log(
            vec![converter.topic0(), word(&FLIP[2..]), word(&ETH_A[2..]), duty],
            &[word(&ETH_A[2..]), duty, word("3b9aca00")],
        );

        let res = converter.to_model(&log).unwrap();

        assert_eq!(res.foreign_keys[&ForeignKeyField::Ilk], ETH_A);
        assert_eq!(res.column_values["what"], ColumnValue::Text("duty".to_string()));
        assert_eq!(res.column_values["data"], ColumnValue::Numeric("1000000000".to_string()));
    }

    #[test]
    fn test_too_few_topics() {
        let converter = deal();
        let log = sync_log(vec![converter.topic0(), word(&FLIP[2..]), word("2a")], &[word("2a")]);

        let res = converter.to_model(&log);

        assert!(matches!(res, Err(ExtractionError::Decode(_))));
    }

    #[test]
    fn test_short_call_data() {
        let converter = tend();
        let log = sync_log(
            vec![converter.topic0(), word(&FLIP[2..]), word("2a"), word("1")],
            &[word("2a"), word("1")],
        );

        let res = converter.to_model(&log);

        assert!(matches!(res, Err(ExtractionError::Decode(_))));
    }
}
