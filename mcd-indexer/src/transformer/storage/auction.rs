//! Storage layout of the auction contracts.
//!
//! Flap (surplus), Flip (collateral) and Flop (debt) auctions share the
//! `bids` struct mapping at slot 1 and differ in their contract level
//! variables and in the extra `usr`, `gal` and `tab` members of a Flip bid.
use std::collections::BTreeMap;

use mcd_core::{
    insertion::{ColumnValue, ForeignKeyField, StorageWrite},
    layout::{
        keys::{field_offset, mapping_key, static_key},
        DecodeError, DecodedValue, KeyName, StorageKey, ValueMetadata, ValueType,
    },
    models::StorageDiff,
    storage::{IdentifierClass, IdentifierColumn, IdentifierColumns, KnownIdentifier},
};

use super::{
    facts::{ilk_value, required_key, storage_fact, value_column},
    StorageLayout, StorageRepository,
};
use crate::transformer::ExtractionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuctionKind {
    Flap,
    Flip,
    Flop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuctionField {
    BidBid,
    BidLot,
    /// Slot packing `guy`, `tic` and `end` of a bid.
    BidGuyTicEnd,
    BidGuy,
    BidTic,
    BidEnd,
    BidUsr,
    BidGal,
    BidTab,
    Vat,
    Gem,
    Ilk,
    Beg,
    Pad,
    /// Slot packing `ttl` and `tau`.
    TtlAndTau,
    Ttl,
    Tau,
    Kicks,
    Live,
    Vow,
}

impl AuctionField {
    fn column(&self) -> &'static str {
        match self {
            AuctionField::BidBid => "bid",
            AuctionField::BidLot => "lot",
            AuctionField::BidGuy => "guy",
            AuctionField::BidTic => "tic",
            AuctionField::BidEnd => "end",
            AuctionField::BidUsr => "usr",
            AuctionField::BidGal => "gal",
            AuctionField::BidTab => "tab",
            AuctionField::Vat => "vat",
            AuctionField::Gem => "gem",
            AuctionField::Ilk => "ilk_id",
            AuctionField::Beg => "beg",
            AuctionField::Pad => "pad",
            AuctionField::Ttl => "ttl",
            AuctionField::Tau => "tau",
            AuctionField::Kicks => "kicks",
            AuctionField::Live => "live",
            AuctionField::Vow => "vow",
            AuctionField::BidGuyTicEnd => "guy_tic_end",
            AuctionField::TtlAndTau => "ttl_tau",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuctionIdentifiers {
    BidIds,
}

const BIDS_SLOT: u64 = 1;
const BID_ID: IdentifierColumn = IdentifierColumn::Plain("bid_id");

macro_rules! bid_ids {
    ($name:literal, $kick:literal) => {
        IdentifierClass {
            name: $name,
            sources: &[
                IdentifierColumns::single($kick, BID_ID),
                IdentifierColumns::single("tend", BID_ID),
                IdentifierColumns::single("dent", BID_ID),
                IdentifierColumns::single("deal", BID_ID),
                IdentifierColumns::single("yank", BID_ID),
                IdentifierColumns::single("tick", BID_ID),
            ],
        }
    };
}

pub const FLAP_BID_IDS: IdentifierClass = bid_ids!("flap_bid_ids", "flap_kick");
pub const FLIP_BID_IDS: IdentifierClass = bid_ids!("flip_bid_ids", "flip_kick");
pub const FLOP_BID_IDS: IdentifierClass = bid_ids!("flop_bid_ids", "flop_kick");

impl AuctionKind {
    fn bid_ids(&self) -> &'static IdentifierClass {
        match self {
            AuctionKind::Flap => &FLAP_BID_IDS,
            AuctionKind::Flip => &FLIP_BID_IDS,
            AuctionKind::Flop => &FLOP_BID_IDS,
        }
    }

    /// Fact table of a scalar field, `None` if the contract has no such
    /// variable.
    fn table(&self, field: AuctionField) -> Option<&'static str> {
        use AuctionField::*;
        use AuctionKind::*;
        let table = match (self, field) {
            (Flap, BidBid) => "flap_bid_bid",
            (Flap, BidLot) => "flap_bid_lot",
            (Flap, BidGuy) => "flap_bid_guy",
            (Flap, BidTic) => "flap_bid_tic",
            (Flap, BidEnd) => "flap_bid_end",
            (Flap, Vat) => "flap_vat",
            (Flap, Gem) => "flap_gem",
            (Flap, Beg) => "flap_beg",
            (Flap, Ttl) => "flap_ttl",
            (Flap, Tau) => "flap_tau",
            (Flap, Kicks) => "flap_kicks",
            (Flap, Live) => "flap_live",
            (Flip, BidBid) => "flip_bid_bid",
            (Flip, BidLot) => "flip_bid_lot",
            (Flip, BidGuy) => "flip_bid_guy",
            (Flip, BidTic) => "flip_bid_tic",
            (Flip, BidEnd) => "flip_bid_end",
            (Flip, BidUsr) => "flip_bid_usr",
            (Flip, BidGal) => "flip_bid_gal",
            (Flip, BidTab) => "flip_bid_tab",
            (Flip, Vat) => "flip_vat",
            (Flip, Ilk) => "flip_ilk",
            (Flip, Beg) => "flip_beg",
            (Flip, Ttl) => "flip_ttl",
            (Flip, Tau) => "flip_tau",
            (Flip, Kicks) => "flip_kicks",
            (Flop, BidBid) => "flop_bid_bid",
            (Flop, BidLot) => "flop_bid_lot",
            (Flop, BidGuy) => "flop_bid_guy",
            (Flop, BidTic) => "flop_bid_tic",
            (Flop, BidEnd) => "flop_bid_end",
            (Flop, Vat) => "flop_vat",
            (Flop, Gem) => "flop_gem",
            (Flop, Beg) => "flop_beg",
            (Flop, Pad) => "flop_pad",
            (Flop, Ttl) => "flop_ttl",
            (Flop, Tau) => "flop_tau",
            (Flop, Kicks) => "flop_kicks",
            (Flop, Live) => "flop_live",
            (Flop, Vow) => "flop_vow",
            (Flap | Flip | Flop, BidGuyTicEnd | TtlAndTau) => return None,
            (Flap, BidUsr | BidGal | BidTab | Ilk | Pad | Vow) => return None,
            (Flip, Gem | Pad | Live | Vow) => return None,
            (Flop, BidUsr | BidGal | BidTab | Ilk) => return None,
        };
        Some(table)
    }
}

fn ttl_and_tau() -> Vec<(AuctionField, ValueType)> {
    vec![(AuctionField::Ttl, ValueType::Uint48), (AuctionField::Tau, ValueType::Uint48)]
}

#[derive(Clone, Copy, Debug)]
pub struct AuctionLayout {
    kind: AuctionKind,
}

impl AuctionLayout {
    pub fn new(kind: AuctionKind) -> Self {
        Self { kind }
    }
}

impl StorageLayout for AuctionLayout {
    type Field = AuctionField;
    type Class = AuctionIdentifiers;

    fn static_keys(&self) -> Vec<(StorageKey, ValueMetadata<AuctionField>)> {
        use AuctionField::*;
        let scalar = |slot, field, ty| (static_key(slot), ValueMetadata::new(field, ty));
        let packed = |slot| {
            (static_key(slot), ValueMetadata::packed(TtlAndTau, BTreeMap::new(), ttl_and_tau()))
        };
        match self.kind {
            AuctionKind::Flap => vec![
                scalar(2, Vat, ValueType::Address),
                scalar(3, Gem, ValueType::Address),
                scalar(4, Beg, ValueType::Uint256),
                packed(5),
                scalar(6, Kicks, ValueType::Uint256),
                scalar(7, Live, ValueType::Uint256),
            ],
            AuctionKind::Flip => vec![
                scalar(2, Vat, ValueType::Address),
                scalar(3, Ilk, ValueType::Bytes32),
                scalar(4, Beg, ValueType::Uint256),
                packed(5),
                scalar(6, Kicks, ValueType::Uint256),
            ],
            AuctionKind::Flop => vec![
                scalar(2, Vat, ValueType::Address),
                scalar(3, Gem, ValueType::Address),
                scalar(4, Beg, ValueType::Uint256),
                scalar(5, Pad, ValueType::Uint256),
                packed(6),
                scalar(7, Kicks, ValueType::Uint256),
                scalar(8, Live, ValueType::Uint256),
                scalar(9, Vow, ValueType::Address),
            ],
        }
    }

    fn identifier_classes(&self) -> Vec<(AuctionIdentifiers, &'static IdentifierClass)> {
        vec![(AuctionIdentifiers::BidIds, self.kind.bid_ids())]
    }

    fn dynamic_keys(
        &self,
        class: AuctionIdentifiers,
        identifier: &KnownIdentifier,
    ) -> Result<Vec<(StorageKey, ValueMetadata<AuctionField>)>, DecodeError> {
        use AuctionField::*;
        let AuctionIdentifiers::BidIds = class;
        let base = mapping_key(BIDS_SLOT, &identifier.primary)?;
        let keys = BTreeMap::from([(KeyName::BidId, identifier.primary.clone())]);
        let member = |n, field, ty| {
            (field_offset(&base, n), ValueMetadata::with_keys(field, keys.clone(), ty))
        };
        let mut res = vec![
            member(0, BidBid, ValueType::Uint256),
            member(1, BidLot, ValueType::Uint256),
            (
                field_offset(&base, 2),
                ValueMetadata::packed(
                    BidGuyTicEnd,
                    keys.clone(),
                    vec![
                        (BidGuy, ValueType::Address),
                        (BidTic, ValueType::Uint48),
                        (BidEnd, ValueType::Uint48),
                    ],
                ),
            ),
        ];
        if self.kind == AuctionKind::Flip {
            res.extend([
                member(3, BidUsr, ValueType::Address),
                member(4, BidGal, ValueType::Address),
                member(5, BidTab, ValueType::Uint256),
            ]);
        }
        Ok(res)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AuctionRepository {
    kind: AuctionKind,
}

impl AuctionRepository {
    pub fn new(kind: AuctionKind) -> Self {
        Self { kind }
    }
}

impl StorageRepository for AuctionRepository {
    type Field = AuctionField;

    fn write(
        &self,
        diff: &StorageDiff,
        metadata: &ValueMetadata<AuctionField>,
        field: AuctionField,
        value: &DecodedValue,
    ) -> Result<StorageWrite, ExtractionError> {
        use AuctionField::*;
        let table = self.kind.table(field).ok_or_else(|| {
            ExtractionError::DispatchMismatch(format!("{:?} has no field {:?}", self.kind, field))
        })?;
        let model = match field {
            BidBid | BidLot | BidGuy | BidTic | BidEnd | BidUsr | BidGal | BidTab => {
                let bid_id = required_key(metadata, KeyName::BidId)?;
                storage_fact(table, diff)
                    .column("bid_id", ColumnValue::Numeric(bid_id.to_string()))
                    .column(field.column(), value_column(table, value)?)
            }
            Ilk => storage_fact(table, diff).foreign_key(ForeignKeyField::Ilk, ilk_value(table, value)?),
            Vat | Gem | Beg | Pad | Ttl | Tau | Kicks | Live | Vow => {
                storage_fact(table, diff).column(field.column(), value_column(table, value)?)
            }
            // `table` has no entry for packed slots, they never get here.
            BidGuyTicEnd | TtlAndTau => {
                return Err(ExtractionError::DispatchMismatch(format!(
                    "{:?} must be fanned out",
                    field
                )))
            }
        };
        Ok(StorageWrite::Upsert(model))
    }
}
