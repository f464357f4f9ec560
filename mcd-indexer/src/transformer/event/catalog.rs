//! Every event we transform, with the columns it writes.
//!
//! Auction and Jug/Cat notes put `msg.sender` in the second topic and the
//! first two call arguments in the last two. Vat notes put the first three
//! call arguments in topics.
use super::{
    abi::{AbiColumn, AbiConverter},
    note::{NoteColumn, NoteConverter, NoteValue, NoteWord},
    EventConverter,
};
use crate::{config::ContractKind, transformer::ExtractionError};

use NoteValue::{Address, Ilk, Int, Text, Uint};
use NoteWord::{Arg, Topic};

const AUCTIONS: &[ContractKind] = &[ContractKind::Flap, ContractKind::Flip, ContractKind::Flop];
const VAT: &[ContractKind] = &[ContractKind::Vat];
const JUG: &[ContractKind] = &[ContractKind::Jug];
const CAT: &[ContractKind] = &[ContractKind::Cat];

const fn col(name: &'static str, word: NoteWord, value: NoteValue) -> NoteColumn {
    NoteColumn::new(name, word, value)
}

const ILK_T1: NoteColumn = col("ilk_id", Topic(1), Ilk);
const ILK_T2: NoteColumn = col("ilk_id", Topic(2), Ilk);
const BID_ID: NoteColumn = col("bid_id", Topic(2), Uint);

const BID_ID_COLUMNS: &[NoteColumn] = &[BID_ID];
const BID_COLUMNS: &[NoteColumn] = &[BID_ID, col("lot", Topic(3), Uint), col("bid", Arg(2), Uint)];
const VAT_ILK_COLUMNS: &[NoteColumn] = &[ILK_T1];
const SLIP_COLUMNS: &[NoteColumn] =
    &[ILK_T1, col("usr", Topic(2), Address), col("wad", Topic(3), Int)];
const FLUX_COLUMNS: &[NoteColumn] = &[
    ILK_T1,
    col("src", Topic(2), Address),
    col("dst", Topic(3), Address),
    col("wad", Arg(3), Uint),
];
const MOVE_COLUMNS: &[NoteColumn] =
    &[col("src", Topic(1), Address), col("dst", Topic(2), Address), col("rad", Topic(3), Uint)];
const FROB_COLUMNS: &[NoteColumn] = &[
    ILK_T1,
    col("u", Topic(2), Address),
    col("v", Topic(3), Address),
    col("w", Arg(3), Address),
    col("dink", Arg(4), Int),
    col("dart", Arg(5), Int),
];
const FORK_COLUMNS: &[NoteColumn] = &[
    ILK_T1,
    col("src", Topic(2), Address),
    col("dst", Topic(3), Address),
    col("dink", Arg(3), Int),
    col("dart", Arg(4), Int),
];
const FOLD_COLUMNS: &[NoteColumn] =
    &[ILK_T1, col("u", Topic(2), Address), col("rate", Topic(3), Int)];
const SUCK_COLUMNS: &[NoteColumn] =
    &[col("u", Topic(1), Address), col("v", Topic(2), Address), col("rad", Topic(3), Uint)];
const JUG_ILK_COLUMNS: &[NoteColumn] = &[ILK_T2];
const FILE_UINT_COLUMNS: &[NoteColumn] =
    &[ILK_T2, col("what", Topic(3), Text), col("data", Arg(2), Uint)];
const FILE_ADDRESS_COLUMNS: &[NoteColumn] =
    &[ILK_T2, col("what", Topic(3), Text), col("flip", Arg(2), Address)];

const fn plain(param: &'static str, column: &'static str) -> AbiColumn {
    AbiColumn::Plain { param, column }
}

const FLAP_KICK_COLUMNS: &[AbiColumn] =
    &[plain("id", "bid_id"), plain("lot", "lot"), plain("bid", "bid")];
const FLIP_KICK_COLUMNS: &[AbiColumn] = &[
    plain("id", "bid_id"),
    plain("lot", "lot"),
    plain("bid", "bid"),
    plain("tab", "tab"),
    plain("usr", "usr"),
    plain("gal", "gal"),
];
const FLOP_KICK_COLUMNS: &[AbiColumn] =
    &[plain("id", "bid_id"), plain("lot", "lot"), plain("bid", "bid"), plain("gal", "gal")];
const BITE_COLUMNS: &[AbiColumn] = &[
    AbiColumn::Ilk { param: "ilk" },
    plain("urn", "urn"),
    plain("ink", "ink"),
    plain("art", "art"),
    plain("tab", "tab"),
    plain("flip", "flip"),
    plain("id", "bid_id"),
];

pub fn flap_kick() -> Result<AbiConverter, ExtractionError> {
    AbiConverter::new(
        "flap_kick",
        "event Kick(uint256 id, uint256 lot, uint256 bid)",
        FLAP_KICK_COLUMNS,
        &[ContractKind::Flap],
    )
}

pub fn flip_kick() -> Result<AbiConverter, ExtractionError> {
    AbiConverter::new(
        "flip_kick",
        "event Kick(uint256 id, uint256 lot, uint256 bid, uint256 tab, address indexed usr, address indexed gal)",
        FLIP_KICK_COLUMNS,
        &[ContractKind::Flip],
    )
}

pub fn flop_kick() -> Result<AbiConverter, ExtractionError> {
    AbiConverter::new(
        "flop_kick",
        "event Kick(uint256 id, uint256 lot, uint256 bid, address indexed gal)",
        FLOP_KICK_COLUMNS,
        &[ContractKind::Flop],
    )
}

pub fn cat_bite() -> Result<AbiConverter, ExtractionError> {
    AbiConverter::new(
        "cat_bite",
        "event Bite(bytes32 indexed ilk, address indexed urn, uint256 ink, uint256 art, uint256 tab, address flip, uint256 id)",
        BITE_COLUMNS,
        CAT,
    )
}

pub fn tend() -> NoteConverter {
    NoteConverter::new(
        "tend",
        "tend(uint256,uint256,uint256)",
        BID_COLUMNS,
        AUCTIONS,
    )
}

pub fn dent() -> NoteConverter {
    NoteConverter::new(
        "dent",
        "dent(uint256,uint256,uint256)",
        BID_COLUMNS,
        &[ContractKind::Flip, ContractKind::Flop],
    )
}

pub fn deal() -> NoteConverter {
    NoteConverter::new("deal", "deal(uint256)", BID_ID_COLUMNS, AUCTIONS)
}

pub fn yank() -> NoteConverter {
    NoteConverter::new("yank", "yank(uint256)", BID_ID_COLUMNS, AUCTIONS)
}

pub fn tick() -> NoteConverter {
    NoteConverter::new("tick", "tick(uint256)", BID_ID_COLUMNS, AUCTIONS)
}

pub fn vat_init() -> NoteConverter {
    NoteConverter::new("vat_init", "init(bytes32)", VAT_ILK_COLUMNS, VAT)
}

pub fn vat_slip() -> NoteConverter {
    NoteConverter::new(
        "vat_slip",
        "slip(bytes32,address,int256)",
        SLIP_COLUMNS,
        VAT,
    )
}

pub fn vat_flux() -> NoteConverter {
    NoteConverter::new(
        "vat_flux",
        "flux(bytes32,address,address,uint256)",
        FLUX_COLUMNS,
        VAT,
    )
}

pub fn vat_move() -> NoteConverter {
    NoteConverter::new(
        "vat_move",
        "move(address,address,uint256)",
        MOVE_COLUMNS,
        VAT,
    )
}

pub fn vat_frob() -> NoteConverter {
    NoteConverter::new(
        "vat_frob",
        "frob(bytes32,address,address,address,int256,int256)",
        FROB_COLUMNS,
        VAT,
    )
}

pub fn vat_grab() -> NoteConverter {
    NoteConverter::new(
        "vat_grab",
        "grab(bytes32,address,address,address,int256,int256)",
        FROB_COLUMNS,
        VAT,
    )
}

pub fn vat_fork() -> NoteConverter {
    NoteConverter::new(
        "vat_fork",
        "fork(bytes32,address,address,int256,int256)",
        FORK_COLUMNS,
        VAT,
    )
}

pub fn vat_fold() -> NoteConverter {
    NoteConverter::new(
        "vat_fold",
        "fold(bytes32,address,int256)",
        FOLD_COLUMNS,
        VAT,
    )
}

pub fn vat_suck() -> NoteConverter {
    NoteConverter::new(
        "vat_suck",
        "suck(address,address,uint256)",
        SUCK_COLUMNS,
        VAT,
    )
}

pub fn jug_init() -> NoteConverter {
    NoteConverter::new("jug_init", "init(bytes32)", JUG_ILK_COLUMNS, JUG)
}

pub fn jug_drip() -> NoteConverter {
    NoteConverter::new("jug_drip", "drip(bytes32)", JUG_ILK_COLUMNS, JUG)
}

pub fn jug_file_ilk() -> NoteConverter {
    NoteConverter::new("jug_file_ilk", "file(bytes32,bytes32,uint256)", FILE_UINT_COLUMNS, JUG)
}

pub fn cat_file_chop_lump() -> NoteConverter {
    NoteConverter::new(
        "cat_file_chop_lump",
        "file(bytes32,bytes32,uint256)",
        FILE_UINT_COLUMNS,
        CAT,
    )
}

pub fn cat_file_flip() -> NoteConverter {
    NoteConverter::new(
        "cat_file_flip",
        "file(bytes32,bytes32,address)",
        FILE_ADDRESS_COLUMNS,
        CAT,
    )
}

/// Every converter, in the order their transformers run for a header.
pub fn all_converters() -> Result<Vec<Box<dyn EventConverter>>, ExtractionError> {
    Ok(vec![
        Box::new(flap_kick()?),
        Box::new(flip_kick()?),
        Box::new(flop_kick()?),
        Box::new(tend()),
        Box::new(dent()),
        Box::new(deal()),
        Box::new(yank()),
        Box::new(tick()),
        Box::new(vat_init()),
        Box::new(vat_slip()),
        Box::new(vat_flux()),
        Box::new(vat_move()),
        Box::new(vat_frob()),
        Box::new(vat_grab()),
        Box::new(vat_fork()),
        Box::new(vat_fold()),
        Box::new(vat_suck()),
        Box::new(jug_init()),
        Box::new(jug_drip()),
        Box::new(jug_file_ilk()),
        Box::new(cat_file_chop_lump()),
        Box::new(cat_file_flip()),
        Box::new(cat_bite()?),
    ])
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use rstest::rstest;

    use super::*;

    #[test]
    fn test_labels_are_unique() {
        let converters = all_converters().unwrap();
        let labels: HashSet<_> = converters.iter().map(|c| c.label()).collect();

        assert_eq!(converters.len(), 23);
        assert_eq!(labels.len(), converters.len());
    }

    #[test]
    fn test_every_kind_emits_something() {
        let converters = all_converters().unwrap();

        for kind in [
            ContractKind::Flap,
            ContractKind::Flip,
            ContractKind::Flop,
            ContractKind::Vat,
            ContractKind::Jug,
            ContractKind::Cat,
        ] {
            assert!(converters
                .iter()
                .any(|c| c.emitters().contains(&kind)));
        }
    }

    #[rstest]
    #[case::move_("vat_move", "bb35783b")]
    #[case::slip("vat_slip", "7cdd3fde")]
    #[case::flux("vat_flux", "6111be2e")]
    #[case::grab("vat_grab", "7bab3f40")]
    #[case::fork("vat_fork", "870c616d")]
    #[case::fold("vat_fold", "b65337df")]
    #[case::suck("vat_suck", "f24e23eb")]
    #[case::drip("jug_drip", "44e2a5a8")]
    #[case::dent("dent", "5ff3a382")]
    #[case::yank("yank", "26e027f1")]
    #[case::tick("tick", "fc7b6aee")]
    fn test_note_topic(#[case] label: &str, #[case] exp: &str) {
        let converters = all_converters().unwrap();
        let converter = converters
            .iter()
            .find(|c| c.label() == label)
            .unwrap();

        assert_eq!(hex::encode(&converter.topic0()[..4]), exp);
    }

    #[test]
    fn test_shared_selectors_have_disjoint_emitters() {
        let (jug, cat) = (jug_file_ilk(), cat_file_chop_lump());

        assert_eq!(jug.topic0(), cat.topic0());
        assert!(jug
            .emitters()
            .iter()
            .all(|k| !cat.emitters().contains(k)));
    }
}
