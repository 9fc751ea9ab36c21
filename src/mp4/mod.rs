/*
# MP4 Module

 ISO base media file format readers: the box walker for progressive files (`moov` + `mdat`) and
 the movie fragment reader (`moof` + `mdat`), plus the per-box parsers they share.
*/

pub mod r#box;
pub use r#box::{find_box, parse_box_header, BoxHeader, BoxIter, ContainerAtom, FourCc};
pub mod atom_reader;
pub mod avcc;
pub use avcc::AvccConfig;
pub mod ctts;
pub mod elst;
pub mod extractor;
pub use extractor::Mp4Extractor;
pub mod fragment;
pub mod fragmented;
pub use fragmented::FragmentedMp4Extractor;
pub mod ftyp;
pub use ftyp::{sniff_mp4, Mp4Brand};
pub mod mdhd;
pub mod mvhd;
pub mod stco;
pub mod stsc;
pub mod stsd;
pub mod stss;
pub mod stsz;
pub mod stts;
pub mod trak;
pub use trak::{parse_trak, Mp4Track};
pub mod udta;

use r#box::*;

/// Skips of at least this many bytes are requested from the caller as a seek instead of being
/// read through.
pub const RELOAD_MINIMUM_SEEK_DISTANCE: u64 = 256 * 1024;

/// Largest leaf atom buffered in memory.
pub const MAX_LEAF_ATOM_SIZE: u64 = 64 * 1024 * 1024;

/// Most samples a single table or fragment run may declare.
pub const MAX_SAMPLE_COUNT: u32 = 1 << 22;

/// Convert `value` in `timescale` units to microseconds, truncating.
pub fn scale_to_us(value: i64, timescale: u32) -> i64 {
    if timescale == 0 {
        return 0;
    }
    (i128::from(value) * 1_000_000 / i128::from(timescale)) as i64
}

/// Atoms whose payload is a sequence of child atoms that the readers descend into.
pub fn is_container_atom(atom_type: &FourCc) -> bool {
    matches!(
        *atom_type,
        MOOV | TRAK | MDIA | MINF | STBL | EDTS | MVEX | MOOF | TRAF
    )
}

/// Leaf atoms the readers keep in memory for parsing.
pub fn is_parsed_leaf_atom(atom_type: &FourCc) -> bool {
    matches!(
        *atom_type,
        TKHD | MDHD
            | HDLR
            | STSD
            | STTS
            | CTTS
            | STSS
            | STSC
            | STSZ
            | STZ2
            | STCO
            | CO64
            | ELST
            | MVHD
            | UDTA
            | MEHD
            | TREX
            | MFHD
            | TFHD
            | TFDT
            | TRUN
            | FTYP
    )
}
