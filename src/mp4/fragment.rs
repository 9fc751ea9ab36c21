//! Movie fragment boxes: `trex`, `mehd`, `tfhd`, `tfdt` and `trun`.

use super::r#box::parse_full_box;
use super::stts::{check_entries, check_sample_count};
use crate::errors::MediaParserResult;

/// Per-track sample defaults from `trex`, overridable per fragment by `tfhd`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleDefaults {
    pub sample_description_index: u32,
    pub duration: u32,
    pub size: u32,
    pub flags: u32,
}

/// Parse trex payload into `(track_id, defaults)`.
pub fn parse_trex(payload: &[u8]) -> MediaParserResult<(u32, SampleDefaults)> {
    let (_, _, mut cursor) = parse_full_box(payload)?;
    let track_id = cursor.read_u32()?;
    Ok((
        track_id,
        SampleDefaults {
            sample_description_index: cursor.read_u32()?,
            duration: cursor.read_u32()?,
            size: cursor.read_u32()?,
            flags: cursor.read_u32()?,
        },
    ))
}

/// Fragment duration from mehd, in movie timescale units.
pub fn parse_mehd(payload: &[u8]) -> MediaParserResult<u64> {
    let (version, _, mut cursor) = parse_full_box(payload)?;
    Ok(if version == 1 {
        cursor.read_u64()?
    } else {
        u64::from(cursor.read_u32()?)
    })
}

const TFHD_BASE_DATA_OFFSET: u32 = 0x01;
const TFHD_SAMPLE_DESCRIPTION_INDEX: u32 = 0x02;
const TFHD_DEFAULT_DURATION: u32 = 0x08;
const TFHD_DEFAULT_SIZE: u32 = 0x10;
const TFHD_DEFAULT_FLAGS: u32 = 0x20;
const TFHD_DEFAULT_BASE_IS_MOOF: u32 = 0x02_0000;

/// Track fragment header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackFragmentHeader {
    pub track_id: u32,
    /// Explicit base data offset. `None` means the enclosing `moof` start.
    pub base_data_offset: Option<u64>,
    pub default_base_is_moof: bool,
    pub defaults: SampleDefaults,
}

/// Parse tfhd, filling unset defaults from the track's `trex` values.
pub fn parse_tfhd(payload: &[u8], trex: impl Fn(u32) -> SampleDefaults) -> MediaParserResult<TrackFragmentHeader> {
    let (_, flags, mut cursor) = parse_full_box(payload)?;
    let track_id = cursor.read_u32()?;
    let mut defaults = trex(track_id);
    let base_data_offset = if flags & TFHD_BASE_DATA_OFFSET != 0 {
        Some(cursor.read_u64()?)
    } else {
        None
    };
    if flags & TFHD_SAMPLE_DESCRIPTION_INDEX != 0 {
        defaults.sample_description_index = cursor.read_u32()?;
    }
    if flags & TFHD_DEFAULT_DURATION != 0 {
        defaults.duration = cursor.read_u32()?;
    }
    if flags & TFHD_DEFAULT_SIZE != 0 {
        defaults.size = cursor.read_u32()?;
    }
    if flags & TFHD_DEFAULT_FLAGS != 0 {
        defaults.flags = cursor.read_u32()?;
    }
    Ok(TrackFragmentHeader {
        track_id,
        base_data_offset,
        default_base_is_moof: flags & TFHD_DEFAULT_BASE_IS_MOOF != 0,
        defaults,
    })
}

/// Base media decode time from tfdt.
pub fn parse_tfdt(payload: &[u8]) -> MediaParserResult<u64> {
    parse_mehd(payload)
}

const TRUN_DATA_OFFSET: u32 = 0x01;
const TRUN_FIRST_SAMPLE_FLAGS: u32 = 0x04;
const TRUN_SAMPLE_DURATION: u32 = 0x100;
const TRUN_SAMPLE_SIZE: u32 = 0x200;
const TRUN_SAMPLE_FLAGS: u32 = 0x400;
const TRUN_SAMPLE_COMPOSITION_OFFSET: u32 = 0x800;

/// One sample described by a trun
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrunSample {
    pub duration: u32,
    pub size: u32,
    pub flags: u32,
    pub composition_offset: i64,
}

impl TrunSample {
    /// `sample_is_non_sync_sample` clear.
    pub fn is_sync(&self) -> bool {
        (self.flags >> 16) & 1 == 0
    }
}

/// Track fragment run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRun {
    /// Offset of the first sample from the fragment's base data offset.
    pub data_offset: Option<i32>,
    pub samples: Vec<TrunSample>,
}

/// Parse trun, applying `defaults` to fields the run omits.
pub fn parse_trun(payload: &[u8], defaults: &SampleDefaults) -> MediaParserResult<TrackRun> {
    let (version, flags, mut cursor) = parse_full_box(payload)?;
    let sample_count = cursor.read_u32()?;
    check_sample_count("trun", sample_count)?;
    let data_offset = if flags & TRUN_DATA_OFFSET != 0 {
        Some(cursor.read_i32()?)
    } else {
        None
    };
    let first_sample_flags = if flags & TRUN_FIRST_SAMPLE_FLAGS != 0 {
        Some(cursor.read_u32()?)
    } else {
        None
    };
    let per_sample_fields = [
        TRUN_SAMPLE_DURATION,
        TRUN_SAMPLE_SIZE,
        TRUN_SAMPLE_FLAGS,
        TRUN_SAMPLE_COMPOSITION_OFFSET,
    ]
    .iter()
    .filter(|f| flags & **f != 0)
    .count();
    check_entries("trun", &cursor, sample_count, per_sample_fields * 4)?;

    let mut samples = Vec::with_capacity(sample_count as usize);
    for i in 0..sample_count {
        let duration = if flags & TRUN_SAMPLE_DURATION != 0 {
            cursor.read_u32()?
        } else {
            defaults.duration
        };
        let size = if flags & TRUN_SAMPLE_SIZE != 0 {
            cursor.read_u32()?
        } else {
            defaults.size
        };
        let sample_flags = if flags & TRUN_SAMPLE_FLAGS != 0 {
            cursor.read_u32()?
        } else {
            match first_sample_flags {
                Some(first) if i == 0 => first,
                _ => defaults.flags,
            }
        };
        let composition_offset = if flags & TRUN_SAMPLE_COMPOSITION_OFFSET != 0 {
            if version == 0 {
                i64::from(cursor.read_u32()?)
            } else {
                i64::from(cursor.read_i32()?)
            }
        } else {
            0
        };
        samples.push(TrunSample {
            duration,
            size,
            flags: sample_flags,
            composition_offset,
        });
    }
    Ok(TrackRun {
        data_offset,
        samples,
    })
}
