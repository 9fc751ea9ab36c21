use super::elst::{parse_elst, presentation_start};
use super::mdhd::{parse_mdhd, MediaHeader};
use super::mvhd::MovieHeader;
use super::r#box::*;
use super::stco::parse_chunk_offsets;
use super::stsc::{parse_stsc, samples_per_chunk};
use super::stsd::parse_stsd;
use super::stss::parse_stss;
use super::stsz::{parse_stsz, parse_stz2};
use super::stts::{build_decode_times, parse_stts};
use super::ctts::{expand_composition_offsets, parse_ctts};
use super::scale_to_us;
use crate::bits::ByteCursor;
use crate::errors::{MediaParserError, MediaParserResult};
use crate::extractor::format::{Track, TrackType};
use crate::extractor::output::SampleFlags;
use crate::sample_table::SampleTable;
use log::debug;

/// A track assembled from a `trak` atom
#[derive(Debug, Clone)]
pub struct Mp4Track {
    pub track: Track,
    pub media_header: MediaHeader,
    /// Media time at which presentation starts, from the edit list.
    pub edit_start: i64,
    /// Complete for progressive files, empty for fragmented ones.
    pub sample_table: SampleTable,
}

impl Mp4Track {
    pub fn id(&self) -> u32 {
        self.track.id
    }

    /// Presentation time in microseconds of a media time. `None` when shifting by the edit
    /// overflows.
    pub fn media_time_to_us(&self, media_time: i64) -> Option<i64> {
        let presentation_time = media_time.checked_sub(self.edit_start)?;
        Some(scale_to_us(presentation_time, self.media_header.timescale))
    }
}

/// Track id from a tkhd payload.
pub fn parse_tkhd(payload: &[u8]) -> MediaParserResult<u32> {
    let (version, _, mut cursor) = parse_full_box(payload)?;
    // creation and modification times
    cursor.skip(if version == 0 { 8 } else { 16 })?;
    Ok(cursor.read_u32()?)
}

/// Track type from an hdlr payload.
pub fn parse_hdlr(payload: &[u8]) -> MediaParserResult<TrackType> {
    let mut cursor = ByteCursor::new(payload);
    cursor.skip(8)?; // version, flags, pre_defined
    let track_type = match &cursor.read_fourcc()? {
        b"vide" => TrackType::Video,
        b"soun" => TrackType::Audio,
        b"text" | b"sbtl" | b"subt" | b"clcp" => TrackType::Text,
        b"meta" => TrackType::Metadata,
        _ => TrackType::Unknown,
    };
    Ok(track_type)
}

fn required_leaf<'a>(atom: &'a ContainerAtom, leaf: &FourCc) -> MediaParserResult<&'a [u8]> {
    atom.leaf(leaf).ok_or_else(|| {
        MediaParserError::malformed(format!(
            "{} without {}",
            fourcc_name(&atom.atom_type),
            fourcc_name(leaf)
        ))
    })
}

fn required_container<'a>(
    atom: &'a ContainerAtom,
    child: &FourCc,
) -> MediaParserResult<&'a ContainerAtom> {
    atom.container(child).ok_or_else(|| {
        MediaParserError::malformed(format!(
            "{} without {}",
            fourcc_name(&atom.atom_type),
            fourcc_name(child)
        ))
    })
}

/// Assemble a track from a `trak` atom.
///
/// Returns `None` for tracks with an unknown handler or no supported sample entry. When
/// `is_fragmented` is set the sample tables in `stbl` are ignored.
pub fn parse_trak(
    trak: &ContainerAtom,
    movie_header: &MovieHeader,
    is_fragmented: bool,
) -> MediaParserResult<Option<Mp4Track>> {
    let id = parse_tkhd(required_leaf(trak, &TKHD)?)?;
    let mdia = required_container(trak, &MDIA)?;
    let track_type = parse_hdlr(required_leaf(mdia, &HDLR)?)?;
    if track_type == TrackType::Unknown {
        debug!("skipping track {} with unknown handler", id);
        return Ok(None);
    }
    let media_header = parse_mdhd(required_leaf(mdia, &MDHD)?)?;
    let stbl = required_container(required_container(mdia, &MINF)?, &STBL)?;
    let mut format = match parse_stsd(required_leaf(stbl, &STSD)?)? {
        Some(format) => format,
        None => {
            debug!("skipping track {} without a supported sample entry", id);
            return Ok(None);
        }
    };
    format.id = Some(id.to_string());
    format.language = media_header.language.clone();

    let edit_start = match trak.container(&EDTS).and_then(|edts| edts.leaf(&ELST)) {
        Some(elst) => presentation_start(&parse_elst(elst)?).unwrap_or(0),
        None => 0,
    };

    let duration_us = track_duration_us(&media_header, movie_header);
    let sample_table = if is_fragmented {
        SampleTable::empty()
    } else {
        build_sample_table(stbl, &media_header, edit_start)?
    };
    if !sample_table.is_empty() {
        format.max_input_size = Some(sample_table.maximum_size() as usize);
    }

    Ok(Some(Mp4Track {
        track: Track {
            id,
            track_type,
            format,
            duration_us,
        },
        media_header,
        edit_start,
        sample_table,
    }))
}

fn track_duration_us(media_header: &MediaHeader, movie_header: &MovieHeader) -> Option<i64> {
    let unknown = media_header.duration == 0
        || media_header.duration == u64::from(u32::MAX)
        || media_header.duration == u64::MAX;
    if unknown {
        movie_header.duration_us()
    } else {
        Some(scale_to_us(
            media_header.duration as i64,
            media_header.timescale,
        ))
    }
}

/// Build the sample table of a progressive track from its stbl atom.
pub fn build_sample_table(
    stbl: &ContainerAtom,
    media_header: &MediaHeader,
    edit_start: i64,
) -> MediaParserResult<SampleTable> {
    let sizes = match (stbl.leaf(&STSZ), stbl.leaf(&STZ2)) {
        (Some(stsz), _) => parse_stsz(stsz)?,
        (None, Some(stz2)) => parse_stz2(stz2)?,
        (None, None) => return Err(MediaParserError::malformed("stbl without stsz or stz2")),
    };
    let chunk_offsets = match (stbl.leaf(&STCO), stbl.leaf(&CO64)) {
        (Some(stco), _) => parse_chunk_offsets(stco, false)?,
        (None, Some(co64)) => parse_chunk_offsets(co64, true)?,
        (None, None) => return Err(MediaParserError::malformed("stbl without stco or co64")),
    };
    let chunk_samples = samples_per_chunk(
        &parse_stsc(required_leaf(stbl, &STSC)?)?,
        chunk_offsets.len(),
    );

    let mut offsets = Vec::with_capacity(sizes.len());
    'chunks: for (chunk_offset, count) in chunk_offsets.iter().zip(&chunk_samples) {
        let mut offset = *chunk_offset;
        for _ in 0..*count {
            let Some(size) = sizes.get(offsets.len()) else {
                break 'chunks;
            };
            offsets.push(offset);
            offset = offset
                .checked_add(u64::from(*size))
                .ok_or_else(|| MediaParserError::malformed("chunk offset overflows"))?;
        }
    }
    let sample_count = offsets.len();
    if sample_count < sizes.len() {
        debug!(
            "chunk table covers {} of {} samples, truncating",
            sample_count,
            sizes.len()
        );
    }
    let sizes = sizes[..sample_count].to_vec();

    let (decode_times, end_time) =
        build_decode_times(&parse_stts(required_leaf(stbl, &STTS)?)?, sample_count);
    let composition_offsets = match stbl.leaf(&CTTS) {
        Some(ctts) => expand_composition_offsets(&parse_ctts(ctts)?, sample_count),
        None => vec![0; sample_count],
    };
    let timescale = media_header.timescale;
    let timestamps_us = decode_times
        .iter()
        .zip(&composition_offsets)
        .map(|(decode, cts)| {
            decode
                .checked_add(*cts)
                .and_then(|t| t.checked_sub(edit_start))
                .map(|t| scale_to_us(t, timescale))
                .ok_or_else(|| MediaParserError::malformed("sample time overflows"))
        })
        .collect::<MediaParserResult<Vec<i64>>>()?;

    let mut flags = match stbl.leaf(&STSS) {
        Some(stss) => {
            let mut flags = vec![SampleFlags::NONE; sample_count];
            for number in parse_stss(stss)? {
                // 1-based sample numbers
                if let Some(flag) = (number as usize)
                    .checked_sub(1)
                    .and_then(|index| flags.get_mut(index))
                {
                    flag.insert(SampleFlags::KEYFRAME);
                }
            }
            flags
        }
        None => vec![SampleFlags::KEYFRAME; sample_count],
    };
    flags.truncate(sample_count);

    SampleTable::new(
        offsets,
        sizes,
        timestamps_us,
        flags,
        scale_to_us(end_time.saturating_sub(edit_start), timescale),
    )
}
