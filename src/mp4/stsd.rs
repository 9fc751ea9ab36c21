use super::avcc::AvccConfig;
use super::r#box::{find_box, parse_full_box, BoxIter};
use crate::bits::ByteCursor;
use crate::errors::MediaParserResult;
use crate::extractor::format::*;
use log::{debug, warn};

/// Bytes between the sample entry header and the video fields (reserved + data reference index
/// + pre_defined/reserved).
const VISUAL_ENTRY_WIDTH_OFFSET: usize = 24;
/// Fixed part of a VisualSampleEntry, after the sample entry header.
const VISUAL_ENTRY_SIZE: usize = 78;
/// Reserved + data reference index of any sample entry.
const SAMPLE_ENTRY_HEADER_SIZE: usize = 8;

const ES_DESCRIPTOR_TAG: u8 = 0x03;
const DECODER_CONFIG_DESCRIPTOR_TAG: u8 = 0x04;
const DECODER_SPECIFIC_INFO_TAG: u8 = 0x05;

/// Parse the first supported sample entry of an stsd box payload into a track format.
///
/// Returns `None` when no entry has a sample type this reader emits.
pub fn parse_stsd(payload: &[u8]) -> MediaParserResult<Option<Format>> {
    let (_, _, mut cursor) = parse_full_box(payload)?;
    let entry_count = cursor.read_u32()?;
    let entries = cursor.remaining();
    for (index, entry) in BoxIter::new(entries).enumerate() {
        if index as u32 >= entry_count {
            break;
        }
        let (entry_type, body) = entry?;
        if let Some(format) = parse_sample_entry(&entry_type, body)? {
            return Ok(Some(format));
        }
        debug!(
            "skipping unsupported sample entry {}",
            super::r#box::fourcc_name(&entry_type)
        );
    }
    Ok(None)
}

fn parse_sample_entry(entry_type: &[u8; 4], body: &[u8]) -> MediaParserResult<Option<Format>> {
    let format = match entry_type {
        b"avc1" | b"avc3" | b"hvc1" | b"hev1" | b"av01" | b"mp4v" => {
            Some(parse_visual_entry(entry_type, body)?)
        }
        b"mp4a" | b"Opus" | b"fLaC" | b"ac-3" | b"ec-3" | b"alaw" | b"ulaw" => {
            Some(parse_audio_entry(entry_type, body)?)
        }
        b"tx3g" => Some(Format::with_mime_type(TEXT_TX3G)),
        b"wvtt" => Some(Format::with_mime_type(TEXT_MP4VTT)),
        b"stpp" => Some(Format::with_mime_type(TEXT_TTML)),
        _ => None,
    };
    Ok(format)
}

fn parse_visual_entry(entry_type: &[u8; 4], body: &[u8]) -> MediaParserResult<Format> {
    let mut cursor = ByteCursor::new(body);
    cursor.skip(VISUAL_ENTRY_WIDTH_OFFSET)?;
    let width = u32::from(cursor.read_u16()?);
    let height = u32::from(cursor.read_u16()?);
    cursor.set_position(VISUAL_ENTRY_SIZE.min(body.len()))?;
    let children = cursor.remaining();

    let mut format = Format {
        width: Some(width),
        height: Some(height),
        ..Format::default()
    };
    match entry_type {
        b"avc1" | b"avc3" => {
            format.sample_mime_type = Some(VIDEO_H264.to_string());
            if let Some(avcc) = find_box(children, b"avcC") {
                let config = AvccConfig::parse(avcc)?;
                let name = if entry_type == b"avc1" { "avc1" } else { "avc3" };
                format.codecs = Some(config.codecs_string(name));
                format.initialization_data = config.initialization_data();
            }
        }
        b"hvc1" | b"hev1" => {
            format.sample_mime_type = Some(VIDEO_H265.to_string());
            if let Some(hvcc) = find_box(children, b"hvcC") {
                format.initialization_data = vec![hvcc.to_vec()];
            }
        }
        b"av01" => {
            format.sample_mime_type = Some(VIDEO_AV1.to_string());
            if let Some(av1c) = find_box(children, b"av1C") {
                format.initialization_data = vec![av1c.to_vec()];
            }
        }
        _ => {
            format.sample_mime_type = Some(VIDEO_MP4V.to_string());
            if let Some(esds) = find_box(children, b"esds") {
                if let Some((_, info)) = parse_esds(esds)? {
                    format.initialization_data = vec![info];
                }
            }
        }
    }
    Ok(format)
}

fn parse_audio_entry(entry_type: &[u8; 4], body: &[u8]) -> MediaParserResult<Format> {
    let mut cursor = ByteCursor::new(body);
    cursor.skip(SAMPLE_ENTRY_HEADER_SIZE)?;
    // QuickTime sound description version, 0 for plain ISO entries
    let version = cursor.read_u16()?;
    cursor.skip(6)?; // revision level, vendor
    let (channel_count, sample_rate) = if version == 2 {
        cursor.skip(16)?; // always3, always16, alwaysMinus2, always0, always65536, sizeOfStruct
        let sample_rate = f64::from_bits(cursor.read_u64()?).round() as u32;
        let channel_count = cursor.read_u32()?;
        cursor.skip(20)?;
        (channel_count, sample_rate)
    } else {
        let channel_count = u32::from(cursor.read_u16()?);
        cursor.skip(6)?; // sample size, pre_defined, reserved
        let sample_rate = cursor.read_u32()? >> 16;
        if version == 1 {
            cursor.skip(16)?;
        }
        (channel_count, sample_rate)
    };
    let children = cursor.remaining();

    let mut format = Format {
        channel_count: Some(channel_count),
        sample_rate: Some(sample_rate),
        ..Format::default()
    };
    let mime_type = match entry_type {
        b"mp4a" => {
            let mut mime_type = AUDIO_AAC;
            if let Some(esds) = find_box(children, b"esds") {
                if let Some((object_type, info)) = parse_esds(esds)? {
                    mime_type = mime_type_from_object_type(object_type);
                    format.initialization_data = vec![info];
                }
            }
            mime_type
        }
        b"Opus" => {
            if let Some(dops) = find_box(children, b"dOps") {
                format.initialization_data = vec![opus_head_from_dops(dops)];
            }
            AUDIO_OPUS
        }
        b"fLaC" => {
            if let Some(dfla) = find_box(children, b"dfLa") {
                let (_, _, blocks) = parse_full_box(dfla)?;
                format.initialization_data = vec![[&b"fLaC"[..], blocks.remaining()].concat()];
            }
            AUDIO_FLAC
        }
        b"ac-3" => AUDIO_AC3,
        b"ec-3" => AUDIO_E_AC3,
        b"alaw" => AUDIO_ALAW,
        _ => AUDIO_MLAW,
    };
    format.sample_mime_type = Some(mime_type.to_string());
    Ok(format)
}

/// Map an MPEG-4 objectTypeIndication to a sample MIME type.
pub fn mime_type_from_object_type(object_type: u8) -> &'static str {
    match object_type {
        0x20 => VIDEO_MP4V,
        0x21 => VIDEO_H264,
        0x23 => VIDEO_H265,
        0x69 | 0x6B => AUDIO_MPEG,
        0xA5 => AUDIO_AC3,
        0xA6 => AUDIO_E_AC3,
        _ => AUDIO_AAC,
    }
}

/// Parse an esds payload into `(objectTypeIndication, DecoderSpecificInfo)`.
pub fn parse_esds(payload: &[u8]) -> MediaParserResult<Option<(u8, Vec<u8>)>> {
    let (_, _, mut cursor) = parse_full_box(payload)?;
    if cursor.read_u8()? != ES_DESCRIPTOR_TAG {
        warn!("esds without an ES_Descriptor");
        return Ok(None);
    }
    read_descriptor_size(&mut cursor)?;
    cursor.skip(2)?; // ES_ID
    let flags = cursor.read_u8()?;
    if flags & 0x80 != 0 {
        cursor.skip(2)?; // dependsOn_ES_ID
    }
    if flags & 0x40 != 0 {
        let url_length = cursor.read_u8()?;
        cursor.skip(usize::from(url_length))?;
    }
    if flags & 0x20 != 0 {
        cursor.skip(2)?; // OCR_ES_Id
    }
    if cursor.read_u8()? != DECODER_CONFIG_DESCRIPTOR_TAG {
        return Ok(None);
    }
    read_descriptor_size(&mut cursor)?;
    let object_type = cursor.read_u8()?;
    cursor.skip(12)?; // streamType, bufferSizeDB, maxBitrate, avgBitrate
    if cursor.bytes_left() == 0 || cursor.read_u8()? != DECODER_SPECIFIC_INFO_TAG {
        return Ok(Some((object_type, Vec::new())));
    }
    let size = read_descriptor_size(&mut cursor)?;
    Ok(Some((object_type, cursor.read_bytes(size)?.to_vec())))
}

/// Expandable descriptor size: 7 bits per byte, high bit set on all but the last.
fn read_descriptor_size(cursor: &mut ByteCursor) -> MediaParserResult<usize> {
    let mut size = 0usize;
    for _ in 0..4 {
        let byte = cursor.read_u8()?;
        size = (size << 7) | usize::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            break;
        }
    }
    Ok(size)
}

/// Rebuild an `OpusHead` identification header from a big-endian dOps payload.
fn opus_head_from_dops(dops: &[u8]) -> Vec<u8> {
    let mut head = b"OpusHead".to_vec();
    if dops.len() < 11 {
        head.extend_from_slice(dops);
        return head;
    }
    head.push(1); // version
    head.push(dops[1]); // channel count
    head.extend_from_slice(&[dops[3], dops[2]]); // pre-skip
    head.extend_from_slice(&[dops[7], dops[6], dops[5], dops[4]]); // input sample rate
    head.extend_from_slice(&[dops[9], dops[8]]); // output gain
    head.extend_from_slice(&dops[10..]); // mapping family and table
    head
}
