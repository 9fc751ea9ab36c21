use crate::bits::{BitReader, ByteCursor};
use crate::errors::{MediaParserError, MediaParserResult};
use crate::extractor::format::{Format, AUDIO_FLAC};
use crate::metadata::{parse_flac_picture, parse_vorbis_comments, MetadataEntry};
use log::warn;

const MAPPING_MAGIC: &[u8; 5] = b"\x7FFLAC";
const STREAM_MARKER: &[u8; 4] = b"fLaC";
/// Offset of the `fLaC` marker in the mapping header packet.
const STREAM_MARKER_OFFSET: usize = 9;
const AUDIO_PACKET_TYPE: u8 = 0xFF;

const BLOCK_TYPE_STREAM_INFO: u8 = 0;
const BLOCK_TYPE_VORBIS_COMMENT: u8 = 4;
const BLOCK_TYPE_PICTURE: u8 = 6;
const STREAM_INFO_SIZE: usize = 34;

pub fn is_mapping_header(packet: &[u8]) -> bool {
    packet.starts_with(MAPPING_MAGIC)
}

/// STREAMINFO metadata block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub min_block_size: u32,
    pub max_block_size: u32,
    pub min_frame_size: u32,
    pub max_frame_size: u32,
    pub sample_rate: u32,
    pub channels: u32,
    pub bits_per_sample: u32,
    pub total_samples: u64,
}

pub fn parse_stream_info(data: &[u8]) -> MediaParserResult<StreamInfo> {
    if data.len() < STREAM_INFO_SIZE {
        return Err(MediaParserError::malformed(format!(
            "STREAMINFO block of {} bytes",
            data.len()
        )));
    }
    let mut reader = BitReader::new(data);
    let info = StreamInfo {
        min_block_size: reader.read(16),
        max_block_size: reader.read(16),
        min_frame_size: reader.read(24),
        max_frame_size: reader.read(24),
        sample_rate: reader.read(20),
        channels: reader.read(3) + 1,
        bits_per_sample: reader.read(5) + 1,
        total_samples: reader.read_u64(36),
    };
    reader.finish("STREAMINFO")?;
    Ok(info)
}

/// Samples in the FLAC frame starting `packet`, from the block size key of its header.
pub fn frame_block_size(packet: &[u8]) -> MediaParserResult<u64> {
    let mut cursor = ByteCursor::new(packet);
    let sync = cursor.read_u16()?;
    if sync >> 2 != 0x3FFE {
        return Err(MediaParserError::malformed("FLAC frame without sync code"));
    }
    let key = cursor.read_u8()? >> 4;
    Ok(match key {
        1 => 192,
        2..=5 => 576 << (key - 2),
        6 | 7 => {
            // channel assignment byte, then the coded frame or sample number
            cursor.skip(1)?;
            cursor.read_utf8_encoded_long()?;
            if key == 6 {
                u64::from(cursor.read_u8()?) + 1
            } else {
                u64::from(cursor.read_u16()?) + 1
            }
        }
        8..=15 => 256 << (key - 8),
        _ => 0,
    })
}

/// FLAC-in-Ogg state: the mapping header with STREAMINFO, then the remaining metadata blocks
/// one per packet.
#[derive(Debug, Clone, Default)]
pub struct FlacReader {
    stream_info: Option<StreamInfo>,
    stream_header: Vec<u8>,
    metadata: Vec<MetadataEntry>,
}

impl FlacReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream_info(&self) -> Option<&StreamInfo> {
        self.stream_info.as_ref()
    }

    /// Consume one header packet. Returns true after the block flagged as the last one.
    pub fn read_header(&mut self, packet: &[u8]) -> MediaParserResult<bool> {
        if is_mapping_header(packet) {
            return self.read_mapping_header(packet);
        }
        if self.stream_info.is_none() {
            return Err(MediaParserError::malformed("FLAC metadata before mapping header"));
        }
        if packet.first() == Some(&AUDIO_PACKET_TYPE) {
            return Err(MediaParserError::malformed(
                "FLAC audio frame before the last metadata block",
            ));
        }
        let mut cursor = ByteCursor::new(packet);
        let block_header = cursor.read_u8()?;
        let length = cursor.read_u24()? as usize;
        let body = cursor.read_bytes(length)?;
        match block_header & 0x7F {
            BLOCK_TYPE_VORBIS_COMMENT => {
                self.metadata.extend(parse_vorbis_comments(body)?.entries);
            }
            BLOCK_TYPE_PICTURE => match parse_flac_picture(body) {
                Ok(picture) => self.metadata.push(MetadataEntry::Picture(picture)),
                Err(err) => warn!("ignoring undecodable FLAC picture: {}", err),
            },
            other => warn!("skipping FLAC metadata block type {}", other),
        }
        Ok(block_header & 0x80 != 0)
    }

    fn read_mapping_header(&mut self, packet: &[u8]) -> MediaParserResult<bool> {
        let mut cursor = ByteCursor::new(packet);
        cursor.skip(MAPPING_MAGIC.len())?;
        let major_version = cursor.read_u8()?;
        let _minor_version = cursor.read_u8()?;
        let _header_packets = cursor.read_u16()?;
        if major_version != 1 {
            return Err(MediaParserError::malformed(format!(
                "unsupported FLAC Ogg mapping version {}",
                major_version
            )));
        }
        if cursor.read_bytes(STREAM_MARKER.len())? != STREAM_MARKER {
            return Err(MediaParserError::malformed("FLAC mapping without fLaC marker"));
        }
        let block_header = cursor.read_u8()?;
        let length = cursor.read_u24()? as usize;
        if block_header & 0x7F != BLOCK_TYPE_STREAM_INFO {
            return Err(MediaParserError::malformed("FLAC mapping without STREAMINFO"));
        }
        self.stream_info = Some(parse_stream_info(cursor.read_bytes(length)?)?);
        self.stream_header = packet[STREAM_MARKER_OFFSET..].to_vec();
        Ok(block_header & 0x80 != 0)
    }

    pub fn sample_rate(&self) -> u32 {
        self.stream_info.as_ref().map_or(0, |info| info.sample_rate)
    }

    pub fn format(&self) -> MediaParserResult<Format> {
        let info = self
            .stream_info
            .as_ref()
            .ok_or_else(|| MediaParserError::malformed("FLAC stream without STREAMINFO"))?;
        let mut format = Format::with_mime_type(AUDIO_FLAC);
        format.channel_count = Some(info.channels);
        format.sample_rate = Some(info.sample_rate);
        if info.max_frame_size > 0 {
            format.max_input_size = Some(info.max_frame_size as usize);
        }
        format.initialization_data = vec![self.stream_header.clone()];
        format.metadata = self.metadata.clone();
        Ok(format)
    }

    /// Samples in an audio packet. Packets that are not frames count as none.
    pub fn packet_samples(&self, packet: &[u8]) -> u64 {
        if packet.first() != Some(&AUDIO_PACKET_TYPE) {
            return 0;
        }
        match frame_block_size(packet) {
            Ok(samples) => samples,
            Err(err) => {
                warn!("unreadable FLAC frame header: {}", err);
                0
            }
        }
    }
}
