use crate::bits::ByteCursor;
use crate::errors::{MediaParserError, MediaParserResult};
use crate::extractor::format::{
    Format, PcmEncoding, AUDIO_ALAW, AUDIO_MLAW, AUDIO_RAW,
};
use crate::metadata::MetadataEntry;
use crate::streams::ExtractorInput;

pub type ChunkId = [u8; 4];

pub const RIFF: ChunkId = *b"RIFF";
pub const RF64: ChunkId = *b"RF64";
pub const WAVE: ChunkId = *b"WAVE";
pub const FMT: ChunkId = *b"fmt ";
pub const DATA: ChunkId = *b"data";
pub const DS64: ChunkId = *b"ds64";
pub const LIST: ChunkId = *b"LIST";
pub const INFO: ChunkId = *b"INFO";
pub const ID3_LOWER: ChunkId = *b"id3 ";
pub const ID3_UPPER: ChunkId = *b"ID3 ";

pub const CHUNK_HEADER_SIZE: usize = 8;
/// `RIFF`, size, `WAVE`.
pub const FILE_HEADER_SIZE: usize = 12;

pub const WAVE_FORMAT_PCM: u16 = 0x0001;
pub const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
pub const WAVE_FORMAT_ALAW: u16 = 0x0006;
pub const WAVE_FORMAT_MULAW: u16 = 0x0007;
pub const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Chunk id and declared payload size, excluding the pad byte of odd sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: ChunkId,
    pub size: u64,
}

impl ChunkHeader {
    pub fn parse(data: &[u8]) -> MediaParserResult<Self> {
        let mut cursor = ByteCursor::new(data);
        Ok(Self {
            id: cursor.read_fourcc()?,
            size: u64::from(cursor.read_u32_le()?),
        })
    }

    /// Odd-sized chunks are followed by one pad byte.
    pub fn pad_size(&self) -> u64 {
        self.size & 1
    }
}

pub fn chunk_name(id: &ChunkId) -> String {
    String::from_utf8_lossy(id).into_owned()
}

/// Peek the RIFF/RF64 file header and report whether it announces a WAVE file.
pub fn sniff_wav(input: &mut dyn ExtractorInput) -> MediaParserResult<bool> {
    let mut header = [0u8; FILE_HEADER_SIZE];
    if !input.peek_fully(&mut header, true)? {
        return Ok(false);
    }
    let riff: ChunkId = [header[0], header[1], header[2], header[3]];
    Ok((riff == RIFF || riff == RF64) && header[8..12] == WAVE)
}

/// Contents of the `fmt ` chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavFormat {
    /// Format tag, resolved through the sub-format GUID for WAVE_FORMAT_EXTENSIBLE.
    pub format_type: u16,
    pub channel_count: u16,
    pub sample_rate: u32,
    pub average_bytes_per_second: u32,
    pub block_size: u16,
    pub bits_per_sample: u16,
    pub extra_data: Vec<u8>,
}

impl WavFormat {
    pub fn parse(payload: &[u8]) -> MediaParserResult<Self> {
        if payload.len() < 16 {
            return Err(MediaParserError::malformed(format!(
                "fmt chunk of {} bytes is too short",
                payload.len()
            )));
        }
        let mut cursor = ByteCursor::new(payload);
        let mut format_type = cursor.read_u16_le()?;
        let channel_count = cursor.read_u16_le()?;
        let sample_rate = cursor.read_u32_le()?;
        let average_bytes_per_second = cursor.read_u32_le()?;
        let block_size = cursor.read_u16_le()?;
        let bits_per_sample = cursor.read_u16_le()?;

        let mut extra_data = Vec::new();
        if cursor.bytes_left() >= 2 {
            let extra_size = (cursor.read_u16_le()? as usize).min(cursor.bytes_left());
            extra_data = cursor.read_bytes(extra_size)?.to_vec();
        }
        if format_type == WAVE_FORMAT_EXTENSIBLE {
            // valid bits (2), channel mask (4), then the sub-format GUID
            if extra_data.len() < 8 {
                return Err(MediaParserError::malformed(
                    "WAVE_FORMAT_EXTENSIBLE fmt chunk without a sub-format",
                ));
            }
            format_type = u16::from_le_bytes([extra_data[6], extra_data[7]]);
        }
        if channel_count == 0 || sample_rate == 0 {
            return Err(MediaParserError::malformed(format!(
                "invalid fmt chunk: {} channels at {} Hz",
                channel_count, sample_rate
            )));
        }
        Ok(Self {
            format_type,
            channel_count,
            sample_rate,
            average_bytes_per_second,
            block_size,
            bits_per_sample,
            extra_data,
        })
    }

    /// PCM layout of raw formats, `None` for companded ones.
    pub fn pcm_encoding(&self) -> MediaParserResult<Option<PcmEncoding>> {
        let encoding = match (self.format_type, self.bits_per_sample) {
            (WAVE_FORMAT_PCM, 8) => Some(PcmEncoding::U8),
            (WAVE_FORMAT_PCM, 16) => Some(PcmEncoding::S16Le),
            (WAVE_FORMAT_PCM, 24) => Some(PcmEncoding::S24Le),
            (WAVE_FORMAT_PCM, 32) => Some(PcmEncoding::S32Le),
            (WAVE_FORMAT_IEEE_FLOAT, 32) => Some(PcmEncoding::F32Le),
            (WAVE_FORMAT_IEEE_FLOAT, 64) => Some(PcmEncoding::F64Le),
            (WAVE_FORMAT_ALAW, 8) | (WAVE_FORMAT_MULAW, 8) => None,
            (format_type, bits) => {
                return Err(MediaParserError::malformed(format!(
                    "unsupported WAV format type {:#06x} with {} bits per sample",
                    format_type, bits
                )))
            }
        };
        Ok(encoding)
    }

    /// Bytes of one frame (one sample per channel).
    pub fn bytes_per_frame(&self) -> usize {
        usize::from(self.channel_count) * usize::from(self.bits_per_sample) / 8
    }

    /// Decoder format for the passthrough track. Fails for unsupported encodings and for
    /// block sizes that do not hold exactly one frame.
    pub fn output_format(
        &self,
        max_input_size: usize,
        metadata: Vec<MetadataEntry>,
    ) -> MediaParserResult<Format> {
        let pcm_encoding = self.pcm_encoding()?;
        let expected_block_size = self.bytes_per_frame();
        if usize::from(self.block_size) != expected_block_size {
            return Err(MediaParserError::malformed(format!(
                "expected block size {}, got {}",
                expected_block_size, self.block_size
            )));
        }
        let mime_type = match self.format_type {
            WAVE_FORMAT_ALAW => AUDIO_ALAW,
            WAVE_FORMAT_MULAW => AUDIO_MLAW,
            _ => AUDIO_RAW,
        };
        let mut format = Format::with_mime_type(mime_type);
        format.channel_count = Some(u32::from(self.channel_count));
        format.sample_rate = Some(self.sample_rate);
        format.pcm_encoding = pcm_encoding;
        format.bitrate = Some(self.sample_rate * expected_block_size as u32 * 8);
        format.max_input_size = Some(max_input_size);
        format.metadata = metadata;
        Ok(format)
    }
}

/// Sizes from an RF64 `ds64` chunk. The sizes in `RIFF` and `data` headers are then `0xFFFFFFFF`.
pub fn parse_ds64(payload: &[u8]) -> MediaParserResult<u64> {
    let mut cursor = ByteCursor::new(payload);
    let _riff_size = cursor.read_u64_le()?;
    Ok(cursor.read_u64_le()?)
}

/// Text entries of a `LIST` chunk of type `INFO`. Other list types yield nothing.
pub fn parse_info_list(payload: &[u8]) -> MediaParserResult<Vec<MetadataEntry>> {
    let mut cursor = ByteCursor::new(payload);
    if cursor.read_fourcc()? != INFO {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    while cursor.bytes_left() >= CHUNK_HEADER_SIZE {
        let header = ChunkHeader::parse(cursor.read_bytes(CHUNK_HEADER_SIZE)?)?;
        let size = (header.size as usize).min(cursor.bytes_left());
        let raw = cursor.read_bytes(size)?;
        if header.pad_size() == 1 && cursor.bytes_left() > 0 {
            cursor.skip(1)?;
        }
        let text = String::from_utf8_lossy(raw)
            .trim_end_matches('\0')
            .to_string();
        if text.is_empty() {
            continue;
        }
        entries.push(MetadataEntry::Text {
            key: info_key(&header.id),
            value: text,
        });
    }
    Ok(entries)
}

fn info_key(id: &ChunkId) -> String {
    match id {
        b"INAM" => "title".to_string(),
        b"IART" => "artist".to_string(),
        b"IPRD" => "album".to_string(),
        b"ICRD" => "date".to_string(),
        b"IGNR" => "genre".to_string(),
        b"ICMT" => "comment".to_string(),
        b"ICOP" => "copyright".to_string(),
        b"ISFT" => "encoder".to_string(),
        b"ITRK" | b"IPRT" => "track".to_string(),
        other => chunk_name(other),
    }
}
