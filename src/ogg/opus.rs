use crate::bits::ByteCursor;
use crate::errors::{MediaParserError, MediaParserResult};
use crate::extractor::format::{Format, AUDIO_OPUS};
use crate::metadata::{parse_vorbis_comments, MetadataEntry};

const OPUS_HEAD: &[u8; 8] = b"OpusHead";
const OPUS_TAGS: &[u8; 8] = b"OpusTags";

/// Opus always decodes at 48 kHz and its granule positions count 48 kHz samples.
pub const OPUS_SAMPLE_RATE: u32 = 48_000;
const SEEK_PREROLL_NS: u64 = 80_000_000;
const MAX_INPUT_SIZE: usize = 5760 * 2 * 2;

pub fn is_opus_head(packet: &[u8]) -> bool {
    packet.starts_with(OPUS_HEAD)
}

/// Fields of the `OpusHead` identification header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpusHead {
    pub version: u8,
    pub channels: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
    pub output_gain: i16,
    pub channel_mapping_family: u8,
    pub data: Vec<u8>,
}

pub fn parse_opus_head(packet: &[u8]) -> MediaParserResult<OpusHead> {
    let mut cursor = ByteCursor::new(packet);
    if cursor.read_bytes(OPUS_HEAD.len())? != OPUS_HEAD {
        return Err(MediaParserError::malformed("expected OpusHead"));
    }
    let version = cursor.read_u8()?;
    let channels = cursor.read_u8()?;
    let pre_skip = cursor.read_u16_le()?;
    let input_sample_rate = cursor.read_u32_le()?;
    let output_gain = cursor.read_u16_le()? as i16;
    let channel_mapping_family = cursor.read_u8()?;
    if channels == 0 {
        return Err(MediaParserError::malformed("OpusHead without channels"));
    }
    Ok(OpusHead {
        version,
        channels,
        pre_skip,
        input_sample_rate,
        output_gain,
        channel_mapping_family,
        data: packet.to_vec(),
    })
}

/// Duration of an Opus packet in 48 kHz samples, from its TOC byte and frame count.
pub fn packet_duration(packet: &[u8]) -> u64 {
    let Some(&toc) = packet.first() else {
        return 0;
    };
    let frames = match toc & 0x03 {
        0 => 1,
        1 | 2 => 2,
        _ => match packet.get(1) {
            Some(&count) => u64::from(count & 0x3F),
            None => return 0,
        },
    };
    let config = toc >> 3;
    let length = config & 0x03;
    // frame length in units of 2.5 ms, 120 samples at 48 kHz
    let frame_units: u64 = if config >= 16 {
        1 << length
    } else if config >= 12 {
        if length & 1 == 0 {
            4
        } else {
            8
        }
    } else if length == 3 {
        24
    } else {
        4 << length
    };
    frames * frame_units * 120
}

fn nanoseconds_le(samples: u64) -> Vec<u8> {
    (samples * 1_000_000_000 / u64::from(OPUS_SAMPLE_RATE))
        .to_le_bytes()
        .to_vec()
}

/// Opus stream state: `OpusHead` then `OpusTags`.
#[derive(Debug, Clone, Default)]
pub struct OpusReader {
    head: Option<OpusHead>,
    comments: Vec<MetadataEntry>,
}

impl OpusReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one header packet. Returns true once `OpusTags` has been read.
    pub fn read_header(&mut self, packet: &[u8]) -> MediaParserResult<bool> {
        if is_opus_head(packet) {
            self.head = Some(parse_opus_head(packet)?);
            return Ok(false);
        }
        if packet.starts_with(OPUS_TAGS) {
            if self.head.is_none() {
                return Err(MediaParserError::malformed("OpusTags before OpusHead"));
            }
            self.comments = parse_vorbis_comments(&packet[OPUS_TAGS.len()..])?.entries;
            return Ok(true);
        }
        Err(MediaParserError::malformed("expected OpusHead or OpusTags header packet"))
    }

    pub fn format(&self) -> MediaParserResult<Format> {
        let head = self
            .head
            .as_ref()
            .ok_or_else(|| MediaParserError::malformed("opus stream without OpusHead"))?;
        let mut format = Format::with_mime_type(AUDIO_OPUS);
        format.channel_count = Some(u32::from(head.channels));
        format.sample_rate = Some(OPUS_SAMPLE_RATE);
        format.encoder_delay = Some(u32::from(head.pre_skip));
        format.max_input_size = Some(MAX_INPUT_SIZE);
        format.initialization_data = vec![
            head.data.clone(),
            nanoseconds_le(u64::from(head.pre_skip)),
            SEEK_PREROLL_NS.to_le_bytes().to_vec(),
        ];
        format.metadata = self.comments.clone();
        Ok(format)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::metadata::vorbis_comment::tests::comment_block;

    pub(crate) fn opus_head(channels: u8, pre_skip: u16) -> Vec<u8> {
        let mut packet = OPUS_HEAD.to_vec();
        packet.push(1);
        packet.push(channels);
        packet.extend_from_slice(&pre_skip.to_le_bytes());
        packet.extend_from_slice(&44_100u32.to_le_bytes());
        packet.extend_from_slice(&0u16.to_le_bytes());
        packet.push(0);
        packet
    }

    pub(crate) fn opus_tags(comments: &[&str]) -> Vec<u8> {
        let mut packet = OPUS_TAGS.to_vec();
        packet.extend_from_slice(&comment_block("libopus", comments));
        packet
    }

    #[test]
    fn test_packet_duration_from_toc() {
        // CELT 20 ms, one frame
        assert_eq!(packet_duration(&[31 << 3]), 960);
        // CELT 2.5 ms, two frames
        assert_eq!(packet_duration(&[(16 << 3) | 1]), 240);
        // SILK 60 ms, one frame
        assert_eq!(packet_duration(&[3 << 3]), 2880);
        // SILK 10 ms, three frames signalled in the second byte
        assert_eq!(packet_duration(&[3, 0x83]), 1440);
        // hybrid 20 ms, two frames
        assert_eq!(packet_duration(&[(13 << 3) | 2]), 1920);
        assert_eq!(packet_duration(&[]), 0);
        assert_eq!(packet_duration(&[3]), 0);
    }

    #[test]
    fn test_headers_and_format() {
        let mut reader = OpusReader::new();
        assert!(!reader.read_header(&opus_head(2, 312)).unwrap());
        assert!(reader.read_header(&opus_tags(&["ARTIST=Someone"])).unwrap());
        let format = reader.format().unwrap();
        assert_eq!(format.mime_type(), Some(AUDIO_OPUS));
        assert_eq!(format.sample_rate, Some(48_000));
        assert_eq!(format.channel_count, Some(2));
        assert_eq!(format.encoder_delay, Some(312));
        assert_eq!(format.initialization_data[1], 6_500_000u64.to_le_bytes().to_vec());
        assert_eq!(format.initialization_data[2], 80_000_000u64.to_le_bytes().to_vec());
        assert_eq!(format.metadata.len(), 1);
    }

    #[test]
    fn test_tags_before_head_is_malformed() {
        let mut reader = OpusReader::new();
        assert!(reader.read_header(&opus_tags(&[])).is_err());
        assert!(reader.read_header(b"not a header").is_err());
    }
}
