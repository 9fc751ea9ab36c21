use crate::bits::{mask, BitReader, ByteCursor};
use crate::errors::{MediaParserError, MediaParserResult};
use crate::extractor::format::{Format, AUDIO_VORBIS};
use crate::metadata::{parse_vorbis_comments, MetadataEntry};
use log::debug;

const HEADER_MAGIC: &[u8; 6] = b"vorbis";
pub const PACKET_TYPE_IDENTIFICATION: u8 = 1;
pub const PACKET_TYPE_COMMENT: u8 = 3;
pub const PACKET_TYPE_SETUP: u8 = 5;

/// Mode fields of the setup header: blockflag (1), windowtype (16), transformtype (16),
/// mapping (8).
const MODE_BITS: u64 = 1 + 16 + 16 + 8;

/// Whether `packet` starts a Vorbis identification header.
pub fn is_identification_header(packet: &[u8]) -> bool {
    packet.len() > 7 && packet[0] == PACKET_TYPE_IDENTIFICATION && &packet[1..7] == HEADER_MAGIC
}

/// Fields of the identification header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VorbisIdHeader {
    pub version: u32,
    pub channels: u8,
    pub sample_rate: u32,
    pub bitrate_maximum: i32,
    pub bitrate_nominal: i32,
    pub bitrate_minimum: i32,
    pub block_size_0: u32,
    pub block_size_1: u32,
    pub framing_flag: bool,
    pub data: Vec<u8>,
}

fn check_header(cursor: &mut ByteCursor, packet_type: u8) -> MediaParserResult<()> {
    let found = cursor.read_u8()?;
    if found != packet_type {
        return Err(MediaParserError::malformed(format!(
            "expected vorbis header type {}, found {}",
            packet_type, found
        )));
    }
    if cursor.read_bytes(HEADER_MAGIC.len())? != HEADER_MAGIC {
        return Err(MediaParserError::malformed("expected vorbis header magic"));
    }
    Ok(())
}

pub fn parse_identification_header(packet: &[u8]) -> MediaParserResult<VorbisIdHeader> {
    let mut cursor = ByteCursor::new(packet);
    check_header(&mut cursor, PACKET_TYPE_IDENTIFICATION)?;
    let version = cursor.read_u32_le()?;
    let channels = cursor.read_u8()?;
    let sample_rate = cursor.read_u32_le()?;
    let bitrate_maximum = cursor.read_u32_le()? as i32;
    let bitrate_nominal = cursor.read_u32_le()? as i32;
    let bitrate_minimum = cursor.read_u32_le()? as i32;
    let block_sizes = cursor.read_u8()?;
    let framing_flag = cursor.read_u8()? & 0x01 != 0;
    if channels == 0 || sample_rate == 0 {
        return Err(MediaParserError::malformed(
            "vorbis identification header without channels or sample rate",
        ));
    }
    Ok(VorbisIdHeader {
        version,
        channels,
        sample_rate,
        bitrate_maximum,
        bitrate_nominal,
        bitrate_minimum,
        block_size_0: 1 << (block_sizes & 0x0F),
        block_size_1: 1 << (block_sizes >> 4),
        framing_flag,
        data: packet.to_vec(),
    })
}

/// Comments of the type-3 header, after the packet type and magic.
pub fn parse_comment_header(packet: &[u8]) -> MediaParserResult<Vec<MetadataEntry>> {
    let mut cursor = ByteCursor::new(packet);
    check_header(&mut cursor, PACKET_TYPE_COMMENT)?;
    Ok(parse_vorbis_comments(cursor.remaining())?.entries)
}

/// Block flag of every mode of the setup header, indexed by mode number.
///
/// The modes are the last structure of the header, so they are found by scanning backwards
/// from the framing bit instead of decoding the codebooks, floors, residues and mappings ahead
/// of them. Reading the byte-reversed packet MSB first walks the LSB-first stream backwards
/// while keeping each field's value intact.
pub fn parse_setup_modes(packet: &[u8]) -> MediaParserResult<Vec<bool>> {
    let mut cursor = ByteCursor::new(packet);
    check_header(&mut cursor, PACKET_TYPE_SETUP)?;
    let reversed: Vec<u8> = packet.iter().rev().copied().collect();
    let total_bits = reversed.len() as i64 * 8;

    let mut reader = BitReader::new(reversed.as_slice());
    let mut framing_bit = None;
    while total_bits - reader.nr_bits_read() > 97 {
        if reader.read_flag() {
            framing_bit = Some(reader.nr_bits_read());
            break;
        }
    }
    let framing_bit = framing_bit
        .ok_or_else(|| MediaParserError::malformed("vorbis setup header without framing bit"))?;

    let mut mode_count = 0u32;
    let mut header_mode_count = None;
    while total_bits - reader.nr_bits_read() >= 97 {
        let mapping = reader.read(8);
        let transform_type = reader.read(16);
        let window_type = reader.read(16);
        if mapping > 63 || transform_type != 0 || window_type != 0 {
            break;
        }
        reader.skip(1);
        mode_count += 1;
        if mode_count > 64 {
            break;
        }
        let mut count_reader = BitReader::new(reversed.as_slice());
        count_reader.skip(reader.nr_bits_read() as u64);
        if count_reader.read(6) + 1 == mode_count {
            header_mode_count = Some(mode_count);
        }
    }
    let mode_count = header_mode_count
        .ok_or_else(|| MediaParserError::malformed("no vorbis mode count found in setup header"))?;
    debug!("vorbis setup header has {} modes", mode_count);

    let mut reader = BitReader::new(reversed.as_slice());
    reader.skip(framing_bit as u64);
    let mut block_flags = vec![false; mode_count as usize];
    for flag in block_flags.iter_mut().rev() {
        reader.skip(MODE_BITS - 1);
        *flag = reader.read_flag();
    }
    reader.finish("vorbis setup header")?;
    Ok(block_flags)
}

/// Number of bits needed to store `value`.
pub fn ilog(value: u32) -> u32 {
    32 - value.leading_zeros()
}

/// Vorbis stream state: headers and the block size of the previous audio packet.
#[derive(Debug, Clone, Default)]
pub struct VorbisReader {
    id_header: Option<VorbisIdHeader>,
    comments: Vec<MetadataEntry>,
    setup_packet: Vec<u8>,
    mode_block_flags: Vec<bool>,
    previous_block_size: Option<u32>,
}

impl VorbisReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one header packet. Returns true once the setup header has been read.
    pub fn read_header(&mut self, packet: &[u8]) -> MediaParserResult<bool> {
        match packet.first().copied() {
            Some(PACKET_TYPE_IDENTIFICATION) => {
                self.id_header = Some(parse_identification_header(packet)?);
                Ok(false)
            }
            Some(PACKET_TYPE_COMMENT) => {
                self.comments = parse_comment_header(packet)?;
                Ok(false)
            }
            Some(PACKET_TYPE_SETUP) => {
                if self.id_header.is_none() {
                    return Err(MediaParserError::malformed(
                        "vorbis setup header before identification header",
                    ));
                }
                self.mode_block_flags = parse_setup_modes(packet)?;
                self.setup_packet = packet.to_vec();
                Ok(true)
            }
            other => Err(MediaParserError::malformed(format!(
                "unexpected vorbis header packet type {:?}",
                other
            ))),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.id_header.as_ref().map_or(0, |h| h.sample_rate)
    }

    pub fn format(&self) -> MediaParserResult<Format> {
        let header = self
            .id_header
            .as_ref()
            .ok_or_else(|| MediaParserError::malformed("vorbis stream without headers"))?;
        let mut format = Format::with_mime_type(AUDIO_VORBIS);
        format.channel_count = Some(u32::from(header.channels));
        format.sample_rate = Some(header.sample_rate);
        if header.bitrate_nominal > 0 {
            format.bitrate = Some(header.bitrate_nominal as u32);
        }
        format.max_input_size = Some(header.block_size_1 as usize * 2);
        format.initialization_data = vec![header.data.clone(), self.setup_packet.clone()];
        format.metadata = self.comments.clone();
        Ok(format)
    }

    /// Samples decoded from `packet`. The first packet after a reset overlaps nothing and
    /// yields none.
    pub fn packet_samples(&mut self, packet: &[u8]) -> u64 {
        let (Some(header), Some(&first)) = (self.id_header.as_ref(), packet.first()) else {
            return 0;
        };
        if first & 0x01 != 0 || self.mode_block_flags.is_empty() {
            return 0;
        }
        let mode_bits = ilog(self.mode_block_flags.len() as u32 - 1);
        let mode = ((first >> 1) as u32 & mask(mode_bits)) as usize;
        let block_size = match self.mode_block_flags.get(mode) {
            Some(true) => header.block_size_1,
            _ => header.block_size_0,
        };
        let samples = match self.previous_block_size {
            Some(previous) => u64::from(previous + block_size) / 4,
            None => 0,
        };
        self.previous_block_size = Some(block_size);
        samples
    }

    pub fn reset(&mut self) {
        self.previous_block_size = None;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::metadata::vorbis_comment::tests::comment_block;

    /// LSB-first bit packer, the order Vorbis headers are written in.
    struct BitPacker {
        bytes: Vec<u8>,
        bit: usize,
    }

    impl BitPacker {
        fn new() -> Self {
            Self { bytes: Vec::new(), bit: 0 }
        }

        fn put(&mut self, value: u32, n: usize) {
            for i in 0..n {
                if self.bit % 8 == 0 {
                    self.bytes.push(0);
                }
                if value >> i & 1 == 1 {
                    let last = self.bytes.len() - 1;
                    self.bytes[last] |= 1 << (self.bit % 8);
                }
                self.bit += 1;
            }
        }
    }

    pub(crate) fn id_header(channels: u8, rate: u32) -> Vec<u8> {
        let mut packet = vec![PACKET_TYPE_IDENTIFICATION];
        packet.extend_from_slice(HEADER_MAGIC);
        packet.extend_from_slice(&0u32.to_le_bytes());
        packet.push(channels);
        packet.extend_from_slice(&rate.to_le_bytes());
        packet.extend_from_slice(&0i32.to_le_bytes());
        packet.extend_from_slice(&128_000i32.to_le_bytes());
        packet.extend_from_slice(&0i32.to_le_bytes());
        // 256 and 2048 sample blocks
        packet.push(0xB8);
        packet.push(0x01);
        packet
    }

    pub(crate) fn comment_header(comments: &[&str]) -> Vec<u8> {
        let mut packet = vec![PACKET_TYPE_COMMENT];
        packet.extend_from_slice(HEADER_MAGIC);
        packet.extend_from_slice(&comment_block("test vendor", comments));
        packet.push(0x01);
        packet
    }

    /// A setup header whose tail holds `block_flags.len()` modes. The codebook section ahead
    /// of the modes is stood in for by filler bits.
    pub(crate) fn setup_header(block_flags: &[bool]) -> Vec<u8> {
        let mut bits = BitPacker::new();
        for _ in 0..16 {
            bits.put(0xA5, 8);
        }
        bits.put(block_flags.len() as u32 - 1, 6);
        for (i, &flag) in block_flags.iter().enumerate() {
            bits.put(u32::from(flag), 1);
            bits.put(0, 16);
            bits.put(0, 16);
            bits.put(i as u32 % 2, 8);
        }
        bits.put(1, 1);
        let mut packet = vec![PACKET_TYPE_SETUP];
        packet.extend_from_slice(HEADER_MAGIC);
        packet.extend_from_slice(&bits.bytes);
        packet
    }

    #[test]
    fn test_parse_identification_header() {
        let header = parse_identification_header(&id_header(2, 44100)).unwrap();
        assert_eq!(header.channels, 2);
        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.bitrate_nominal, 128_000);
        assert_eq!(header.block_size_0, 256);
        assert_eq!(header.block_size_1, 2048);
        assert!(header.framing_flag);
    }

    #[test]
    fn test_setup_modes_found_from_the_end() {
        let modes = parse_setup_modes(&setup_header(&[false, true])).unwrap();
        assert_eq!(modes, vec![false, true]);
        let modes = parse_setup_modes(&setup_header(&[true, false, false, true])).unwrap();
        assert_eq!(modes, vec![true, false, false, true]);
    }

    #[test]
    fn test_setup_without_framing_bit_is_malformed() {
        let mut packet = vec![PACKET_TYPE_SETUP];
        packet.extend_from_slice(HEADER_MAGIC);
        packet.extend_from_slice(&[0; 20]);
        assert!(parse_setup_modes(&packet).is_err());
    }

    #[test]
    fn test_packet_samples_overlap_blocks() {
        let mut reader = VorbisReader::new();
        assert!(!reader.read_header(&id_header(1, 48000)).unwrap());
        assert!(!reader.read_header(&comment_header(&["TITLE=Song"])).unwrap());
        assert!(reader.read_header(&setup_header(&[false, true])).unwrap());

        // mode 0 is short, mode 1 long; one mode bit after the packet type bit
        assert_eq!(reader.packet_samples(&[0x00]), 0);
        assert_eq!(reader.packet_samples(&[0x02]), (256 + 2048) / 4);
        assert_eq!(reader.packet_samples(&[0x02]), 2048 / 2);
        assert_eq!(reader.packet_samples(&[0x00]), (2048 + 256) / 4);
        reader.reset();
        assert_eq!(reader.packet_samples(&[0x02]), 0);

        let format = reader.format().unwrap();
        assert_eq!(format.sample_rate, Some(48000));
        assert_eq!(format.bitrate, Some(128_000));
        assert_eq!(format.initialization_data.len(), 2);
        assert_eq!(
            format.metadata,
            vec![MetadataEntry::VorbisComment {
                key: "TITLE".to_string(),
                value: "Song".to_string()
            }]
        );
    }

    #[test]
    fn test_ilog() {
        assert_eq!(ilog(0), 0);
        assert_eq!(ilog(1), 1);
        assert_eq!(ilog(3), 2);
        assert_eq!(ilog(4), 3);
    }
}
