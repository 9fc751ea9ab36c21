use super::flac::FlacReader;
use super::opus::{self, OpusReader, OPUS_SAMPLE_RATE};
use super::vorbis::VorbisReader;
use crate::errors::MediaParserResult;
use crate::extractor::format::Format;

const VORBIS_PREFIX: &[u8] = b"\x01vorbis";
const OPUS_PREFIX: &[u8] = b"OpusHead";
const FLAC_PREFIX: &[u8] = b"\x7FFLAC";

/// Longest identification prefix `OggCodec::detect` looks at.
pub const MAX_PREFIX_LENGTH: usize = 8;

/// The codec carried by the logical bitstream, chosen from its first packet.
#[derive(Debug, Clone)]
pub enum OggCodec {
    Vorbis(VorbisReader),
    Opus(OpusReader),
    Flac(FlacReader),
}

impl OggCodec {
    /// Select the codec whose identification header starts `prefix`.
    pub fn detect(prefix: &[u8]) -> Option<Self> {
        if prefix.starts_with(VORBIS_PREFIX) {
            Some(OggCodec::Vorbis(VorbisReader::new()))
        } else if prefix.starts_with(OPUS_PREFIX) {
            Some(OggCodec::Opus(OpusReader::new()))
        } else if prefix.starts_with(FLAC_PREFIX) {
            Some(OggCodec::Flac(FlacReader::new()))
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OggCodec::Vorbis(_) => "vorbis",
            OggCodec::Opus(_) => "opus",
            OggCodec::Flac(_) => "flac",
        }
    }

    /// Consume one header packet. Returns true once the last header has been read.
    pub fn read_header(&mut self, packet: &[u8]) -> MediaParserResult<bool> {
        match self {
            OggCodec::Vorbis(reader) => reader.read_header(packet),
            OggCodec::Opus(reader) => reader.read_header(packet),
            OggCodec::Flac(reader) => reader.read_header(packet),
        }
    }

    pub fn format(&self) -> MediaParserResult<Format> {
        match self {
            OggCodec::Vorbis(reader) => reader.format(),
            OggCodec::Opus(reader) => reader.format(),
            OggCodec::Flac(reader) => reader.format(),
        }
    }

    /// Rate of the granule position clock.
    pub fn granule_rate(&self) -> u32 {
        match self {
            OggCodec::Vorbis(reader) => reader.sample_rate(),
            OggCodec::Opus(_) => OPUS_SAMPLE_RATE,
            OggCodec::Flac(reader) => reader.sample_rate(),
        }
    }

    /// Granules covered by the audio packet.
    pub fn packet_granules(&mut self, packet: &[u8]) -> u64 {
        match self {
            OggCodec::Vorbis(reader) => reader.packet_samples(packet),
            OggCodec::Opus(_) => opus::packet_duration(packet),
            OggCodec::Flac(reader) => reader.packet_samples(packet),
        }
    }

    /// Forget inter-packet state after a seek.
    pub fn reset(&mut self) {
        if let OggCodec::Vorbis(reader) = self {
            reader.reset();
        }
    }
}
