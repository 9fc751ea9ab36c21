use crate::metadata::MetadataEntry;
use serde::Serialize;

pub const AUDIO_VORBIS: &str = "audio/vorbis";
pub const AUDIO_OPUS: &str = "audio/opus";
pub const AUDIO_FLAC: &str = "audio/flac";
pub const AUDIO_RAW: &str = "audio/raw";
pub const AUDIO_ALAW: &str = "audio/g711-alaw";
pub const AUDIO_MLAW: &str = "audio/g711-mlaw";
pub const AUDIO_AAC: &str = "audio/mp4a-latm";
pub const AUDIO_MPEG: &str = "audio/mpeg";
pub const AUDIO_AC3: &str = "audio/ac3";
pub const AUDIO_E_AC3: &str = "audio/eac3";
pub const VIDEO_H264: &str = "video/avc";
pub const VIDEO_H265: &str = "video/hevc";
pub const VIDEO_AV1: &str = "video/av01";
pub const VIDEO_MP4V: &str = "video/mp4v-es";
pub const TEXT_TX3G: &str = "application/x-quicktime-tx3g";
pub const TEXT_MP4VTT: &str = "application/x-mp4-vtt";
pub const TEXT_TTML: &str = "application/ttml+xml";
pub const APPLICATION_SCTE35: &str = "application/x-scte35";

/// Media type of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackType {
    Audio,
    Video,
    Text,
    Metadata,
    Image,
    Unknown,
}

impl TrackType {
    /// Track type implied by a sample MIME type.
    pub fn from_mime_type(mime_type: &str) -> TrackType {
        match mime_type.split('/').next() {
            Some("audio") => TrackType::Audio,
            Some("video") => TrackType::Video,
            Some("image") => TrackType::Image,
            Some("text") => TrackType::Text,
            _ => match mime_type {
                TEXT_TX3G | TEXT_MP4VTT | TEXT_TTML => TrackType::Text,
                APPLICATION_SCTE35 => TrackType::Metadata,
                _ => TrackType::Unknown,
            },
        }
    }
}

/// Sample layout of `audio/raw` tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PcmEncoding {
    U8,
    S16Le,
    S24Le,
    S32Le,
    F32Le,
    F64Le,
}

impl PcmEncoding {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            PcmEncoding::U8 => 1,
            PcmEncoding::S16Le => 2,
            PcmEncoding::S24Le => 3,
            PcmEncoding::S32Le | PcmEncoding::F32Le => 4,
            PcmEncoding::F64Le => 8,
        }
    }
}

/// Decoder-facing description of a track's samples
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Format {
    pub id: Option<String>,
    pub sample_mime_type: Option<String>,
    pub codecs: Option<String>,
    /// Codec-specific initialization blobs, in codec-defined order.
    #[serde(skip_serializing)]
    pub initialization_data: Vec<Vec<u8>>,
    pub max_input_size: Option<usize>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub channel_count: Option<u32>,
    pub sample_rate: Option<u32>,
    pub pcm_encoding: Option<PcmEncoding>,
    pub bitrate: Option<u32>,
    pub language: Option<String>,
    pub encoder_delay: Option<u32>,
    pub metadata: Vec<MetadataEntry>,
}

impl Format {
    pub fn with_mime_type(mime_type: &str) -> Self {
        Self {
            sample_mime_type: Some(mime_type.to_string()),
            ..Self::default()
        }
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.sample_mime_type.as_deref()
    }
}

/// A logical stream discovered while parsing. Only `duration_us` may change after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub id: u32,
    pub track_type: TrackType,
    pub format: Format,
    pub duration_us: Option<i64>,
}
