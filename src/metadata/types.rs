use crate::scte35::SpliceCommand;
use serde::Serialize;

/// A picture attached to a stream, from an ID3 `APIC` frame or a FLAC/Vorbis picture block
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PictureFrame {
    pub picture_type: u32,
    pub mime_type: String,
    pub description: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub colors: u32,
    #[serde(skip_serializing)]
    pub data: Vec<u8>,
}

/// Decoded ID3v2 frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum Id3Frame {
    TextInformation {
        id: String,
        description: Option<String>,
        values: Vec<String>,
    },
    Url {
        id: String,
        description: Option<String>,
        url: String,
    },
    Comment {
        language: String,
        description: String,
        text: String,
    },
    Private {
        owner: String,
        #[serde(skip_serializing)]
        data: Vec<u8>,
    },
    Apic(PictureFrame),
    /// MP4 `----` atom: reverse-DNS domain, name and value.
    Internal {
        domain: String,
        description: String,
        text: String,
    },
    Binary {
        id: String,
        #[serde(skip_serializing)]
        data: Vec<u8>,
    },
}

impl Id3Frame {
    /// Four character frame id, `----` for internal frames.
    pub fn id(&self) -> &str {
        match self {
            Id3Frame::TextInformation { id, .. } => id,
            Id3Frame::Url { id, .. } => id,
            Id3Frame::Comment { .. } => "COMM",
            Id3Frame::Private { .. } => "PRIV",
            Id3Frame::Apic(_) => "APIC",
            Id3Frame::Internal { .. } => "----",
            Id3Frame::Binary { id, .. } => id,
        }
    }
}

/// One side-channel metadata value. Entries are immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum MetadataEntry {
    Id3(Id3Frame),
    VorbisComment { key: String, value: String },
    Picture(PictureFrame),
    Splice(SpliceCommand),
    /// Free-form text tag (MP4 `ilst`, WAV `LIST/INFO`).
    Text { key: String, value: String },
    /// Presentation time of a still image representing the stream.
    ThumbnailMarker { presentation_time_us: i64 },
    /// Font file attached to the stream for text rendering.
    FontAttachment {
        file_name: String,
        mime_type: String,
        #[serde(skip_serializing)]
        data: Vec<u8>,
    },
}

/// Ordered list of metadata entries attached to a format or decoded from a buffer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    pub entries: Vec<MetadataEntry>,
}

impl Metadata {
    pub fn new(entries: Vec<MetadataEntry>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: usize) -> Option<&MetadataEntry> {
        self.entries.get(index)
    }

    /// Entries of `self` followed by those of `other`.
    pub fn merge(mut self, other: Metadata) -> Metadata {
        self.entries.extend(other.entries);
        self
    }

    /// Value of the first Vorbis comment or text entry with key `key` (case-insensitive).
    pub fn text_value(&self, key: &str) -> Option<&str> {
        self.entries.iter().find_map(|entry| match entry {
            MetadataEntry::VorbisComment { key: k, value } | MetadataEntry::Text { key: k, value }
                if k.eq_ignore_ascii_case(key) =>
            {
                Some(value.as_str())
            }
            _ => None,
        })
    }
}
