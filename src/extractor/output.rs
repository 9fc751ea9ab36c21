use super::format::{Format, TrackType};
use serde::Serialize;
use std::ops::BitOr;

/// Handle returned by `ExtractorOutput::track`, passed back with every per-track call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TrackOutputHandle(pub usize);

/// Per-sample flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SampleFlags(pub u32);

impl SampleFlags {
    pub const NONE: SampleFlags = SampleFlags(0);
    pub const KEYFRAME: SampleFlags = SampleFlags(1);
    pub const END_OF_STREAM: SampleFlags = SampleFlags(1 << 2);
    pub const HAS_SUPPLEMENTAL_DATA: SampleFlags = SampleFlags(1 << 28);
    pub const LAST_SAMPLE: SampleFlags = SampleFlags(1 << 29);

    pub fn contains(self, other: SampleFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: SampleFlags) {
        self.0 |= other.0;
    }

    pub fn is_keyframe(self) -> bool {
        self.contains(SampleFlags::KEYFRAME)
    }
}

impl BitOr for SampleFlags {
    type Output = SampleFlags;

    fn bitor(self, rhs: SampleFlags) -> SampleFlags {
        SampleFlags(self.0 | rhs.0)
    }
}

/// Metadata committing the most recently written sample bytes as one sample.
///
/// `offset` is the number of bytes passed to `sample_data` after the end of this sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleMetadata {
    pub time_us: i64,
    pub flags: SampleFlags,
    pub size: usize,
    pub offset: usize,
    #[serde(skip_serializing)]
    pub supplemental_data: Option<Vec<u8>>,
}

impl SampleMetadata {
    pub fn new(time_us: i64, flags: SampleFlags, size: usize) -> Self {
        Self {
            time_us,
            flags,
            size,
            offset: 0,
            supplemental_data: None,
        }
    }
}

/// Seekability of the stream, announced once the reader knows it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeekMap {
    pub duration_us: Option<i64>,
    pub seekable: bool,
}

impl SeekMap {
    pub fn unseekable(duration_us: Option<i64>) -> Self {
        Self {
            duration_us,
            seekable: false,
        }
    }
}

/// A byte position the source can be moved to, and the time it corresponds to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeekPoint {
    pub time_us: i64,
    pub position: u64,
}

impl SeekPoint {
    pub const START: SeekPoint = SeekPoint {
        time_us: 0,
        position: 0,
    };
}

/// Seek points bracketing a requested time. `first == second` when the time is hit exactly
/// or no later point exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeekPoints {
    pub first: SeekPoint,
    pub second: SeekPoint,
}

impl SeekPoints {
    pub fn single(point: SeekPoint) -> Self {
        Self {
            first: point,
            second: point,
        }
    }

    pub fn pair(first: SeekPoint, second: SeekPoint) -> Self {
        Self { first, second }
    }
}

/// Track and sample sink the readers emit into.
#[cfg_attr(test, mockall::automock)]
pub trait ExtractorOutput {
    /// Declare (or look up) the track with container id `id`.
    fn track(&mut self, id: u32, track_type: TrackType) -> TrackOutputHandle;

    /// No further tracks will be declared.
    fn end_tracks(&mut self);

    fn seek_map(&mut self, seek_map: SeekMap);

    fn format(&mut self, track: TrackOutputHandle, format: Format);

    fn sample_data(&mut self, track: TrackOutputHandle, data: &[u8]);

    fn sample_metadata(&mut self, track: TrackOutputHandle, metadata: SampleMetadata);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_flags() {
        let mut flags = SampleFlags::KEYFRAME;
        assert!(flags.is_keyframe());
        assert!(!flags.contains(SampleFlags::LAST_SAMPLE));
        flags.insert(SampleFlags::LAST_SAMPLE);
        assert_eq!(flags, SampleFlags::KEYFRAME | SampleFlags::LAST_SAMPLE);
        assert!(SampleFlags::NONE.contains(SampleFlags::NONE));
    }
}
