use super::format::{Format, TrackType};
use super::output::{ExtractorOutput, SampleMetadata, SeekMap, TrackOutputHandle};
use log::warn;
use serde::Serialize;

/// One committed sample with the bytes it covered
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedSample {
    pub metadata: SampleMetadata,
    #[serde(skip_serializing)]
    pub data: Vec<u8>,
}

/// Everything emitted for one track
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedTrack {
    pub id: u32,
    pub track_type: TrackType,
    pub formats: Vec<Format>,
    #[serde(skip_serializing)]
    pub data: Vec<u8>,
    pub samples: Vec<CollectedSample>,
}

impl CollectedTrack {
    /// Latest format announced for the track.
    pub fn format(&self) -> Option<&Format> {
        self.formats.last()
    }

    pub fn sample_times_us(&self) -> Vec<i64> {
        self.samples.iter().map(|s| s.metadata.time_us).collect()
    }
}

/// In-memory sink recording every call
#[derive(Debug, Default, Serialize)]
pub struct CollectingOutput {
    pub tracks: Vec<CollectedTrack>,
    pub end_tracks_calls: usize,
    pub seek_maps: Vec<SeekMap>,
}

impl CollectingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_by_id(&self, id: u32) -> Option<&CollectedTrack> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn seek_map(&self) -> Option<&SeekMap> {
        self.seek_maps.last()
    }

    /// Forget recorded samples and pending bytes after a seek, keeping tracks and formats.
    pub fn clear_samples(&mut self) {
        for track in &mut self.tracks {
            track.samples.clear();
            track.data.clear();
        }
    }
}

impl ExtractorOutput for CollectingOutput {
    fn track(&mut self, id: u32, track_type: TrackType) -> TrackOutputHandle {
        if let Some(index) = self.tracks.iter().position(|t| t.id == id) {
            return TrackOutputHandle(index);
        }
        self.tracks.push(CollectedTrack {
            id,
            track_type,
            formats: Vec::new(),
            data: Vec::new(),
            samples: Vec::new(),
        });
        TrackOutputHandle(self.tracks.len() - 1)
    }

    fn end_tracks(&mut self) {
        self.end_tracks_calls += 1;
    }

    fn seek_map(&mut self, seek_map: SeekMap) {
        self.seek_maps.push(seek_map);
    }

    fn format(&mut self, track: TrackOutputHandle, format: Format) {
        if let Some(t) = self.tracks.get_mut(track.0) {
            t.formats.push(format);
        }
    }

    fn sample_data(&mut self, track: TrackOutputHandle, data: &[u8]) {
        if let Some(t) = self.tracks.get_mut(track.0) {
            t.data.extend_from_slice(data);
        }
    }

    fn sample_metadata(&mut self, track: TrackOutputHandle, metadata: SampleMetadata) {
        let Some(t) = self.tracks.get_mut(track.0) else {
            return;
        };
        let end = t.data.len().saturating_sub(metadata.offset);
        if metadata.size > end {
            warn!(
                "track {}: sample of {} bytes committed with only {} bytes written",
                t.id, metadata.size, end
            );
        }
        let start = end.saturating_sub(metadata.size);
        let data = t.data[start..end].to_vec();
        t.samples.push(CollectedSample { metadata, data });
    }
}
