use super::atom_reader::{read_atom_header, skip_to, AtomHeaderInfo, ContainerStack};
use super::ftyp::sniff_mp4;
use super::mvhd::parse_mvhd;
use super::r#box::*;
use super::trak::{parse_trak, Mp4Track};
use super::udta::parse_udta;
use super::{is_container_atom, is_parsed_leaf_atom, MAX_LEAF_ATOM_SIZE};
use crate::errors::{MediaParserError, MediaParserResult};
use crate::extractor::format::TrackType;
use crate::extractor::output::{
    ExtractorOutput, SampleMetadata, SeekMap, SeekPoint, SeekPoints, TrackOutputHandle,
};
use crate::extractor::{Extractor, ReadResult};
use crate::metadata::MetadataEntry;
use crate::sample_table::SampleTable;
use crate::streams::ExtractorInput;
use log::{debug, warn};

/// Largest slice of a sample copied to the sink in one call.
const SAMPLE_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadingAtomHeader,
    ReadingAtomPayload,
    ReadingSample,
}

#[derive(Debug)]
struct TrackState {
    mp4_track: Mp4Track,
    output: TrackOutputHandle,
    /// Next sample to output.
    sample_index: usize,
}

impl TrackState {
    fn table(&self) -> &SampleTable {
        &self.mp4_track.sample_table
    }

    fn next_sample_offset(&self) -> Option<u64> {
        self.table().offsets().get(self.sample_index).copied()
    }
}

/// A sample being copied to the sink
#[derive(Debug, Clone, Copy)]
struct PendingSample {
    track_index: usize,
    size: usize,
    bytes_written: usize,
}

/// Reader for progressive MP4 files: a `moov` index and sample data in `mdat`.
///
/// The `moov` atom may come before or after `mdat`. Samples are read in file order, choosing
/// across tracks the next sample with the lowest offset.
#[derive(Debug)]
pub struct Mp4Extractor {
    state: State,
    containers: ContainerStack,
    atom: Option<AtomHeaderInfo>,
    tracks: Vec<TrackState>,
    /// Set once `moov` has been processed.
    tracks_ready: bool,
    metadata: Vec<MetadataEntry>,
    duration_us: Option<i64>,
    pending_sample: Option<PendingSample>,
    scratch: Vec<u8>,
}

impl Default for Mp4Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Mp4Extractor {
    pub fn new() -> Self {
        Self {
            state: State::ReadingAtomHeader,
            containers: ContainerStack::default(),
            atom: None,
            tracks: Vec::new(),
            tracks_ready: false,
            metadata: Vec::new(),
            duration_us: None,
            pending_sample: None,
            scratch: Vec::new(),
        }
    }

    /// Duration of the longest track, once `moov` has been read.
    pub fn duration_us(&self) -> Option<i64> {
        self.duration_us
    }

    /// Movie-level metadata from `udta`.
    pub fn metadata(&self) -> &[MetadataEntry] {
        &self.metadata
    }

    /// Sample table of the track with container id `id`.
    pub fn sample_table(&self, id: u32) -> Option<&SampleTable> {
        self.tracks
            .iter()
            .find(|t| t.mp4_track.id() == id)
            .map(TrackState::table)
    }

    fn enter_reading_atom_header(&mut self) {
        self.state = State::ReadingAtomHeader;
        self.atom = None;
    }

    /// Returns false at the end of input.
    fn read_header(&mut self, input: &mut dyn ExtractorInput) -> MediaParserResult<bool> {
        let Some(header) = read_atom_header(input, self.containers.innermost_end())? else {
            return Ok(false);
        };
        if is_container_atom(&header.atom_type) {
            self.containers
                .push(ContainerAtom::new(header.atom_type, header.end_position()));
            if header.payload_size() == 0 {
                self.process_ended_containers(header.end_position())?;
            }
            return Ok(true);
        }
        if is_parsed_leaf_atom(&header.atom_type) && header.payload_size() > MAX_LEAF_ATOM_SIZE {
            return Err(MediaParserError::malformed_at(
                format!(
                    "{} atom of {} bytes is too large",
                    fourcc_name(&header.atom_type),
                    header.payload_size()
                ),
                header.position,
            ));
        }
        self.atom = Some(header);
        self.state = State::ReadingAtomPayload;
        Ok(true)
    }

    /// Returns true when a seek was requested.
    fn read_payload(
        &mut self,
        input: &mut dyn ExtractorInput,
        seek_position: &mut u64,
    ) -> MediaParserResult<bool> {
        let Some(header) = self.atom else {
            self.enter_reading_atom_header();
            return Ok(false);
        };
        let mut seek_required = false;
        if is_parsed_leaf_atom(&header.atom_type) {
            let mut data = vec![0u8; header.payload_size() as usize];
            input.read_fully(&mut data, false)?;
            let leaf = LeafAtom {
                atom_type: header.atom_type,
                data,
            };
            if let Some(leaf) = self.containers.add_leaf(leaf) {
                debug!("ignoring top-level {}", fourcc_name(&leaf.atom_type));
            }
        } else {
            seek_required = skip_to(input, header.end_position(), seek_position)?;
        }
        self.enter_reading_atom_header();
        self.process_ended_containers(header.end_position())?;
        Ok(seek_required)
    }

    fn process_ended_containers(&mut self, position: u64) -> MediaParserResult<()> {
        for atom in self.containers.pop_ended(position) {
            if atom.atom_type == MOOV {
                self.process_moov(&atom)?;
            } else {
                debug!("ignoring top-level {}", fourcc_name(&atom.atom_type));
            }
        }
        Ok(())
    }

    fn process_moov(&mut self, moov: &ContainerAtom) -> MediaParserResult<()> {
        let movie_header = parse_mvhd(
            moov.leaf(&MVHD)
                .ok_or_else(|| MediaParserError::malformed("moov without mvhd"))?,
        )?;
        self.metadata = match moov.leaf(&UDTA) {
            Some(udta) => parse_udta(udta)?,
            None => Vec::new(),
        };
        let mut tracks = Vec::new();
        for trak in moov.containers_of(&TRAK) {
            match parse_trak(trak, &movie_header, false)? {
                Some(track) if !track.sample_table.is_empty() => tracks.push(track),
                Some(track) => debug!("skipping track {} without samples", track.id()),
                None => {}
            }
        }
        self.duration_us = tracks
            .iter()
            .filter_map(|t| t.track.duration_us)
            .max()
            .or_else(|| movie_header.duration_us());
        self.tracks = tracks
            .into_iter()
            .map(|mp4_track| TrackState {
                mp4_track,
                output: TrackOutputHandle(0),
                sample_index: 0,
            })
            .collect();
        self.tracks_ready = true;
        self.state = State::ReadingSample;
        Ok(())
    }

    fn emit_tracks(&mut self, output: &mut dyn ExtractorOutput) {
        for track in &mut self.tracks {
            let info = &track.mp4_track.track;
            track.output = output.track(info.id, info.track_type);
            let mut format = info.format.clone();
            format.metadata.extend(self.metadata.iter().cloned());
            output.format(track.output, format);
        }
        output.end_tracks();
        output.seek_map(SeekMap {
            duration_us: self.duration_us,
            seekable: true,
        });
    }

    /// Index of the track whose next sample sits lowest in the file.
    fn next_track(&self) -> Option<usize> {
        self.tracks
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.next_sample_offset().map(|offset| (offset, i)))
            .min()
            .map(|(_, i)| i)
    }

    fn read_sample(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
        seek_position: &mut u64,
    ) -> MediaParserResult<ReadResult> {
        let mut pending = match self.pending_sample {
            Some(pending) => pending,
            None => {
                let Some(track_index) = self.next_track() else {
                    return Ok(ReadResult::EndOfInput);
                };
                let track = &self.tracks[track_index];
                let table = track.table();
                let offset = table.offsets()[track.sample_index];
                if offset != input.position() && skip_to(input, offset, seek_position)? {
                    return Ok(ReadResult::Seek);
                }
                PendingSample {
                    track_index,
                    size: table.sizes()[track.sample_index] as usize,
                    bytes_written: 0,
                }
            }
        };

        let handle = self.tracks[pending.track_index].output;
        if self.scratch.len() < SAMPLE_CHUNK_SIZE {
            self.scratch.resize(SAMPLE_CHUNK_SIZE, 0);
        }
        while pending.bytes_written < pending.size {
            let want = (pending.size - pending.bytes_written).min(SAMPLE_CHUNK_SIZE);
            let read = match input.read(&mut self.scratch[..want]) {
                Ok(read) => read,
                Err(err) => {
                    self.pending_sample = Some(pending);
                    return Err(err);
                }
            };
            if read == 0 {
                self.pending_sample = None;
                return Err(MediaParserError::EndOfInput);
            }
            output.sample_data(handle, &self.scratch[..read]);
            pending.bytes_written += read;
        }

        let track = &mut self.tracks[pending.track_index];
        let index = track.sample_index;
        let table = &track.mp4_track.sample_table;
        output.sample_metadata(
            handle,
            SampleMetadata::new(table.timestamps_us()[index], table.flags()[index], pending.size),
        );
        track.sample_index += 1;
        self.pending_sample = None;
        Ok(ReadResult::Continue)
    }

    /// Sync sample at or before `time_us`, else the first one after it.
    fn sync_sample_index(table: &SampleTable, time_us: i64) -> Option<usize> {
        table
            .index_of_earlier_or_equal_sync_sample(time_us)
            .or_else(|| table.index_of_later_or_equal_sync_sample(time_us))
    }

    fn primary_track(&self) -> Option<usize> {
        self.tracks
            .iter()
            .position(|t| t.mp4_track.track.track_type == TrackType::Video)
            .or(if self.tracks.is_empty() { None } else { Some(0) })
    }
}

impl Extractor for Mp4Extractor {
    fn sniff(&mut self, input: &mut dyn ExtractorInput) -> MediaParserResult<bool> {
        sniff_mp4(input, false)
    }

    fn read(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
        seek_position: &mut u64,
    ) -> MediaParserResult<ReadResult> {
        loop {
            match self.state {
                State::ReadingAtomHeader => {
                    if !self.read_header(input)? {
                        if !self.containers.is_empty() {
                            warn!("input ended inside an open container atom");
                        }
                        return Ok(ReadResult::EndOfInput);
                    }
                    if self.state == State::ReadingSample {
                        self.emit_tracks(output);
                    }
                }
                State::ReadingAtomPayload => {
                    let seek_required = self.read_payload(input, seek_position)?;
                    if self.state == State::ReadingSample {
                        self.emit_tracks(output);
                    }
                    if seek_required {
                        return Ok(ReadResult::Seek);
                    }
                }
                State::ReadingSample => return self.read_sample(input, output, seek_position),
            }
        }
    }

    fn seek(&mut self, _position: u64, time_us: i64) {
        self.containers.clear();
        self.pending_sample = None;
        if !self.tracks_ready {
            self.enter_reading_atom_header();
            return;
        }
        for track in &mut self.tracks {
            let table = &track.mp4_track.sample_table;
            track.sample_index =
                Self::sync_sample_index(table, time_us).unwrap_or(table.sample_count());
        }
        self.state = State::ReadingSample;
    }

    fn seek_points(&self, time_us: i64) -> Option<SeekPoints> {
        if !self.tracks_ready {
            return None;
        }
        let Some(primary) = self.primary_track() else {
            return Some(SeekPoints::single(SeekPoint::START));
        };
        let table = self.tracks[primary].table();
        let Some(index) = Self::sync_sample_index(table, time_us) else {
            return Some(SeekPoints::single(SeekPoint::START));
        };
        let first_time_us = table.timestamps_us()[index];
        let mut first_offset = table.offsets()[index];
        let mut second = None;
        if first_time_us < time_us && index + 1 < table.sample_count() {
            if let Some(later) = table.index_of_later_or_equal_sync_sample(time_us) {
                if later != index {
                    second = Some((table.timestamps_us()[later], table.offsets()[later]));
                }
            }
        }

        // other tracks must be able to start from the returned position too
        for (i, track) in self.tracks.iter().enumerate() {
            if i == primary {
                continue;
            }
            let other = track.table();
            if let Some(index) = Self::sync_sample_index(other, first_time_us) {
                first_offset = first_offset.min(other.offsets()[index]);
            }
            if let Some((second_time_us, second_offset)) = second.as_mut() {
                if let Some(index) = Self::sync_sample_index(other, *second_time_us) {
                    *second_offset = (*second_offset).min(other.offsets()[index]);
                }
            }
        }

        let first = SeekPoint {
            time_us: first_time_us,
            position: first_offset,
        };
        Some(match second {
            Some((time_us, position)) => SeekPoints::pair(first, SeekPoint { time_us, position }),
            None => SeekPoints::single(first),
        })
    }

    fn release(&mut self) {
        self.scratch = Vec::new();
        self.containers.clear();
        self.pending_sample = None;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::extractor::collecting_output::CollectingOutput;
    use crate::extractor::format::VIDEO_H264;
    use crate::mp4::r#box::{make_box, make_full_box};
    use crate::mp4::trak::tests::build_trak_box;
    use crate::streams::BufferedInput;

    fn ftyp() -> Vec<u8> {
        let mut body = b"isom".to_vec();
        body.extend_from_slice(&[0, 0, 2, 0]);
        body.extend_from_slice(b"mp41");
        make_box(b"ftyp", &body)
    }

    fn mvhd() -> Vec<u8> {
        let mut body = vec![0u8; 8];
        body.extend_from_slice(&1000u32.to_be_bytes());
        body.extend_from_slice(&3000u32.to_be_bytes());
        body.extend_from_slice(&[0; 80]);
        make_full_box(b"mvhd", 0, 0, &body)
    }

    /// ftyp, moov, mdat with three video samples of 10, 20 and 30 bytes filled with their index.
    /// With `moov_last` the index follows the sample data.
    pub(crate) fn build_progressive(moov_last: bool) -> Vec<u8> {
        let ftyp = ftyp();
        let sizes = [10u32, 20, 30];
        let mdat_payload: Vec<u8> = sizes
            .iter()
            .enumerate()
            .flat_map(|(i, &s)| std::iter::repeat(i as u8 + 1).take(s as usize))
            .collect();
        let mdat = make_box(b"mdat", &mdat_payload);
        let moov_len = make_box(b"moov", &[mvhd(), build_trak_box(1, &sizes, 0, &[1, 3])].concat()).len();
        let data_offset = if moov_last {
            ftyp.len() + 8
        } else {
            ftyp.len() + moov_len + 8
        };
        let moov = make_box(
            b"moov",
            &[mvhd(), build_trak_box(1, &sizes, data_offset as u32, &[1, 3])].concat(),
        );
        if moov_last {
            [ftyp, mdat, moov].concat()
        } else {
            [ftyp, moov, mdat].concat()
        }
    }

    fn extract(data: Vec<u8>) -> (Mp4Extractor, CollectingOutput) {
        let mut input = BufferedInput::from_bytes(data);
        let mut extractor = Mp4Extractor::new();
        let mut output = CollectingOutput::new();
        let mut seek_position = 0;
        loop {
            match extractor
                .read(&mut input, &mut output, &mut seek_position)
                .unwrap()
            {
                ReadResult::Continue => {}
                ReadResult::EndOfInput => break,
                ReadResult::Seek => input.seek_to(seek_position),
            }
        }
        (extractor, output)
    }

    #[test]
    fn test_sniff() {
        let mut input = BufferedInput::from_bytes(build_progressive(false));
        assert!(Mp4Extractor::new().sniff(&mut input).unwrap());
    }

    #[test]
    fn test_reads_samples_moov_first() {
        let (extractor, output) = extract(build_progressive(false));
        assert_eq!(output.end_tracks_calls, 1);
        assert_eq!(output.seek_map().map(|s| s.duration_us), Some(Some(3_000_000)));
        let track = output.track_by_id(1).expect("track");
        assert_eq!(track.format().and_then(|f| f.mime_type()), Some(VIDEO_H264));
        assert_eq!(track.sample_times_us(), vec![0, 1_000_000, 2_000_000]);
        assert_eq!(track.samples[1].data, vec![2; 20]);
        assert!(track.samples[0].metadata.flags.is_keyframe());
        assert!(!track.samples[1].metadata.flags.is_keyframe());
        assert_eq!(extractor.sample_table(1).map(|t| t.sample_count()), Some(3));
    }

    #[test]
    fn test_reads_samples_moov_last() {
        let (_, output) = extract(build_progressive(true));
        let track = output.track_by_id(1).expect("track");
        assert_eq!(track.samples.len(), 3);
        assert_eq!(track.samples[2].data, vec![3; 30]);
    }

    #[test]
    fn test_byte_by_byte_feeding() {
        let data = build_progressive(false);
        let mut input = BufferedInput::new();
        let mut extractor = Mp4Extractor::new();
        let mut output = CollectingOutput::new();
        let mut seek_position = 0;
        let mut fed = 0;
        loop {
            match extractor.read(&mut input, &mut output, &mut seek_position) {
                Ok(ReadResult::Continue) => {}
                Ok(ReadResult::EndOfInput) => break,
                Ok(ReadResult::Seek) => panic!("unexpected seek"),
                Err(err) if err.is_insufficient_data() => {
                    if fed < data.len() {
                        input.append(&data[fed..fed + 1]);
                        fed += 1;
                    } else {
                        input.end_of_input();
                    }
                }
                Err(err) => panic!("unexpected error {}", err),
            }
        }
        let track = output.track_by_id(1).expect("track");
        assert_eq!(track.samples.len(), 3);
        assert_eq!(track.samples[2].data, vec![3; 30]);
        assert_eq!(output.end_tracks_calls, 1);
    }

    #[test]
    fn test_seek_points_and_seek() {
        let data = build_progressive(false);
        let (mut extractor, _) = extract(data.clone());
        let table = extractor.sample_table(1).expect("table").clone();

        let points = extractor.seek_points(1_500_000).expect("points");
        assert_eq!(points.first.time_us, 0);
        assert_eq!(points.first.position, table.offsets()[0]);
        assert_eq!(points.second.time_us, 2_000_000);
        assert_eq!(points.second.position, table.offsets()[2]);

        let mut input = BufferedInput::from_bytes(data);
        input.seek_to(table.offsets()[2]);
        extractor.seek(table.offsets()[2], 2_000_000);
        let mut output = CollectingOutput::new();
        extractor.emit_tracks(&mut output);
        let mut seek_position = 0;
        assert_eq!(
            extractor
                .read(&mut input, &mut output, &mut seek_position)
                .unwrap(),
            ReadResult::Continue
        );
        assert_eq!(
            extractor
                .read(&mut input, &mut output, &mut seek_position)
                .unwrap(),
            ReadResult::EndOfInput
        );
        let track = output.track_by_id(1).expect("track");
        assert_eq!(track.sample_times_us(), vec![2_000_000]);
    }

    #[test]
    fn test_oversized_leaf_is_malformed() {
        let mut data = ftyp();
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(b"moov");
        data.extend_from_slice(&(1u64 << 40).to_be_bytes());
        data.extend_from_slice(&[0, 0, 0, 1]);
        data.extend_from_slice(b"stsd");
        data.extend_from_slice(&(1u64 << 30).to_be_bytes());
        let mut input = BufferedInput::new();
        input.append(&data);
        let mut extractor = Mp4Extractor::new();
        let mut seek_position = 0;
        let err = loop {
            match extractor.read(&mut input, &mut CollectingOutput::new(), &mut seek_position) {
                Ok(_) => {}
                Err(err) => break err,
            }
        };
        assert!(matches!(err, MediaParserError::Malformed(_)));
    }
}
