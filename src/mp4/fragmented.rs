use super::atom_reader::{read_atom_header, skip_to, AtomHeaderInfo, ContainerStack};
use super::fragment::{parse_mehd, parse_tfdt, parse_tfhd, parse_trex, parse_trun, SampleDefaults};
use super::ftyp::sniff_mp4;
use super::mvhd::parse_mvhd;
use super::r#box::*;
use super::trak::{parse_trak, Mp4Track};
use super::udta::parse_udta;
use super::{is_container_atom, is_parsed_leaf_atom, scale_to_us, MAX_LEAF_ATOM_SIZE};
use crate::errors::{MediaParserError, MediaParserResult};
use crate::extractor::format::TrackType;
use crate::extractor::output::{
    ExtractorOutput, SampleFlags, SampleMetadata, SeekMap, SeekPoint, SeekPoints,
    TrackOutputHandle,
};
use crate::extractor::{Extractor, ReadResult};
use crate::metadata::MetadataEntry;
use crate::sample_table::{SampleTable, SampleTableBuilder};
use crate::streams::ExtractorInput;
use log::{debug, trace, warn};
use std::collections::VecDeque;

const SAMPLE_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadingAtomHeader,
    ReadingAtomPayload,
    ReadingSample,
}

/// Where a fragment's samples start in the per-track index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FragmentStart {
    first_sample_index: usize,
    moof_position: u64,
    base_decode_time: u64,
}

#[derive(Debug)]
struct TrackState {
    mp4_track: Mp4Track,
    output: TrackOutputHandle,
    defaults: SampleDefaults,
    /// Decode time following the last sample of the latest fragment, in media units.
    next_decode_time: u64,
    index: SampleTableBuilder,
    /// Index as of the latest newly indexed moof.
    table: SampleTable,
    fragments: Vec<FragmentStart>,
}

impl TrackState {
    fn last_indexed_moof(&self) -> Option<u64> {
        self.fragments.last().map(|f| f.moof_position)
    }

    /// Position of the moof holding sample `index`.
    fn owning_moof(&self, index: usize) -> u64 {
        let owner = self
            .fragments
            .partition_point(|f| f.first_sample_index <= index);
        owner
            .checked_sub(1)
            .map_or(0, |i| self.fragments[i].moof_position)
    }
}

/// A sample described by a trun and waiting for its bytes in mdat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FragmentSample {
    track_index: usize,
    offset: u64,
    size: u32,
    time_us: i64,
    flags: SampleFlags,
}

/// Reader for fragmented MP4: an initial `moov` with `mvex`, then `moof`/`mdat` pairs.
///
/// Each `moof` is turned into a queue of samples ordered by file offset, which is drained while
/// the following `mdat` is read. Every fragment seen for the first time is appended to a growing
/// per-track index that answers seek requests.
#[derive(Debug)]
pub struct FragmentedMp4Extractor {
    state: State,
    containers: ContainerStack,
    atom: Option<AtomHeaderInfo>,
    /// Start of the top-level moof being parsed.
    moof_position: u64,
    mdat_end: u64,
    tracks: Vec<TrackState>,
    tracks_ready: bool,
    tracks_emitted: bool,
    metadata: Vec<MetadataEntry>,
    duration_us: Option<i64>,
    pending: VecDeque<FragmentSample>,
    sample_bytes_written: usize,
    scratch: Vec<u8>,
}

impl Default for FragmentedMp4Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FragmentedMp4Extractor {
    pub fn new() -> Self {
        Self {
            state: State::ReadingAtomHeader,
            containers: ContainerStack::default(),
            atom: None,
            moof_position: 0,
            mdat_end: 0,
            tracks: Vec::new(),
            tracks_ready: false,
            tracks_emitted: false,
            metadata: Vec::new(),
            duration_us: None,
            pending: VecDeque::new(),
            sample_bytes_written: 0,
            scratch: Vec::new(),
        }
    }

    pub fn duration_us(&self) -> Option<i64> {
        self.duration_us
    }

    pub fn metadata(&self) -> &[MetadataEntry] {
        &self.metadata
    }

    /// Index built so far for the track with container id `id`.
    pub fn sample_table(&self, id: u32) -> Option<&SampleTable> {
        self.tracks
            .iter()
            .find(|t| t.mp4_track.id() == id)
            .map(|t| &t.table)
    }

    fn enter_reading_atom_header(&mut self) {
        self.state = State::ReadingAtomHeader;
        self.atom = None;
    }

    /// Returns `None` at the end of input, else whether a seek was requested.
    fn read_header(
        &mut self,
        input: &mut dyn ExtractorInput,
        seek_position: &mut u64,
    ) -> MediaParserResult<Option<bool>> {
        let Some(header) = read_atom_header(input, self.containers.innermost_end())? else {
            return Ok(None);
        };
        if header.atom_type == MDAT {
            if self.pending.is_empty() {
                trace!("skipping mdat without queued samples");
                return Ok(Some(skip_to(input, header.end_position(), seek_position)?));
            }
            self.mdat_end = header.end_position();
            self.sample_bytes_written = 0;
            self.state = State::ReadingSample;
            return Ok(Some(false));
        }
        if is_container_atom(&header.atom_type) {
            if header.atom_type == MOOF && self.containers.is_empty() {
                self.moof_position = header.position;
            }
            self.containers
                .push(ContainerAtom::new(header.atom_type, header.end_position()));
            if header.payload_size() == 0 {
                self.process_ended_containers(header.end_position())?;
            }
            return Ok(Some(false));
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
        Ok(Some(false))
    }

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
            match atom.atom_type {
                MOOV => self.process_moov(&atom)?,
                MOOF => self.process_moof(&atom, self.moof_position)?,
                other => debug!("ignoring top-level {}", fourcc_name(&other)),
            }
        }
        Ok(())
    }

    fn process_moov(&mut self, moov: &ContainerAtom) -> MediaParserResult<()> {
        if self.tracks_ready {
            debug!("ignoring repeated moov");
            return Ok(());
        }
        let movie_header = parse_mvhd(
            moov.leaf(&MVHD)
                .ok_or_else(|| MediaParserError::malformed("moov without mvhd"))?,
        )?;
        let mvex = moov
            .container(&MVEX)
            .ok_or_else(|| MediaParserError::malformed("fragmented moov without mvex"))?;
        let mut defaults = Vec::new();
        for trex in mvex.leaves_of(&TREX) {
            defaults.push(parse_trex(trex)?);
        }
        let fragment_duration_us = match mvex.leaf(&MEHD) {
            Some(mehd) => Some(scale_to_us(
                parse_mehd(mehd)? as i64,
                movie_header.timescale,
            )),
            None => None,
        };
        self.metadata = match moov.leaf(&UDTA) {
            Some(udta) => parse_udta(udta)?,
            None => Vec::new(),
        };

        let mut tracks = Vec::new();
        for trak in moov.containers_of(&TRAK) {
            let Some(mp4_track) = parse_trak(trak, &movie_header, true)? else {
                continue;
            };
            let track_defaults = defaults
                .iter()
                .find(|(id, _)| *id == mp4_track.id())
                .map(|(_, d)| *d)
                .unwrap_or_default();
            tracks.push(TrackState {
                mp4_track,
                output: TrackOutputHandle(0),
                defaults: track_defaults,
                next_decode_time: 0,
                index: SampleTableBuilder::new(),
                table: SampleTable::empty(),
                fragments: Vec::new(),
            });
        }
        self.duration_us = fragment_duration_us
            .filter(|d| *d > 0)
            .or_else(|| movie_header.duration_us().filter(|d| *d > 0))
            .or_else(|| {
                tracks
                    .iter()
                    .filter_map(|t| t.mp4_track.track.duration_us)
                    .max()
            });
        self.tracks = tracks;
        self.tracks_ready = true;
        Ok(())
    }

    fn process_moof(&mut self, moof: &ContainerAtom, moof_position: u64) -> MediaParserResult<()> {
        if !self.tracks_ready {
            return Err(MediaParserError::malformed_at(
                "moof before moov",
                moof_position,
            ));
        }
        let mut queued = Vec::new();
        for traf in moof.containers_of(&TRAF) {
            let Some(tfhd) = traf.leaf(&TFHD) else {
                warn!("traf without tfhd");
                continue;
            };
            let header = parse_tfhd(tfhd, |id| {
                self.tracks
                    .iter()
                    .find(|t| t.mp4_track.id() == id)
                    .map_or_else(SampleDefaults::default, |t| t.defaults)
            })?;
            let Some(track_index) = self
                .tracks
                .iter()
                .position(|t| t.mp4_track.id() == header.track_id)
            else {
                debug!("skipping traf of unknown track {}", header.track_id);
                continue;
            };
            let base_data_offset = header.base_data_offset.unwrap_or(moof_position);
            let track = &mut self.tracks[track_index];
            let mut decode_time = match traf.leaf(&TFDT) {
                Some(tfdt) => parse_tfdt(tfdt)?,
                None => track.next_decode_time,
            };
            let base_decode_time = decode_time;
            let mut data_end = base_data_offset;
            let first_queued = queued.len();

            for trun in traf.leaves_of(&TRUN) {
                let run = parse_trun(trun, &header.defaults)?;
                let mut offset = match run.data_offset {
                    Some(relative) => base_data_offset
                        .checked_add_signed(i64::from(relative))
                        .ok_or_else(|| {
                            MediaParserError::malformed_at(
                                format!("trun data offset {} outside the input", relative),
                                moof_position,
                            )
                        })?,
                    None => data_end,
                };
                for sample in &run.samples {
                    let time_us = i64::try_from(decode_time)
                        .ok()
                        .and_then(|t| t.checked_add(sample.composition_offset))
                        .and_then(|t| track.mp4_track.media_time_to_us(t))
                        .ok_or_else(|| {
                            MediaParserError::malformed_at("sample time overflows", moof_position)
                        })?;
                    queued.push(FragmentSample {
                        track_index,
                        offset,
                        size: sample.size,
                        time_us,
                        flags: if sample.is_sync() {
                            SampleFlags::KEYFRAME
                        } else {
                            SampleFlags::NONE
                        },
                    });
                    offset = offset.checked_add(u64::from(sample.size)).ok_or_else(|| {
                        MediaParserError::malformed_at("sample offset overflows", moof_position)
                    })?;
                    decode_time = decode_time
                        .checked_add(u64::from(sample.duration))
                        .ok_or_else(|| {
                            MediaParserError::malformed_at("decode time overflows", moof_position)
                        })?;
                }
                data_end = offset;
            }
            track.next_decode_time = decode_time;

            if track
                .last_indexed_moof()
                .map_or(true, |last| moof_position > last)
            {
                let fragment = &queued[first_queued..];
                track.fragments.push(FragmentStart {
                    first_sample_index: track.index.len(),
                    moof_position,
                    base_decode_time,
                });
                track.index.reserve(fragment.len());
                for sample in fragment {
                    track
                        .index
                        .push(sample.offset, sample.size, sample.time_us, sample.flags);
                }
                let end_time = i64::try_from(decode_time).map_err(|_| {
                    MediaParserError::malformed_at("decode time overflows", moof_position)
                })?;
                track.index.set_duration_us(scale_to_us(
                    end_time.saturating_sub(track.mp4_track.edit_start),
                    track.mp4_track.media_header.timescale,
                ));
                track.table = track.index.snapshot()?;
            }
        }
        trace!("moof at {} queued {} samples", moof_position, queued.len());
        self.pending.extend(queued);
        self.pending.make_contiguous().sort_by_key(|s| s.offset);
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
        self.tracks_emitted = true;
    }

    /// Leave the current mdat once its queued samples are drained.
    fn finish_mdat(
        &mut self,
        input: &mut dyn ExtractorInput,
        seek_position: &mut u64,
    ) -> MediaParserResult<ReadResult> {
        self.enter_reading_atom_header();
        if skip_to(input, self.mdat_end, seek_position)? {
            return Ok(ReadResult::Seek);
        }
        Ok(ReadResult::Continue)
    }

    fn read_sample(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
        seek_position: &mut u64,
    ) -> MediaParserResult<ReadResult> {
        let sample = match self.pending.front() {
            Some(sample) if sample.offset < self.mdat_end => *sample,
            _ => return self.finish_mdat(input, seek_position),
        };
        if self.sample_bytes_written == 0 {
            let position = input.position();
            if sample.offset < position {
                warn!(
                    "ignoring negative offset to sample data: {} before {}",
                    sample.offset, position
                );
            } else if sample.offset > position {
                input.skip_fully((sample.offset - position) as usize, false)?;
            }
        }

        let handle = self.tracks[sample.track_index].output;
        let size = sample.size as usize;
        if self.scratch.len() < SAMPLE_CHUNK_SIZE {
            self.scratch.resize(SAMPLE_CHUNK_SIZE, 0);
        }
        while self.sample_bytes_written < size {
            let want = (size - self.sample_bytes_written).min(SAMPLE_CHUNK_SIZE);
            let read = input.read(&mut self.scratch[..want])?;
            if read == 0 {
                return Err(MediaParserError::EndOfInput);
            }
            output.sample_data(handle, &self.scratch[..read]);
            self.sample_bytes_written += read;
        }
        output.sample_metadata(handle, SampleMetadata::new(sample.time_us, sample.flags, size));
        self.pending.pop_front();
        self.sample_bytes_written = 0;
        Ok(ReadResult::Continue)
    }

    fn primary_track(&self) -> Option<usize> {
        self.tracks
            .iter()
            .position(|t| t.mp4_track.track.track_type == TrackType::Video)
            .or(if self.tracks.is_empty() { None } else { Some(0) })
    }
}

impl Extractor for FragmentedMp4Extractor {
    fn sniff(&mut self, input: &mut dyn ExtractorInput) -> MediaParserResult<bool> {
        sniff_mp4(input, true)
    }

    fn read(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
        seek_position: &mut u64,
    ) -> MediaParserResult<ReadResult> {
        loop {
            let seek_required = match self.state {
                State::ReadingAtomHeader => match self.read_header(input, seek_position)? {
                    Some(seek_required) => seek_required,
                    None => {
                        if !self.containers.is_empty() {
                            warn!("input ended inside an open container atom");
                        }
                        return Ok(ReadResult::EndOfInput);
                    }
                },
                State::ReadingAtomPayload => self.read_payload(input, seek_position)?,
                State::ReadingSample => {
                    if !self.tracks_emitted {
                        self.emit_tracks(output);
                    }
                    return self.read_sample(input, output, seek_position);
                }
            };
            if self.tracks_ready && !self.tracks_emitted {
                self.emit_tracks(output);
            }
            if seek_required {
                return Ok(ReadResult::Seek);
            }
        }
    }

    fn seek(&mut self, position: u64, _time_us: i64) {
        self.containers.clear();
        self.pending.clear();
        self.sample_bytes_written = 0;
        self.enter_reading_atom_header();
        for track in &mut self.tracks {
            if position == 0 {
                track.next_decode_time = 0;
            } else if let Some(fragment) = track
                .fragments
                .iter()
                .find(|f| f.moof_position == position)
            {
                track.next_decode_time = fragment.base_decode_time;
            }
        }
    }

    fn seek_points(&self, time_us: i64) -> Option<SeekPoints> {
        if !self.tracks_ready {
            return None;
        }
        let Some(primary) = self.primary_track() else {
            return Some(SeekPoints::single(SeekPoint::START));
        };
        let track = &self.tracks[primary];
        let table = &track.table;
        if table.is_empty() {
            return Some(SeekPoints::single(SeekPoint::START));
        }
        let Some(index) = table
            .index_of_earlier_or_equal_sync_sample(time_us)
            .or_else(|| table.index_of_later_or_equal_sync_sample(time_us))
        else {
            return Some(SeekPoints::single(SeekPoint::START));
        };
        let first = SeekPoint {
            time_us: table.timestamps_us()[index],
            position: track.owning_moof(index),
        };
        if first.time_us < time_us {
            if let Some(later) = table.index_of_later_or_equal_sync_sample(time_us) {
                if later != index {
                    let second = SeekPoint {
                        time_us: table.timestamps_us()[later],
                        position: track.owning_moof(later),
                    };
                    return Some(SeekPoints::pair(first, second));
                }
            }
        }
        Some(SeekPoints::single(first))
    }

    fn release(&mut self) {
        self.scratch = Vec::new();
        self.containers.clear();
        self.pending.clear();
        self.sample_bytes_written = 0;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::extractor::collecting_output::CollectingOutput;
    use crate::mp4::r#box::{make_box, make_full_box};
    use crate::mp4::trak::tests::build_trak_box;
    use crate::streams::BufferedInput;

    fn u32s(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    fn init_segment() -> Vec<u8> {
        let mut ftyp_body = b"iso6".to_vec();
        ftyp_body.extend_from_slice(&[0, 0, 0, 0]);
        ftyp_body.extend_from_slice(b"dash");
        let ftyp = make_box(b"ftyp", &ftyp_body);

        let mvhd = make_full_box(
            b"mvhd",
            0,
            0,
            &[vec![0; 8], u32s(&[1000, 0]), vec![0; 80]].concat(),
        );
        // defaults: 1000 ticks per sample, non-sync
        let trex = make_full_box(b"trex", 0, 0, &u32s(&[1, 1, 1000, 0, 0x0001_0000]));
        let mehd = make_full_box(b"mehd", 0, 0, &u32s(&[4000]));
        let mvex = make_box(b"mvex", &[mehd, trex].concat());
        let moov = make_box(b"moov", &[mvhd, mvex, build_trak_box(1, &[], 0, &[])].concat());
        [ftyp, moov].concat()
    }

    fn moof(sequence: u32, base_decode_time: u64, sizes: &[u32], data_offset: u32) -> Vec<u8> {
        let mfhd = make_full_box(b"mfhd", 0, 0, &u32s(&[sequence]));
        let tfhd = make_full_box(b"tfhd", 0, 0x02_0000, &u32s(&[1]));
        let tfdt = make_full_box(b"tfdt", 1, 0, &base_decode_time.to_be_bytes());
        let trun = make_full_box(
            b"trun",
            0,
            0x01 | 0x04 | 0x200,
            &[
                u32s(&[sizes.len() as u32, data_offset, 0x0200_0000]),
                u32s(sizes),
            ]
            .concat(),
        );
        let traf = make_box(b"traf", &[tfhd, tfdt, trun].concat());
        make_box(b"moof", &[mfhd, traf].concat())
    }

    /// A fragment whose mdat directly follows its moof, sample bytes filled with `fill`.
    fn fragment(sequence: u32, base_decode_time: u64, sizes: &[u32], fill: u8) -> Vec<u8> {
        let moof_len = moof(sequence, base_decode_time, sizes, 0).len() as u32;
        let payload: Vec<u8> = sizes
            .iter()
            .enumerate()
            .flat_map(|(i, &s)| std::iter::repeat(fill + i as u8).take(s as usize))
            .collect();
        [
            moof(sequence, base_decode_time, sizes, moof_len + 8),
            make_box(b"mdat", &payload),
        ]
        .concat()
    }

    /// Init segment and two fragments of two samples each. Returns the file and the moof
    /// positions.
    pub(crate) fn build_fragmented() -> (Vec<u8>, [u64; 2]) {
        let init = init_segment();
        let first = fragment(1, 0, &[5, 6], 1);
        let second = fragment(2, 2000, &[7, 8], 3);
        let positions = [init.len() as u64, (init.len() + first.len()) as u64];
        ([init, first, second].concat(), positions)
    }

    fn read_to_end(
        extractor: &mut FragmentedMp4Extractor,
        input: &mut BufferedInput,
        output: &mut CollectingOutput,
    ) {
        let mut seek_position = 0;
        loop {
            match extractor.read(input, output, &mut seek_position).unwrap() {
                ReadResult::Continue => {}
                ReadResult::EndOfInput => break,
                ReadResult::Seek => input.seek_to(seek_position),
            }
        }
    }

    #[test]
    fn test_sniff_selects_fragmented() {
        let (data, _) = build_fragmented();
        let mut input = BufferedInput::from_bytes(data);
        assert!(FragmentedMp4Extractor::new().sniff(&mut input).unwrap());
    }

    #[test]
    fn test_reads_fragments() {
        let (data, _) = build_fragmented();
        let mut extractor = FragmentedMp4Extractor::new();
        let mut output = CollectingOutput::new();
        read_to_end(&mut extractor, &mut BufferedInput::from_bytes(data), &mut output);

        assert_eq!(output.end_tracks_calls, 1);
        assert_eq!(output.seek_map().map(|s| s.duration_us), Some(Some(4_000_000)));
        let track = output.track_by_id(1).expect("track");
        assert_eq!(
            track.sample_times_us(),
            vec![0, 1_000_000, 2_000_000, 3_000_000]
        );
        assert_eq!(track.samples[1].data, vec![2; 6]);
        assert_eq!(track.samples[3].data, vec![4; 8]);
        let keyframes: Vec<bool> = track
            .samples
            .iter()
            .map(|s| s.metadata.flags.is_keyframe())
            .collect();
        assert_eq!(keyframes, vec![true, false, true, false]);
    }

    #[test]
    fn test_byte_by_byte_feeding() {
        let (data, _) = build_fragmented();
        let mut input = BufferedInput::new();
        let mut extractor = FragmentedMp4Extractor::new();
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
        assert_eq!(track.samples.len(), 4);
        assert_eq!(track.samples[2].data, vec![3; 7]);
    }

    #[test]
    fn test_seek_points_resolve_to_owning_moof() {
        let (data, positions) = build_fragmented();
        let mut extractor = FragmentedMp4Extractor::new();
        read_to_end(
            &mut extractor,
            &mut BufferedInput::from_bytes(data),
            &mut CollectingOutput::new(),
        );

        let points = extractor.seek_points(500_000).expect("points");
        assert_eq!(points.first, SeekPoint { time_us: 0, position: positions[0] });
        assert_eq!(
            points.second,
            SeekPoint {
                time_us: 2_000_000,
                position: positions[1]
            }
        );
        let points = extractor.seek_points(2_500_000).expect("points");
        assert_eq!(points.first.position, positions[1]);
        assert_eq!(points.first, points.second);
    }

    #[test]
    fn test_rereading_after_seek_does_not_grow_index() {
        let (data, positions) = build_fragmented();
        let mut extractor = FragmentedMp4Extractor::new();
        let mut output = CollectingOutput::new();
        let mut input = BufferedInput::from_bytes(data);
        read_to_end(&mut extractor, &mut input, &mut output);
        assert_eq!(extractor.sample_table(1).map(|t| t.sample_count()), Some(4));

        extractor.seek(positions[1], 2_000_000);
        input.seek_to(positions[1]);
        output.clear_samples();
        read_to_end(&mut extractor, &mut input, &mut output);

        let track = output.track_by_id(1).expect("track");
        assert_eq!(track.sample_times_us(), vec![2_000_000, 3_000_000]);
        let table = extractor.sample_table(1).expect("table");
        assert_eq!(table.sample_count(), 4);
        assert_eq!(table.duration_us(), 4_000_000);
        assert_eq!(output.end_tracks_calls, 1);
    }

    #[test]
    fn test_index_is_published_per_moof() {
        let (data, positions) = build_fragmented();
        let mut extractor = FragmentedMp4Extractor::new();
        let mut input = BufferedInput::from_bytes(data[..positions[1] as usize].to_vec());
        read_to_end(&mut extractor, &mut input, &mut CollectingOutput::new());

        let table = extractor.sample_table(1).expect("table");
        assert_eq!(table.sample_count(), 2);
        assert_eq!(table.timestamps_us(), &[0, 1_000_000]);
        let points = extractor.seek_points(3_000_000).expect("points");
        assert_eq!(points.first, SeekPoint { time_us: 0, position: positions[0] });
    }

    #[test]
    fn test_decode_time_overflow_is_malformed() {
        let data = [init_segment(), fragment(1, u64::MAX - 10, &[5, 6], 1)].concat();
        let mut input = BufferedInput::from_bytes(data);
        let mut extractor = FragmentedMp4Extractor::new();
        let mut output = CollectingOutput::new();
        let mut seek_position = 0;
        let err = loop {
            match extractor.read(&mut input, &mut output, &mut seek_position) {
                Ok(ReadResult::Continue) => {}
                Ok(other) => panic!("unexpected {:?}", other),
                Err(err) => break err,
            }
        };
        assert!(matches!(err, MediaParserError::Malformed(_)));
        assert!(output.track_by_id(1).map_or(true, |t| t.samples.is_empty()));
    }

    #[test]
    fn test_moof_without_moov_is_malformed() {
        let data = fragment(1, 0, &[4], 1);
        let mut input = BufferedInput::from_bytes(data);
        let mut seek_position = 0;
        let err = FragmentedMp4Extractor::new()
            .read(&mut input, &mut CollectingOutput::new(), &mut seek_position)
            .unwrap_err();
        assert!(matches!(err, MediaParserError::Malformed(_)));
    }
}
