use super::header::*;
use crate::errors::{MediaParserError, MediaParserResult};
use crate::extractor::format::TrackType;
use crate::extractor::output::{
    ExtractorOutput, SampleFlags, SampleMetadata, SeekMap, SeekPoint, SeekPoints,
    TrackOutputHandle,
};
use crate::extractor::{Extractor, ReadResult};
use crate::metadata::{decode_id3_tag, MetadataEntry};
use crate::streams::{peek_vec, ExtractorInput};
use log::{debug, trace, warn};

/// Container id of the single WAV track.
pub const WAV_TRACK_ID: u32 = 0;

/// Largest non-data chunk buffered in memory.
const MAX_METADATA_CHUNK_SIZE: u64 = 16 * 1024 * 1024;

/// Size of the data chunk when the writer did not know it.
const UNKNOWN_DATA_SIZE: u64 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadingFileType,
    ReadingChunks,
    ReadingSampleData,
}

/// Byte range of the `data` chunk payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DataRange {
    start: u64,
    end: u64,
}

/// Passthrough sample writer state
#[derive(Debug, Clone, Copy, Default)]
struct OutputState {
    start_time_us: i64,
    /// Bytes handed to the sink but not yet covered by sample metadata.
    pending_output_bytes: usize,
    output_frame_count: u64,
}

/// Reader for RIFF/RF64 WAVE files.
///
/// Chunks ahead of `data` are walked in order: `fmt ` describes the samples, `ds64` supplies the
/// 64-bit data size of RF64 files, `id3 ` and `LIST`/`INFO` carry metadata, and anything else is
/// skipped. Sample data is passed through in groups of whole frames covering about 100 ms.
#[derive(Debug)]
pub struct WavExtractor {
    state: State,
    is_rf64: bool,
    rf64_data_size: Option<u64>,
    format: Option<WavFormat>,
    metadata: Vec<MetadataEntry>,
    data: Option<DataRange>,
    output: Option<TrackOutputHandle>,
    target_sample_size: usize,
    writer: OutputState,
    scratch: Vec<u8>,
}

impl Default for WavExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl WavExtractor {
    pub fn new() -> Self {
        Self {
            state: State::ReadingFileType,
            is_rf64: false,
            rf64_data_size: None,
            format: None,
            metadata: Vec::new(),
            data: None,
            output: None,
            target_sample_size: 0,
            writer: OutputState::default(),
            scratch: Vec::new(),
        }
    }

    pub fn format(&self) -> Option<&WavFormat> {
        self.format.as_ref()
    }

    pub fn duration_us(&self) -> Option<i64> {
        let format = self.format.as_ref()?;
        let data = self.data.filter(|d| d.end != u64::MAX)?;
        let frames = (data.end - data.start) / format.bytes_per_frame().max(1) as u64;
        Some(frames_to_us(frames, format.sample_rate))
    }

    fn read_file_type(&mut self, input: &mut dyn ExtractorInput) -> MediaParserResult<()> {
        input.reset_peek_position();
        let header = peek_vec(input, FILE_HEADER_SIZE)?;
        let riff: ChunkId = [header[0], header[1], header[2], header[3]];
        if !(riff == RIFF || riff == RF64) || header[8..12] != WAVE {
            return Err(MediaParserError::malformed_at(
                format!("unsupported or unrecognized wav file type {}", chunk_name(&riff)),
                input.position(),
            ));
        }
        input.skip_fully(FILE_HEADER_SIZE, false)?;
        self.is_rf64 = riff == RF64;
        self.state = State::ReadingChunks;
        Ok(())
    }

    /// Handle the next chunk ahead of the sample data. Each chunk is peeked in full before it
    /// is consumed.
    fn read_chunk(&mut self, input: &mut dyn ExtractorInput) -> MediaParserResult<()> {
        input.reset_peek_position();
        let position = input.position();
        let mut raw_header = [0u8; CHUNK_HEADER_SIZE];
        if !input.peek_fully(&mut raw_header, true)? {
            return Err(MediaParserError::malformed_at("no data chunk in WAV file", position));
        }
        let header = ChunkHeader::parse(&raw_header)?;
        trace!("chunk {} at {} size {}", chunk_name(&header.id), position, header.size);

        if header.id == DATA {
            input.skip_fully(CHUNK_HEADER_SIZE, false)?;
            return self.start_data(input, header);
        }

        let buffered = matches!(header.id, FMT | DS64 | LIST | ID3_LOWER | ID3_UPPER);
        if buffered && header.size > MAX_METADATA_CHUNK_SIZE {
            return Err(MediaParserError::malformed_at(
                format!("{} chunk of {} bytes is too large", chunk_name(&header.id), header.size),
                position,
            ));
        }
        let payload = if buffered {
            peek_vec(input, header.size as usize)?
        } else {
            input.advance_peek_position(header.size as usize, false)?;
            Vec::new()
        };
        // a trailing chunk may lack its pad byte
        let pad_present = header.pad_size() == 1 && input.advance_peek_position(1, true)?;

        match header.id {
            FMT => self.format = Some(WavFormat::parse(&payload)?),
            DS64 => self.rf64_data_size = Some(parse_ds64(&payload)?),
            LIST => self.metadata.extend(parse_info_list(&payload)?),
            ID3_LOWER | ID3_UPPER => match decode_id3_tag(&payload) {
                Ok(frames) => self
                    .metadata
                    .extend(frames.into_iter().map(MetadataEntry::Id3)),
                Err(err) => warn!("ignoring undecodable id3 chunk: {}", err),
            },
            other => warn!("skipping unknown WAV chunk {}", chunk_name(&other)),
        }
        input.skip_fully(
            CHUNK_HEADER_SIZE + header.size as usize + usize::from(pad_present),
            false,
        )?;
        Ok(())
    }

    fn start_data(
        &mut self,
        input: &mut dyn ExtractorInput,
        header: ChunkHeader,
    ) -> MediaParserResult<()> {
        let Some(format) = self.format.as_ref() else {
            return Err(MediaParserError::malformed("data chunk before fmt chunk"));
        };
        let start = input.position();
        let mut size = header.size;
        if self.is_rf64 {
            if let Some(rf64_size) = self.rf64_data_size {
                size = rf64_size;
            }
        }
        let mut end = start.saturating_add(size);
        if header.size == UNKNOWN_DATA_SIZE && !self.is_rf64 {
            end = u64::MAX;
        }
        if let Some(length) = input.length() {
            if end > length {
                debug!("data chunk runs past the end of input, clamping to {}", length);
                end = length;
            }
        }
        let bytes_per_frame = format.bytes_per_frame().max(1);
        let target_frames = (format.sample_rate as usize / 10).max(1);
        self.target_sample_size = target_frames * bytes_per_frame;
        self.data = Some(DataRange { start, end });
        self.writer = OutputState::default();
        self.state = State::ReadingSampleData;
        Ok(())
    }

    fn emit_track(&mut self, output: &mut dyn ExtractorOutput) -> MediaParserResult<()> {
        let Some(format) = self.format.as_ref() else {
            return Err(MediaParserError::malformed("data chunk before fmt chunk"));
        };
        let track_format =
            format.output_format(self.target_sample_size, self.metadata.clone())?;
        let handle = output.track(WAV_TRACK_ID, TrackType::Audio);
        output.format(handle, track_format);
        output.end_tracks();
        output.seek_map(SeekMap {
            duration_us: self.duration_us(),
            seekable: true,
        });
        self.output = Some(handle);
        Ok(())
    }

    fn read_sample_data(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
        handle: TrackOutputHandle,
    ) -> MediaParserResult<ReadResult> {
        let (Some(format), Some(data)) = (self.format.as_ref(), self.data) else {
            return Ok(ReadResult::EndOfInput);
        };
        let bytes_per_frame = format.bytes_per_frame().max(1);
        let sample_rate = format.sample_rate;
        if self.scratch.len() < self.target_sample_size {
            self.scratch.resize(self.target_sample_size, 0);
        }

        let mut end_of_sample_data = input.position() >= data.end;
        while !end_of_sample_data && self.writer.pending_output_bytes < self.target_sample_size {
            let bytes_left = data.end - input.position();
            let want = ((self.target_sample_size - self.writer.pending_output_bytes) as u64)
                .min(bytes_left) as usize;
            let read = input.read(&mut self.scratch[..want])?;
            if read == 0 {
                end_of_sample_data = true;
            } else {
                output.sample_data(handle, &self.scratch[..read]);
                self.writer.pending_output_bytes += read;
                end_of_sample_data = input.position() >= data.end;
            }
        }

        let pending_frames = self.writer.pending_output_bytes / bytes_per_frame;
        if pending_frames > 0 {
            let time_us = self.writer.start_time_us
                + frames_to_us(self.writer.output_frame_count, sample_rate);
            let size = pending_frames * bytes_per_frame;
            let offset = self.writer.pending_output_bytes - size;
            let mut metadata = SampleMetadata::new(time_us, SampleFlags::KEYFRAME, size);
            metadata.offset = offset;
            output.sample_metadata(handle, metadata);
            self.writer.output_frame_count += pending_frames as u64;
            self.writer.pending_output_bytes = offset;
        }
        Ok(if end_of_sample_data {
            ReadResult::EndOfInput
        } else {
            ReadResult::Continue
        })
    }
}

fn frames_to_us(frames: u64, sample_rate: u32) -> i64 {
    if sample_rate == 0 {
        return 0;
    }
    (u128::from(frames) * 1_000_000 / u128::from(sample_rate)) as i64
}

impl Extractor for WavExtractor {
    fn sniff(&mut self, input: &mut dyn ExtractorInput) -> MediaParserResult<bool> {
        sniff_wav(input)
    }

    fn read(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
        _seek_position: &mut u64,
    ) -> MediaParserResult<ReadResult> {
        loop {
            match self.state {
                State::ReadingFileType => self.read_file_type(input)?,
                State::ReadingChunks => self.read_chunk(input)?,
                State::ReadingSampleData => {
                    let handle = match self.output {
                        Some(handle) => handle,
                        None => {
                            self.emit_track(output)?;
                            return Ok(ReadResult::Continue);
                        }
                    };
                    return self.read_sample_data(input, output, handle);
                }
            }
        }
    }

    fn seek(&mut self, position: u64, time_us: i64) {
        self.writer = OutputState {
            start_time_us: time_us,
            ..OutputState::default()
        };
        match self.data {
            Some(data) if position >= data.start => self.state = State::ReadingSampleData,
            _ => {
                self.state = State::ReadingFileType;
                self.metadata.clear();
                self.data = None;
            }
        }
    }

    fn seek_points(&self, time_us: i64) -> Option<SeekPoints> {
        let format = self.format.as_ref()?;
        let data = self.data?;
        let bytes_per_block = format.bytes_per_frame().max(1) as u64;
        let data_size = data.end.saturating_sub(data.start);
        let block_count = data_size / bytes_per_block;
        if block_count == 0 {
            return Some(SeekPoints::single(SeekPoint {
                time_us: 0,
                position: data.start,
            }));
        }
        let rate = u128::from(format.sample_rate);
        let target_block =
            (u128::from(time_us.max(0) as u64) * rate / 1_000_000) as u64;
        let block = target_block.min(block_count - 1);
        let point = |block: u64| SeekPoint {
            time_us: frames_to_us(block, format.sample_rate),
            position: data.start + block * bytes_per_block,
        };
        let first = point(block);
        if first.time_us >= time_us || block + 1 >= block_count {
            return Some(SeekPoints::single(first));
        }
        Some(SeekPoints::pair(first, point(block + 1)))
    }

    fn release(&mut self) {
        self.scratch = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::collecting_output::CollectingOutput;
    use crate::extractor::format::{PcmEncoding, AUDIO_RAW};
    use crate::streams::BufferedInput;
    use crate::wav::tests::{build_wav, chunk};

    fn extract(data: Vec<u8>) -> (WavExtractor, CollectingOutput) {
        let mut input = BufferedInput::from_bytes(data);
        let mut extractor = WavExtractor::new();
        let mut output = CollectingOutput::new();
        let mut seek_position = 0;
        while extractor
            .read(&mut input, &mut output, &mut seek_position)
            .unwrap()
            != ReadResult::EndOfInput
        {}
        (extractor, output)
    }

    #[test]
    fn test_passthrough_groups_of_100ms() {
        // 0.25 s of 16-bit stereo at 8 kHz
        let data: Vec<u8> = (0..8000u32).map(|i| i as u8).collect();
        let (extractor, output) = extract(build_wav(2, 8000, 16, &data));
        assert_eq!(output.end_tracks_calls, 1);
        assert_eq!(output.seek_maps.len(), 1);
        assert_eq!(output.seek_map().map(|s| s.duration_us), Some(Some(250_000)));
        assert_eq!(extractor.duration_us(), Some(250_000));

        let track = output.track_by_id(WAV_TRACK_ID).expect("track");
        let format = track.format().expect("format");
        assert_eq!(format.mime_type(), Some(AUDIO_RAW));
        assert_eq!(format.pcm_encoding, Some(PcmEncoding::S16Le));
        assert_eq!(format.max_input_size, Some(3200));
        assert_eq!(track.sample_times_us(), vec![0, 100_000, 200_000]);
        let sizes: Vec<usize> = track.samples.iter().map(|s| s.metadata.size).collect();
        assert_eq!(sizes, vec![3200, 3200, 1600]);
        assert_eq!(track.data, data);
    }

    #[test]
    fn test_skips_odd_unknown_chunk_and_reads_info() {
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&WAVE_FORMAT_PCM.to_le_bytes());
        fmt.extend_from_slice(&1u16.to_le_bytes());
        fmt.extend_from_slice(&8000u32.to_le_bytes());
        fmt.extend_from_slice(&8000u32.to_le_bytes());
        fmt.extend_from_slice(&1u16.to_le_bytes());
        fmt.extend_from_slice(&8u16.to_le_bytes());
        let mut info = b"INFO".to_vec();
        info.extend_from_slice(&chunk(b"IART", b"Band\0"));
        let body = [
            b"WAVE".to_vec(),
            chunk(b"junk", &[1, 2, 3]),
            chunk(b"fmt ", &fmt),
            chunk(b"LIST", &info),
            chunk(b"data", &[0x80; 10]),
        ]
        .concat();
        let file = chunk(b"RIFF", &body);

        let (_, output) = extract(file);
        let track = output.track_by_id(WAV_TRACK_ID).expect("track");
        let format = track.format().expect("format");
        assert_eq!(format.pcm_encoding, Some(PcmEncoding::U8));
        assert_eq!(
            format.metadata,
            vec![MetadataEntry::Text {
                key: "artist".to_string(),
                value: "Band".to_string()
            }]
        );
        assert_eq!(track.data, vec![0x80; 10]);
    }

    #[test]
    fn test_rf64_data_size() {
        let mut ds64 = Vec::new();
        ds64.extend_from_slice(&0u64.to_le_bytes());
        ds64.extend_from_slice(&8u64.to_le_bytes());
        ds64.extend_from_slice(&2u64.to_le_bytes());
        let template = build_wav(2, 8000, 16, &[7; 8]);
        // fmt chunk of the template: after RIFF header, 8 + 16 bytes
        let fmt = template[12..36].to_vec();
        let mut data_chunk = b"data".to_vec();
        data_chunk.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        data_chunk.extend_from_slice(&[7; 8]);
        // trailing bytes past the declared data size
        data_chunk.extend_from_slice(&[9; 4]);
        let mut file = b"RF64".to_vec();
        file.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        file.extend_from_slice(b"WAVE");
        file.extend_from_slice(&chunk(b"ds64", &ds64));
        file.extend_from_slice(&fmt);
        file.extend_from_slice(&data_chunk);

        let mut input = BufferedInput::from_bytes(file.clone());
        assert!(WavExtractor::new().sniff(&mut input).unwrap());
        let (_, output) = extract(file);
        let track = output.track_by_id(WAV_TRACK_ID).expect("track");
        assert_eq!(track.data, vec![7; 8]);
    }

    #[test]
    fn test_seek_points_are_block_aligned() {
        let (extractor, _) = extract(build_wav(1, 1000, 16, &[0; 2000]));
        let points = extractor.seek_points(1_500).expect("points");
        assert_eq!(points.first, SeekPoint { time_us: 1000, position: 44 + 2 });
        assert_eq!(points.second, SeekPoint { time_us: 2000, position: 44 + 4 });

        let end = extractor.seek_points(5_000_000).expect("points");
        assert_eq!(end.first, end.second);
        assert_eq!(end.first.position, 44 + 1998);
    }

    #[test]
    fn test_seek_restarts_timestamps() {
        let data = build_wav(1, 1000, 8, &[1; 300]);
        let (mut extractor, _) = extract(data.clone());
        let mut input = BufferedInput::from_bytes(data);
        input.seek_to(44 + 150);
        extractor.seek(44 + 150, 150_000);
        let mut output = CollectingOutput::new();
        let mut seek_position = 0;
        // the track was announced on the first pass
        output.track(WAV_TRACK_ID, TrackType::Audio);
        while extractor
            .read(&mut input, &mut output, &mut seek_position)
            .unwrap()
            != ReadResult::EndOfInput
        {}
        let track = output.track_by_id(WAV_TRACK_ID).expect("track");
        assert_eq!(track.sample_times_us(), vec![150_000, 250_000]);
        assert_eq!(track.data.len(), 150);
    }

    #[test]
    fn test_byte_by_byte_feeding() {
        let data = build_wav(1, 8000, 16, &[3; 4000]);
        let mut input = BufferedInput::new();
        let mut extractor = WavExtractor::new();
        let mut output = CollectingOutput::new();
        let mut seek_position = 0;
        let mut fed = 0;
        loop {
            match extractor.read(&mut input, &mut output, &mut seek_position) {
                Ok(ReadResult::EndOfInput) => break,
                Ok(_) => {}
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
        let track = output.track_by_id(WAV_TRACK_ID).expect("track");
        assert_eq!(track.data.len(), 4000);
        assert_eq!(track.sample_times_us(), vec![0, 100_000, 200_000]);
    }

    #[test]
    fn test_not_wave() {
        let mut input = BufferedInput::from_bytes(b"RIFF\0\0\0\0AVI LIST".to_vec());
        assert!(!WavExtractor::new().sniff(&mut input).unwrap());
    }
}
