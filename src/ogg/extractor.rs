use super::codec::{OggCodec, MAX_PREFIX_LENGTH};
use super::packet::OggPacket;
use super::page::{skip_to_next_page, OggPageHeader, MAX_PAGE_SIZE, NO_GRANULE};
use crate::errors::{MediaParserError, MediaParserResult};
use crate::extractor::format::TrackType;
use crate::extractor::output::{
    ExtractorOutput, SampleFlags, SampleMetadata, SeekMap, SeekPoint, SeekPoints,
    TrackOutputHandle,
};
use crate::extractor::{Extractor, ReadResult};
use crate::streams::ExtractorInput;
use log::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadingHeaders,
    ReadingLastPage,
    ReadingPayload,
}

/// Reader for a single logical Ogg bitstream carrying Vorbis, Opus or FLAC.
///
/// The codec is chosen from the first packet. Header packets are handed to the codec until it
/// reports the last one; every later packet is one sample. When the input length is known the
/// reader jumps to the final page for the closing granule position, then back to the first
/// audio page, so the duration is announced before any audio is read.
#[derive(Debug)]
pub struct OggExtractor {
    state: State,
    packet: OggPacket,
    codec: Option<OggCodec>,
    track_id: u32,
    output: Option<TrackOutputHandle>,
    seek_map_emitted: bool,
    /// Position of the first page after the headers.
    audio_start: Option<u64>,
    input_length: Option<u64>,
    last_granule: Option<i64>,
    total_granules: Option<u64>,
    /// Granule position at the start of the next packet. `None` while resyncing after a seek.
    current_granule: Option<u64>,
    /// Packets read while resyncing, timed once a page with a granule position ends.
    resync_packets: Vec<(Vec<u8>, u64)>,
    target_granule: u64,
}

impl Default for OggExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl OggExtractor {
    pub fn new() -> Self {
        Self {
            state: State::ReadingHeaders,
            packet: OggPacket::new(),
            codec: None,
            track_id: 0,
            output: None,
            seek_map_emitted: false,
            audio_start: None,
            input_length: None,
            last_granule: None,
            total_granules: None,
            current_granule: Some(0),
            resync_packets: Vec::new(),
            target_granule: 0,
        }
    }

    pub fn codec(&self) -> Option<&OggCodec> {
        self.codec.as_ref()
    }

    /// Track id used for the bitstream: its serial number.
    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    pub fn duration_us(&self) -> Option<i64> {
        Some(self.granule_to_us(self.total_granules?))
    }

    fn granule_rate(&self) -> u32 {
        self.codec.as_ref().map_or(0, |c| c.granule_rate())
    }

    fn granule_to_us(&self, granule: u64) -> i64 {
        let rate = self.granule_rate();
        if rate == 0 {
            return 0;
        }
        (u128::from(granule) * 1_000_000 / u128::from(rate)) as i64
    }

    fn us_to_granule(&self, time_us: i64) -> u64 {
        (u128::from(time_us.max(0) as u64) * u128::from(self.granule_rate()) / 1_000_000) as u64
    }

    fn read_header_packet(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
        seek_position: &mut u64,
    ) -> MediaParserResult<Option<ReadResult>> {
        if !self.packet.populate(input)? {
            return Err(MediaParserError::malformed(
                "Ogg stream ended before the codec headers",
            ));
        }
        if self.codec.is_none() {
            let codec = OggCodec::detect(self.packet.data())
                .ok_or_else(|| MediaParserError::malformed("unsupported Ogg codec"))?;
            self.track_id = self.packet.page_header().stream_serial_number;
            debug!("ogg bitstream {:#x} carries {}", self.track_id, codec.name());
            self.codec = Some(codec);
        }
        let Some(codec) = self.codec.as_mut() else {
            return Err(MediaParserError::malformed("unsupported Ogg codec"));
        };
        if !codec.read_header(self.packet.data())? {
            return Ok(None);
        }
        self.finish_headers(input, output, seek_position)
    }

    fn finish_headers(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
        seek_position: &mut u64,
    ) -> MediaParserResult<Option<ReadResult>> {
        let Some(codec) = self.codec.as_mut() else {
            return Err(MediaParserError::malformed("Ogg headers without a codec"));
        };
        if self.output.is_none() {
            let format = codec.format()?;
            let handle = output.track(self.track_id, TrackType::Audio);
            output.format(handle, format);
            output.end_tracks();
            self.output = Some(handle);
        }
        codec.reset();
        let audio_start = input.position();
        self.audio_start = Some(audio_start);
        self.current_granule = Some(0);
        self.state = State::ReadingPayload;
        if self.seek_map_emitted {
            return Ok(None);
        }

        match input.length() {
            Some(length) if self.packet.at_page_boundary() => {
                self.input_length = Some(length);
                self.last_granule = None;
                self.state = State::ReadingLastPage;
                *seek_position = length
                    .saturating_sub(MAX_PAGE_SIZE as u64)
                    .max(audio_start);
                trace!("looking for the last ogg page from {}", seek_position);
                Ok(Some(ReadResult::Seek))
            }
            _ => {
                output.seek_map(SeekMap::unseekable(None));
                self.seek_map_emitted = true;
                Ok(None)
            }
        }
    }

    /// Walk the pages up to the end of input, keeping the last granule position seen.
    fn read_last_page(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
        seek_position: &mut u64,
    ) -> MediaParserResult<ReadResult> {
        while skip_to_next_page(input, None)? {
            let Some(header) = OggPageHeader::populate(input, true)? else {
                input.skip_fully(1, true)?;
                continue;
            };
            match input.skip_fully(header.page_size(), true) {
                Ok(true) => {}
                Ok(false) | Err(MediaParserError::EndOfInput) => break,
                Err(err) => return Err(err),
            }
            if header.granule_position != NO_GRANULE {
                self.last_granule = Some(header.granule_position);
            }
        }

        self.total_granules = self.last_granule.filter(|g| *g >= 0).map(|g| g as u64);
        let duration_us = self.duration_us();
        debug!("ogg duration {:?} us", duration_us);
        output.seek_map(SeekMap {
            duration_us,
            seekable: duration_us.is_some(),
        });
        self.seek_map_emitted = true;
        self.state = State::ReadingPayload;
        *seek_position = self.audio_start.unwrap_or(0);
        Ok(ReadResult::Seek)
    }

    fn read_payload(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
    ) -> MediaParserResult<ReadResult> {
        if !self.packet.populate(input)? {
            return Ok(ReadResult::EndOfInput);
        }
        let (Some(codec), Some(handle)) = (self.codec.as_mut(), self.output) else {
            return Err(MediaParserError::malformed("Ogg payload before the codec headers"));
        };
        let data = self.packet.data();
        let granules = codec.packet_granules(data);

        let Some(granule) = self.current_granule else {
            self.resync_packets.push((data.to_vec(), granules));
            let page_granule = self.packet.page_header().granule_position;
            if self.packet.ended_page() && page_granule >= 0 {
                trace!("resynced on ogg granule {}", page_granule);
                let buffered: u64 = self.resync_packets.iter().map(|(_, g)| g).sum();
                let mut granule = (page_granule as u64).saturating_sub(buffered);
                for (data, granules) in std::mem::take(&mut self.resync_packets) {
                    self.output_packet(output, handle, &data, granule, granules);
                    granule += granules;
                }
                self.current_granule = Some(granule);
            }
            return Ok(ReadResult::Continue);
        };
        self.current_granule = Some(granule + granules);
        self.output_packet(output, handle, data, granule, granules);
        Ok(ReadResult::Continue)
    }

    /// Emit one packet as a sample unless it ends before the seek target.
    fn output_packet(
        &self,
        output: &mut dyn ExtractorOutput,
        handle: TrackOutputHandle,
        data: &[u8],
        granule: u64,
        granules: u64,
    ) {
        let before_target =
            granule < self.target_granule && granule + granules <= self.target_granule;
        if data.is_empty() || before_target {
            return;
        }
        output.sample_data(handle, data);
        output.sample_metadata(
            handle,
            SampleMetadata::new(self.granule_to_us(granule), SampleFlags::KEYFRAME, data.len()),
        );
    }
}

impl Extractor for OggExtractor {
    fn sniff(&mut self, input: &mut dyn ExtractorInput) -> MediaParserResult<bool> {
        let Some(header) = OggPageHeader::populate(input, true)? else {
            return Ok(false);
        };
        if !header.is_beginning_of_stream() {
            return Ok(false);
        }
        let mut prefix = vec![0u8; header.body_size.min(MAX_PREFIX_LENGTH)];
        match input.peek_fully(&mut prefix, true) {
            Ok(true) => {}
            Ok(false) | Err(MediaParserError::EndOfInput) => return Ok(false),
            Err(err) => return Err(err),
        }
        Ok(OggCodec::detect(&prefix).is_some())
    }

    fn read(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
        seek_position: &mut u64,
    ) -> MediaParserResult<ReadResult> {
        match self.state {
            State::ReadingHeaders => {
                match self.read_header_packet(input, output, seek_position)? {
                    Some(result) => Ok(result),
                    None => Ok(ReadResult::Continue),
                }
            }
            State::ReadingLastPage => self.read_last_page(input, output, seek_position),
            State::ReadingPayload => self.read_payload(input, output),
        }
    }

    fn seek(&mut self, position: u64, time_us: i64) {
        self.packet.reset();
        self.resync_packets.clear();
        if let Some(codec) = self.codec.as_mut() {
            codec.reset();
        }
        self.target_granule = self.us_to_granule(time_us);
        match self.audio_start {
            Some(audio_start) if position == audio_start => {
                self.state = State::ReadingPayload;
                self.current_granule = Some(0);
            }
            Some(_) if position != 0 => {
                self.state = State::ReadingPayload;
                self.current_granule = None;
            }
            _ => {
                self.state = State::ReadingHeaders;
                self.current_granule = Some(0);
            }
        }
    }

    fn seek_points(&self, time_us: i64) -> Option<SeekPoints> {
        let audio_start = self.audio_start?;
        let (Some(total), Some(length)) = (self.total_granules, self.input_length) else {
            return Some(SeekPoints::single(SeekPoint::START));
        };
        if time_us <= 0 || total == 0 {
            return Some(SeekPoints::single(SeekPoint {
                time_us: 0,
                position: audio_start,
            }));
        }
        let granule = self.us_to_granule(time_us).min(total);
        let span = u128::from(length.saturating_sub(audio_start));
        let position = audio_start + (span * u128::from(granule) / u128::from(total)) as u64;
        Some(SeekPoints::single(SeekPoint {
            time_us: self.granule_to_us(granule),
            position,
        }))
    }

    fn release(&mut self) {
        self.packet = OggPacket::new();
        self.resync_packets = Vec::new();
    }
}
