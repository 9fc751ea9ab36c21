/*
# Extractor Module

 The façade every container reader is driven through:

   sniff -> init -> read (repeatedly) -> seek -> release

 `MediaExtractor` owns the sink and enforces the call order. Container selection is an ordered
 candidate list in `ExtractorFactory`; the chosen reader is held as a `ContainerReader` variant.
*/

pub mod collecting_output;
pub mod format;
pub mod output;

pub use collecting_output::{CollectedSample, CollectedTrack, CollectingOutput};
pub use format::{Format, PcmEncoding, Track, TrackType};
pub use output::{
    ExtractorOutput, SampleFlags, SampleMetadata, SeekMap, SeekPoint, SeekPoints,
    TrackOutputHandle,
};

use crate::errors::{MediaParserError, MediaParserResult};
use crate::mp4::{FragmentedMp4Extractor, Mp4Extractor};
use crate::ogg::OggExtractor;
use crate::streams::{BufferedInput, ExtractorInput};
use crate::wav::WavExtractor;
use log::{debug, trace};
use serde::Serialize;

/// Outcome of one `read` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadResult {
    /// Progress was made; call again.
    Continue,
    /// The stream is complete.
    EndOfInput,
    /// Reposition the source to the written seek position, then call again.
    Seek,
}

/// A container reader.
///
/// `read` never blocks: when the source lacks bytes it fails with
/// `MediaParserError::InsufficientData` and leaves the reader able to retry the same step.
pub trait Extractor {
    /// Peek the start of `input` and report whether this reader understands it.
    fn sniff(&mut self, input: &mut dyn ExtractorInput) -> MediaParserResult<bool>;

    fn read(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
        seek_position: &mut u64,
    ) -> MediaParserResult<ReadResult>;

    /// The source was moved to `position`, which corresponds to `time_us`.
    fn seek(&mut self, position: u64, time_us: i64);

    /// Where to move the source to play from `time_us`, once the reader can tell.
    fn seek_points(&self, time_us: i64) -> Option<SeekPoints>;

    /// Drop scratch buffers. Safe to call repeatedly.
    fn release(&mut self);
}

/// Container families the factory can select
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContainerKind {
    FragmentedMp4,
    Mp4,
    Ogg,
    Wav,
}

impl ContainerKind {
    pub fn create(self) -> ContainerReader {
        match self {
            ContainerKind::FragmentedMp4 => {
                ContainerReader::FragmentedMp4(FragmentedMp4Extractor::new())
            }
            ContainerKind::Mp4 => ContainerReader::Mp4(Mp4Extractor::new()),
            ContainerKind::Ogg => ContainerReader::Ogg(OggExtractor::new()),
            ContainerKind::Wav => ContainerReader::Wav(WavExtractor::new()),
        }
    }
}

/// The reader selected for a source
#[derive(Debug)]
pub enum ContainerReader {
    FragmentedMp4(FragmentedMp4Extractor),
    Mp4(Mp4Extractor),
    Ogg(OggExtractor),
    Wav(WavExtractor),
}

macro_rules! with_reader {
    ($reader:expr, $r:ident => $body:expr) => {
        match $reader {
            ContainerReader::FragmentedMp4($r) => $body,
            ContainerReader::Mp4($r) => $body,
            ContainerReader::Ogg($r) => $body,
            ContainerReader::Wav($r) => $body,
        }
    };
}

impl ContainerReader {
    pub fn kind(&self) -> ContainerKind {
        match self {
            ContainerReader::FragmentedMp4(_) => ContainerKind::FragmentedMp4,
            ContainerReader::Mp4(_) => ContainerKind::Mp4,
            ContainerReader::Ogg(_) => ContainerKind::Ogg,
            ContainerReader::Wav(_) => ContainerKind::Wav,
        }
    }
}

impl Extractor for ContainerReader {
    fn sniff(&mut self, input: &mut dyn ExtractorInput) -> MediaParserResult<bool> {
        with_reader!(self, r => r.sniff(input))
    }

    fn read(
        &mut self,
        input: &mut dyn ExtractorInput,
        output: &mut dyn ExtractorOutput,
        seek_position: &mut u64,
    ) -> MediaParserResult<ReadResult> {
        with_reader!(self, r => r.read(input, output, seek_position))
    }

    fn seek(&mut self, position: u64, time_us: i64) {
        with_reader!(self, r => r.seek(position, time_us))
    }

    fn seek_points(&self, time_us: i64) -> Option<SeekPoints> {
        with_reader!(self, r => r.seek_points(time_us))
    }

    fn release(&mut self) {
        with_reader!(self, r => r.release())
    }
}

/// Ordered list of candidate readers tried by sniffing
#[derive(Debug, Clone)]
pub struct ExtractorFactory {
    candidates: Vec<ContainerKind>,
}

impl Default for ExtractorFactory {
    fn default() -> Self {
        Self {
            candidates: vec![
                ContainerKind::FragmentedMp4,
                ContainerKind::Mp4,
                ContainerKind::Ogg,
                ContainerKind::Wav,
            ],
        }
    }
}

impl ExtractorFactory {
    pub fn new(candidates: Vec<ContainerKind>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[ContainerKind] {
        &self.candidates
    }

    /// Try each candidate in order and return the first reader whose sniff accepts `input`.
    ///
    /// A candidate that rejects the data, finds it malformed, or runs off the end of a short
    /// source falls through to the next one. Running out of buffered bytes is propagated so
    /// the caller can retry with more data.
    pub fn sniff(&self, input: &mut dyn ExtractorInput) -> MediaParserResult<Option<ContainerReader>> {
        for kind in &self.candidates {
            input.reset_peek_position();
            let mut reader = kind.create();
            let result = reader.sniff(input);
            input.reset_peek_position();
            match result {
                Ok(true) => {
                    debug!("sniffed {:?}", kind);
                    return Ok(Some(reader));
                }
                Ok(false) => trace!("{:?} rejected the input", kind),
                Err(MediaParserError::Malformed(err)) => {
                    trace!("{:?} rejected malformed input: {}", kind, err)
                }
                Err(MediaParserError::EndOfInput) => {
                    trace!("{:?} ran past the end of input", kind)
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }
}

/// Lifecycle state of a `MediaExtractor`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExtractorState {
    Uninitialized,
    Sniffed,
    Initialized,
    Reading,
    Seeking,
    Released,
}

/// Drives one container reader through its lifecycle and owns the sink it emits into
#[derive(Debug)]
pub struct MediaExtractor<O: ExtractorOutput> {
    factory: ExtractorFactory,
    reader: Option<ContainerReader>,
    output: Option<O>,
    state: ExtractorState,
}

impl<O: ExtractorOutput> Default for MediaExtractor<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: ExtractorOutput> MediaExtractor<O> {
    /// Extractor sniffing the default candidate list.
    pub fn new() -> Self {
        Self::with_factory(ExtractorFactory::default())
    }

    pub fn with_factory(factory: ExtractorFactory) -> Self {
        Self {
            factory,
            reader: None,
            output: None,
            state: ExtractorState::Uninitialized,
        }
    }

    /// Extractor bound to one reader. `sniff` only consults that reader.
    pub fn with_reader(reader: ContainerReader) -> Self {
        Self {
            factory: ExtractorFactory::new(vec![reader.kind()]),
            reader: Some(reader),
            output: None,
            state: ExtractorState::Uninitialized,
        }
    }

    pub fn state(&self) -> ExtractorState {
        self.state
    }

    /// Kind of the selected reader, once one is selected.
    pub fn container_kind(&self) -> Option<ContainerKind> {
        self.reader.as_ref().map(ContainerReader::kind)
    }

    pub fn output(&self) -> Option<&O> {
        self.output.as_ref()
    }

    pub fn output_mut(&mut self) -> Option<&mut O> {
        self.output.as_mut()
    }

    pub fn into_output(self) -> Option<O> {
        self.output
    }

    fn expect_state(&self, allowed: &[ExtractorState], call: &str) -> MediaParserResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(MediaParserError::contract(format!(
                "{} called in state {:?}",
                call, self.state
            )))
        }
    }

    /// Select a reader for `input`. The peek position of `input` is reset afterwards.
    pub fn sniff(&mut self, input: &mut dyn ExtractorInput) -> MediaParserResult<bool> {
        self.expect_state(&[ExtractorState::Uninitialized], "sniff")?;
        let found = match self.reader.as_mut() {
            Some(reader) => {
                input.reset_peek_position();
                let result = reader.sniff(input);
                input.reset_peek_position();
                result?
            }
            None => match self.factory.sniff(input)? {
                Some(reader) => {
                    self.reader = Some(reader);
                    true
                }
                None => false,
            },
        };
        if found {
            self.state = ExtractorState::Sniffed;
        }
        Ok(found)
    }

    /// Bind the sink. Must be called exactly once, after a successful `sniff`.
    pub fn init(&mut self, output: O) -> MediaParserResult<()> {
        self.expect_state(&[ExtractorState::Sniffed], "init")?;
        self.output = Some(output);
        self.state = ExtractorState::Initialized;
        Ok(())
    }

    /// Consume buffered input and emit what it yields.
    ///
    /// On `ReadResult::Seek` the caller must move `input` to `*seek_position` before calling
    /// again.
    pub fn read(
        &mut self,
        input: &mut dyn ExtractorInput,
        seek_position: &mut u64,
    ) -> MediaParserResult<ReadResult> {
        self.expect_state(
            &[
                ExtractorState::Initialized,
                ExtractorState::Reading,
                ExtractorState::Seeking,
            ],
            "read",
        )?;
        let (Some(reader), Some(output)) = (self.reader.as_mut(), self.output.as_mut()) else {
            return Err(MediaParserError::contract("read without a reader and sink"));
        };
        self.state = ExtractorState::Reading;
        input.reset_peek_position();
        reader.read(input, output, seek_position)
    }

    /// Tell the reader the source now sits at `position`, the byte offset for `time_us`.
    pub fn seek(&mut self, position: u64, time_us: i64) -> MediaParserResult<()> {
        self.expect_state(
            &[
                ExtractorState::Initialized,
                ExtractorState::Reading,
                ExtractorState::Seeking,
            ],
            "seek",
        )?;
        if let Some(reader) = self.reader.as_mut() {
            reader.seek(position, time_us);
        }
        self.state = ExtractorState::Seeking;
        Ok(())
    }

    pub fn seek_points(&self, time_us: i64) -> Option<SeekPoints> {
        match self.state {
            ExtractorState::Released | ExtractorState::Uninitialized => None,
            _ => self.reader.as_ref()?.seek_points(time_us),
        }
    }

    /// Release the reader's scratch state. Idempotent and valid in every state.
    pub fn release(&mut self) {
        if let Some(reader) = self.reader.as_mut() {
            reader.release();
        }
        self.state = ExtractorState::Released;
    }
}

/// Drive `extractor` over a complete in-memory source until end of input, following seeks.
pub fn extract_to_end<O: ExtractorOutput>(
    extractor: &mut MediaExtractor<O>,
    input: &mut BufferedInput,
) -> MediaParserResult<()> {
    let mut seek_position = 0u64;
    loop {
        match extractor.read(input, &mut seek_position)? {
            ReadResult::Continue => {}
            ReadResult::EndOfInput => return Ok(()),
            ReadResult::Seek => {
                trace!("reader requested seek to {}", seek_position);
                input.seek_to(seek_position);
            }
        }
    }
}
