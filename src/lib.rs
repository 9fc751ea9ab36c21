pub mod bits;
pub use bits::reader::{mask, BitReader};
pub use bits::ByteCursor;

pub mod errors;
pub use errors::{ContractError, MalformedError, MediaParserError, MediaParserResult};

pub mod streams;
pub use streams::{BufferedInput, ExtractorInput};

pub mod extractor;
pub use extractor::{
    extract_to_end, CollectingOutput, ContainerKind, ContainerReader, Extractor,
    ExtractorFactory, ExtractorOutput, ExtractorState, Format, MediaExtractor, ReadResult,
    SampleFlags, SampleMetadata, SeekMap, SeekPoint, SeekPoints, Track, TrackType,
};

pub mod sample_table;
pub use sample_table::{SampleTable, SampleTableBuilder};

pub mod timestamp_adjuster;
pub use timestamp_adjuster::TimestampAdjuster;

pub mod metadata;
pub use metadata::{Metadata, MetadataEntry};

pub mod scte35;
pub use scte35::{MetadataInputBuffer, SpliceInfoDecoder};

pub mod mp4;
pub use mp4::{FragmentedMp4Extractor, Mp4Extractor};

pub mod ogg;
pub use ogg::OggExtractor;

pub mod wav;
pub use wav::WavExtractor;
