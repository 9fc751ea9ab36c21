pub mod buffered_input;
pub mod extractor_input;

pub use buffered_input::BufferedInput;
pub use extractor_input::{peek_vec, read_vec, ExtractorInput};
