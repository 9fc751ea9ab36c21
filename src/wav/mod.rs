/*
# WAV Module

 RIFF and RF64 WAVE files: chunk walking up to the `data` chunk, then passthrough of the
 interleaved sample frames.
*/

pub mod extractor;
pub mod header;

pub use extractor::{WavExtractor, WAV_TRACK_ID};
pub use header::{sniff_wav, WavFormat};
