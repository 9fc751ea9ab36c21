/*
# Ogg Module

 Page-based demultiplexing of one logical bitstream:

   page (capture pattern, segment table) -> packet reassembly -> codec delegate

 The codec delegate (Vorbis, Opus or FLAC) is picked from the first packet's identification
 magic and owns header parsing and per-packet durations.
*/

pub mod codec;
pub mod extractor;
pub mod flac;
pub mod opus;
pub mod packet;
pub mod page;
pub mod vorbis;

pub use codec::OggCodec;
pub use extractor::OggExtractor;
pub use packet::OggPacket;
pub use page::OggPageHeader;
