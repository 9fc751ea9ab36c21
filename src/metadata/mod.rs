pub mod id3;
mod types;
pub mod vorbis_comment;

pub use id3::{decode_id3_tag, is_id3_tag};
pub use vorbis_comment::{parse_flac_picture, parse_vorbis_comments, VorbisComments};

pub use types::*;
