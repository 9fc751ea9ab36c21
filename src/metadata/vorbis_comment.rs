use super::types::{MetadataEntry, PictureFrame};
use crate::bits::ByteCursor;
use crate::errors::{MediaParserError, MediaParserResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::warn;

const METADATA_BLOCK_PICTURE: &str = "METADATA_BLOCK_PICTURE";

/// Vendor string and comments of one comment block
#[derive(Debug, Clone, PartialEq)]
pub struct VorbisComments {
    pub vendor: String,
    pub entries: Vec<MetadataEntry>,
}

/// Parse a Vorbis comment block (little-endian lengths) as used by Vorbis, Opus and FLAC.
///
/// `data` starts at the vendor length, after any codec-specific packet header.
pub fn parse_vorbis_comments(data: &[u8]) -> MediaParserResult<VorbisComments> {
    let mut cursor = ByteCursor::new(data);
    let vendor_length = cursor.read_u32_le()? as usize;
    let vendor = cursor.read_string(vendor_length)?;
    let count = cursor.read_u32_le()?;
    let mut entries = Vec::new();
    for _ in 0..count {
        let length = cursor.read_u32_le()? as usize;
        let comment = cursor.read_string(length)?;
        match comment.split_once('=') {
            Some((key, value)) if key.eq_ignore_ascii_case(METADATA_BLOCK_PICTURE) => {
                match decode_picture_comment(value) {
                    Ok(picture) => entries.push(MetadataEntry::Picture(picture)),
                    Err(err) => warn!("ignoring undecodable picture comment: {}", err),
                }
            }
            Some((key, value)) => entries.push(MetadataEntry::VorbisComment {
                key: key.to_string(),
                value: value.to_string(),
            }),
            None => warn!("ignoring vorbis comment without separator: {:?}", comment),
        }
    }
    Ok(VorbisComments { vendor, entries })
}

fn decode_picture_comment(value: &str) -> MediaParserResult<PictureFrame> {
    let bytes = STANDARD
        .decode(value.trim())
        .map_err(|e| MediaParserError::malformed(format!("invalid base64 picture: {}", e)))?;
    parse_flac_picture(&bytes)
}

/// Parse a FLAC `PICTURE` metadata block body (big-endian).
pub fn parse_flac_picture(data: &[u8]) -> MediaParserResult<PictureFrame> {
    let mut cursor = ByteCursor::new(data);
    let picture_type = cursor.read_u32()?;
    let mime_length = cursor.read_u32()? as usize;
    let mime_type = cursor.read_string(mime_length)?;
    let description_length = cursor.read_u32()? as usize;
    let description = cursor.read_string(description_length)?;
    let width = cursor.read_u32()?;
    let height = cursor.read_u32()?;
    let depth = cursor.read_u32()?;
    let colors = cursor.read_u32()?;
    let data_length = cursor.read_u32()? as usize;
    let data = cursor.read_bytes(data_length)?.to_vec();
    Ok(PictureFrame {
        picture_type,
        mime_type,
        description,
        width,
        height,
        depth,
        colors,
        data,
    })
}
