use super::types::{Id3Frame, PictureFrame};
use crate::bits::ByteCursor;
use crate::errors::{MediaParserError, MediaParserResult};
use log::{debug, warn};

pub const ID3_HEADER_LENGTH: usize = 10;

const ENCODING_ISO_8859_1: u8 = 0;
const ENCODING_UTF16: u8 = 1;
const ENCODING_UTF16BE: u8 = 2;
const ENCODING_UTF8: u8 = 3;

/// Parsed ID3v2 tag header
#[derive(Debug, Clone, Copy, PartialEq)]
struct TagHeader {
    major_version: u8,
    unsynchronized: bool,
    frames_size: usize,
}

/// Whether `data` starts with an ID3v2 tag header.
pub fn is_id3_tag(data: &[u8]) -> bool {
    data.len() >= ID3_HEADER_LENGTH && &data[..3] == b"ID3"
}

/// Decode all frames of the ID3v2.2/2.3/2.4 tag at the start of `data`.
///
/// Unsupported tag features (v2.2 compression) produce no frames rather than an error.
pub fn decode_id3_tag(data: &[u8]) -> MediaParserResult<Vec<Id3Frame>> {
    let mut cursor = ByteCursor::new(data);
    let header = match parse_tag_header(&mut cursor)? {
        Some(header) => header,
        None => return Ok(Vec::new()),
    };
    let frames_size = header.frames_size.min(cursor.bytes_left());
    let raw = cursor.read_bytes(frames_size)?;
    let frame_data = if header.unsynchronized && header.major_version < 4 {
        remove_unsynchronization(raw)
    } else {
        raw.to_vec()
    };

    let mut frames = Vec::new();
    let mut frames_cursor = ByteCursor::new(&frame_data);
    let frame_header_size = if header.major_version == 2 { 6 } else { 10 };
    while frames_cursor.bytes_left() >= frame_header_size {
        match decode_frame(header.major_version, &mut frames_cursor, header.unsynchronized)? {
            Some(frame) => frames.push(frame),
            None if frames_cursor.bytes_left() == 0 => break,
            None => continue,
        }
    }
    Ok(frames)
}

fn parse_tag_header(cursor: &mut ByteCursor) -> MediaParserResult<Option<TagHeader>> {
    if cursor.bytes_left() < ID3_HEADER_LENGTH {
        return Err(MediaParserError::malformed("ID3 tag shorter than its header"));
    }
    if cursor.read_bytes(3)? != b"ID3" {
        return Err(MediaParserError::malformed("missing ID3 identifier"));
    }
    let major_version = cursor.read_u8()?;
    cursor.skip(1)?; // revision
    let flags = cursor.read_u8()?;
    let mut frames_size = cursor.read_synch_safe_int()? as usize;

    match major_version {
        2 => {
            if flags & 0x40 != 0 {
                debug!("skipping compressed ID3v2.2 tag");
                return Ok(None);
            }
        }
        3 => {
            if flags & 0x40 != 0 {
                let extended_size = cursor.read_u32()? as usize;
                cursor.skip(extended_size)?;
                frames_size = frames_size.saturating_sub(extended_size + 4);
            }
        }
        4 => {
            if flags & 0x40 != 0 {
                let extended_size = cursor.read_synch_safe_int()? as usize;
                cursor.skip(extended_size.saturating_sub(4))?;
                frames_size = frames_size.saturating_sub(extended_size);
            }
            if flags & 0x10 != 0 {
                frames_size = frames_size.saturating_sub(10);
            }
        }
        other => {
            warn!("skipping ID3 tag with unsupported major version {}", other);
            return Ok(None);
        }
    }
    Ok(Some(TagHeader {
        major_version,
        unsynchronized: flags & 0x80 != 0,
        frames_size,
    }))
}

/// Undo ID3 unsynchronization: every `FF 00` becomes `FF`.
fn remove_unsynchronization(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        out.push(data[i]);
        if data[i] == 0xFF && data.get(i + 1) == Some(&0x00) {
            i += 1;
        }
        i += 1;
    }
    out
}

fn decode_frame(
    major_version: u8,
    cursor: &mut ByteCursor,
    tag_unsynchronized: bool,
) -> MediaParserResult<Option<Id3Frame>> {
    let (id, frame_size, flags) = if major_version == 2 {
        let id = cursor.read_bytes(3)?.to_vec();
        (id, cursor.read_u24()? as usize, 0u16)
    } else {
        let id = cursor.read_bytes(4)?.to_vec();
        let size = if major_version == 4 {
            cursor.read_synch_safe_int()?
        } else {
            cursor.read_u32()?
        } as usize;
        (id, size, cursor.read_u16()?)
    };

    if id.iter().all(|&b| b == 0) {
        // padding
        cursor.skip(cursor.bytes_left())?;
        return Ok(None);
    }
    if frame_size > cursor.bytes_left() {
        warn!(
            "ID3 frame {} declares {} bytes, only {} left",
            String::from_utf8_lossy(&id),
            frame_size,
            cursor.bytes_left()
        );
        cursor.skip(cursor.bytes_left())?;
        return Ok(None);
    }
    let id = String::from_utf8_lossy(&id).into_owned();
    let mut body = cursor.read_bytes(frame_size)?;

    let (compressed, encrypted, unsynchronized, has_group, has_data_length) = match major_version {
        3 => (
            flags & 0x0080 != 0,
            flags & 0x0040 != 0,
            false,
            flags & 0x0020 != 0,
            false,
        ),
        4 => (
            flags & 0x0008 != 0,
            flags & 0x0004 != 0,
            flags & 0x0002 != 0 || tag_unsynchronized,
            flags & 0x0040 != 0,
            flags & 0x0001 != 0,
        ),
        _ => (false, false, false, false, false),
    };
    if compressed || encrypted {
        debug!("skipping compressed or encrypted ID3 frame {}", id);
        return Ok(Some(Id3Frame::Binary {
            id,
            data: body.to_vec(),
        }));
    }
    if has_group && !body.is_empty() {
        body = &body[1..];
    }
    if has_data_length && body.len() >= 4 {
        body = &body[4..];
    }
    let owned;
    if unsynchronized {
        owned = remove_unsynchronization(body);
        body = &owned;
    }

    let frame = match decode_frame_body(&id, body, major_version) {
        Ok(frame) => frame,
        Err(err) => {
            warn!("failed to decode ID3 frame {}: {}", id, err);
            Id3Frame::Binary {
                id,
                data: body.to_vec(),
            }
        }
    };
    Ok(Some(frame))
}

fn decode_frame_body(id: &str, body: &[u8], major_version: u8) -> MediaParserResult<Id3Frame> {
    match id {
        "TXXX" | "TXX" => {
            let (encoding, rest) = split_encoding(body)?;
            let (description, values) = split_first_string(rest, encoding);
            Ok(Id3Frame::TextInformation {
                id: id.to_string(),
                description: Some(description),
                values: decode_string_list(values, encoding),
            })
        }
        _ if id.starts_with('T') => {
            let (encoding, rest) = split_encoding(body)?;
            Ok(Id3Frame::TextInformation {
                id: id.to_string(),
                description: None,
                values: decode_string_list(rest, encoding),
            })
        }
        "WXXX" | "WXX" => {
            let (encoding, rest) = split_encoding(body)?;
            let (description, url) = split_first_string(rest, encoding);
            Ok(Id3Frame::Url {
                id: id.to_string(),
                description: Some(description),
                url: decode_string(until_delimiter(url, ENCODING_ISO_8859_1), ENCODING_ISO_8859_1),
            })
        }
        _ if id.starts_with('W') => Ok(Id3Frame::Url {
            id: id.to_string(),
            description: None,
            url: decode_string(until_delimiter(body, ENCODING_ISO_8859_1), ENCODING_ISO_8859_1),
        }),
        "COMM" | "COM" => {
            let (encoding, rest) = split_encoding(body)?;
            if rest.len() < 3 {
                return Err(MediaParserError::malformed("comment frame without language"));
            }
            let language = String::from_utf8_lossy(&rest[..3]).into_owned();
            let (description, text) = split_first_string(&rest[3..], encoding);
            Ok(Id3Frame::Comment {
                language,
                description,
                text: decode_string(until_delimiter(text, encoding), encoding),
            })
        }
        "PRIV" => {
            let owner_end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
            Ok(Id3Frame::Private {
                owner: decode_string(&body[..owner_end], ENCODING_ISO_8859_1),
                data: body.get(owner_end + 1..).unwrap_or(&[]).to_vec(),
            })
        }
        "APIC" | "PIC" => decode_picture(body, major_version),
        _ => Ok(Id3Frame::Binary {
            id: id.to_string(),
            data: body.to_vec(),
        }),
    }
}

fn decode_picture(body: &[u8], major_version: u8) -> MediaParserResult<Id3Frame> {
    let (encoding, rest) = split_encoding(body)?;
    let (mime_type, rest) = if major_version == 2 {
        if rest.len() < 3 {
            return Err(MediaParserError::malformed("PIC frame without image format"));
        }
        let format = String::from_utf8_lossy(&rest[..3]).to_ascii_lowercase();
        let mime = if format == "jpg" {
            "image/jpeg".to_string()
        } else {
            format!("image/{}", format)
        };
        (mime, &rest[3..])
    } else {
        let (mime, rest) = split_first_string(rest, ENCODING_ISO_8859_1);
        let mime = if mime.contains('/') {
            mime.to_ascii_lowercase()
        } else {
            format!("image/{}", mime.to_ascii_lowercase())
        };
        (mime, rest)
    };
    let (&picture_type, rest) = rest
        .split_first()
        .ok_or_else(|| MediaParserError::malformed("picture frame without picture type"))?;
    let (description, data) = split_first_string(rest, encoding);
    Ok(Id3Frame::Apic(PictureFrame {
        picture_type: u32::from(picture_type),
        mime_type,
        description,
        width: 0,
        height: 0,
        depth: 0,
        colors: 0,
        data: data.to_vec(),
    }))
}

fn split_encoding(body: &[u8]) -> MediaParserResult<(u8, &[u8])> {
    match body.split_first() {
        Some((&encoding, rest)) if encoding <= ENCODING_UTF8 => Ok((encoding, rest)),
        Some((&encoding, _)) => Err(MediaParserError::malformed(format!(
            "unknown ID3 text encoding {}",
            encoding
        ))),
        None => Err(MediaParserError::malformed("empty ID3 text frame")),
    }
}

fn delimiter_length(encoding: u8) -> usize {
    match encoding {
        ENCODING_UTF16 | ENCODING_UTF16BE => 2,
        _ => 1,
    }
}

/// Index of the string terminator in `data`, or `data.len()`.
fn delimiter_index(data: &[u8], encoding: u8) -> usize {
    if delimiter_length(encoding) == 1 {
        return data.iter().position(|&b| b == 0).unwrap_or(data.len());
    }
    let mut i = 0;
    while i + 1 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            return i;
        }
        i += 2;
    }
    data.len()
}

fn until_delimiter(data: &[u8], encoding: u8) -> &[u8] {
    &data[..delimiter_index(data, encoding)]
}

/// Decode the first terminated string and return it with the bytes after its terminator.
fn split_first_string(data: &[u8], encoding: u8) -> (String, &[u8]) {
    let end = delimiter_index(data, encoding);
    let next = (end + delimiter_length(encoding)).min(data.len());
    (decode_string(&data[..end], encoding), &data[next..])
}

fn decode_string_list(mut data: &[u8], encoding: u8) -> Vec<String> {
    let mut values = Vec::new();
    loop {
        let (value, rest) = split_first_string(data, encoding);
        values.push(value);
        if rest.is_empty() {
            break;
        }
        data = rest;
    }
    values
}

fn decode_string(data: &[u8], encoding: u8) -> String {
    match encoding {
        ENCODING_ISO_8859_1 => data.iter().map(|&b| char::from(b)).collect(),
        ENCODING_UTF8 => String::from_utf8_lossy(data).into_owned(),
        ENCODING_UTF16 => {
            let (big_endian, data) = match data {
                [0xFE, 0xFF, rest @ ..] => (true, rest),
                [0xFF, 0xFE, rest @ ..] => (false, rest),
                _ => (true, data),
            };
            decode_utf16(data, big_endian)
        }
        _ => decode_utf16(data, true),
    }
}

fn decode_utf16(data: &[u8], big_endian: bool) -> String {
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    String::from_utf16_lossy(&units)
}
