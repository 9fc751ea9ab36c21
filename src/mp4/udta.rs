use super::r#box::{find_box, fourcc_name, BoxIter, FourCc, ILST, META};
use crate::bits::ByteCursor;
use crate::errors::MediaParserResult;
use crate::metadata::{Id3Frame, MetadataEntry, PictureFrame};
use log::warn;

const DATA: FourCc = *b"data";
const MEAN: FourCc = *b"mean";
const NAME: FourCc = *b"name";
const INTERNAL: FourCc = *b"----";
const COVER: FourCc = *b"covr";

// data atom type indicators
const TYPE_UTF8: u32 = 1;
const TYPE_JPEG: u32 = 13;
const TYPE_PNG: u32 = 14;
const TYPE_SIGNED_INT: u32 = 21;

/// Readable key for a well-known `ilst` item.
fn ilst_key(item: &FourCc) -> Option<&'static str> {
    let key = match item {
        &[0xA9, b'n', b'a', b'm'] => "title",
        &[0xA9, b'A', b'R', b'T'] => "artist",
        &[0xA9, b'a', b'l', b'b'] => "album",
        &[0xA9, b'd', b'a', b'y'] => "date",
        &[0xA9, b'g', b'e', b'n'] => "genre",
        &[0xA9, b'c', b'm', b't'] => "comment",
        &[0xA9, b't', b'o', b'o'] => "encoder",
        &[0xA9, b'w', b'r', b't'] => "composer",
        &[0xA9, b'l', b'y', b'r'] => "lyrics",
        b"aART" => "album_artist",
        b"cprt" => "copyright",
        b"desc" => "description",
        b"trkn" => "track_number",
        b"disk" => "disc_number",
        b"tmpo" => "tempo",
        _ => return None,
    };
    Some(key)
}

/// Metadata entries from a `udta` payload: iTunes-style `meta/ilst` items.
pub fn parse_udta(udta: &[u8]) -> MediaParserResult<Vec<MetadataEntry>> {
    let Some(meta) = find_box(udta, &META) else {
        return Ok(Vec::new());
    };
    let Some(ilst) = find_box(meta_children(meta), &ILST) else {
        return Ok(Vec::new());
    };
    parse_ilst(ilst)
}

/// ISO `meta` is a full box, QuickTime `meta` starts straight with its `hdlr` child.
fn meta_children(meta: &[u8]) -> &[u8] {
    if meta.len() >= 8 && &meta[4..8] == b"hdlr" {
        meta
    } else if meta.len() >= 4 {
        &meta[4..]
    } else {
        meta
    }
}

pub fn parse_ilst(ilst: &[u8]) -> MediaParserResult<Vec<MetadataEntry>> {
    let mut entries = Vec::new();
    for item in BoxIter::new(ilst) {
        let (item_type, payload) = item?;
        let entry = if item_type == INTERNAL {
            parse_internal_item(payload)?
        } else {
            parse_data_item(&item_type, payload)?
        };
        match entry {
            Some(entry) => entries.push(entry),
            None => warn!("ignoring ilst item {}", fourcc_name(&item_type)),
        }
    }
    Ok(entries)
}

/// `(type indicator, value)` of a data atom payload.
fn parse_data_atom(data: &[u8]) -> MediaParserResult<(u32, &[u8])> {
    let mut cursor = ByteCursor::new(data);
    let type_indicator = cursor.read_u32()? & 0x00FF_FFFF;
    cursor.skip(4)?; // locale
    Ok((type_indicator, cursor.remaining()))
}

fn parse_data_item(item_type: &FourCc, payload: &[u8]) -> MediaParserResult<Option<MetadataEntry>> {
    let Some(data) = find_box(payload, &DATA) else {
        return Ok(None);
    };
    let (type_indicator, value) = parse_data_atom(data)?;
    if *item_type == COVER {
        let mime_type = match type_indicator {
            TYPE_JPEG => "image/jpeg",
            TYPE_PNG => "image/png",
            _ => return Ok(None),
        };
        return Ok(Some(MetadataEntry::Picture(PictureFrame {
            picture_type: 3, // front cover
            mime_type: mime_type.to_string(),
            description: String::new(),
            width: 0,
            height: 0,
            depth: 0,
            colors: 0,
            data: value.to_vec(),
        })));
    }

    let key = match ilst_key(item_type) {
        Some(key) => key.to_string(),
        None => fourcc_name(item_type),
    };
    let text = match (item_type, type_indicator) {
        (b"trkn" | b"disk", _) => index_pair(value),
        (_, TYPE_UTF8) => Some(clean_string(value)),
        (_, TYPE_SIGNED_INT) => signed_int(value).map(|v| v.to_string()),
        (_, 0) if item_type == b"tmpo" => signed_int(value).map(|v| v.to_string()),
        _ => None,
    };
    Ok(text.map(|value| MetadataEntry::Text { key, value }))
}

/// `----` item: reverse-DNS `mean`, `name` and a text `data` value.
fn parse_internal_item(payload: &[u8]) -> MediaParserResult<Option<MetadataEntry>> {
    let mut domain = None;
    let mut description = None;
    let mut text = None;
    for child in BoxIter::new(payload) {
        let (child_type, body) = child?;
        match child_type {
            // mean and name are full boxes
            MEAN if body.len() >= 4 => domain = Some(clean_string(&body[4..])),
            NAME if body.len() >= 4 => description = Some(clean_string(&body[4..])),
            DATA => {
                let (type_indicator, value) = parse_data_atom(body)?;
                if type_indicator == TYPE_UTF8 {
                    text = Some(clean_string(value));
                }
            }
            _ => {}
        }
    }
    Ok(match (domain, description, text) {
        (Some(domain), Some(description), Some(text)) => {
            Some(MetadataEntry::Id3(Id3Frame::Internal {
                domain,
                description,
                text,
            }))
        }
        _ => None,
    })
}

fn clean_string(data: &[u8]) -> String {
    String::from_utf8_lossy(data)
        .trim_matches('\0')
        .trim()
        .to_string()
}

fn signed_int(value: &[u8]) -> Option<i64> {
    match value.len() {
        1 => Some(i64::from(value[0] as i8)),
        2 => Some(i64::from(i16::from_be_bytes([value[0], value[1]]))),
        3 => Some(i64::from(
            (i32::from_be_bytes([value[0], value[1], value[2], 0])) >> 8,
        )),
        4 => Some(i64::from(i32::from_be_bytes([
            value[0], value[1], value[2], value[3],
        ]))),
        8 => Some(i64::from_be_bytes([
            value[0], value[1], value[2], value[3], value[4], value[5], value[6], value[7],
        ])),
        _ => None,
    }
}

/// `trkn`/`disk` payload: reserved u16, index u16, count u16.
fn index_pair(value: &[u8]) -> Option<String> {
    let mut cursor = ByteCursor::new(value);
    cursor.skip(2).ok()?;
    let index = cursor.read_u16().ok()?;
    match cursor.read_u16() {
        Ok(count) if count > 0 => Some(format!("{}/{}", index, count)),
        _ => Some(index.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::r#box::{make_box, make_full_box};

    fn data_atom(type_indicator: u32, value: &[u8]) -> Vec<u8> {
        let mut body = type_indicator.to_be_bytes().to_vec();
        body.extend_from_slice(&[0; 4]);
        body.extend_from_slice(value);
        make_box(b"data", &body)
    }

    #[test]
    fn test_parse_udta_text_tags() {
        let ilst = [
            make_box(&[0xA9, b'n', b'a', b'm'], &data_atom(1, b"Title X")),
            make_box(&[0xA9, b'A', b'R', b'T'], &data_atom(1, b"Artista")),
            make_box(b"trkn", &data_atom(0, &[0, 0, 0, 3, 0, 12, 0, 0])),
        ]
        .concat();
        let meta = make_full_box(b"meta", 0, 0, &make_box(b"ilst", &ilst));
        let entries = parse_udta(&meta).unwrap();
        assert_eq!(
            entries,
            vec![
                MetadataEntry::Text {
                    key: "title".to_string(),
                    value: "Title X".to_string()
                },
                MetadataEntry::Text {
                    key: "artist".to_string(),
                    value: "Artista".to_string()
                },
                MetadataEntry::Text {
                    key: "track_number".to_string(),
                    value: "3/12".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_internal_item() {
        let item = [
            make_full_box(b"mean", 0, 0, b"com.apple.iTunes"),
            make_full_box(b"name", 0, 0, b"iTunSMPB"),
            data_atom(1, b" 00000000 00000840"),
        ]
        .concat();
        let ilst = make_box(b"----", &item);
        let entries = parse_ilst(&ilst).unwrap();
        assert_eq!(
            entries,
            vec![MetadataEntry::Id3(Id3Frame::Internal {
                domain: "com.apple.iTunes".to_string(),
                description: "iTunSMPB".to_string(),
                text: "00000000 00000840".to_string(),
            })]
        );
    }

    #[test]
    fn test_quicktime_meta_without_full_box_header() {
        let hdlr = make_full_box(b"hdlr", 0, 0, &[0; 20]);
        let ilst = make_box(
            b"ilst",
            &make_box(b"cprt", &data_atom(1, b"(c) 2020")),
        );
        let meta = make_box(b"meta", &[hdlr, ilst].concat());
        let entries = parse_udta(&meta).unwrap();
        assert_eq!(entries.len(), 1);
    }
}
