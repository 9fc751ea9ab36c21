use super::r#box::parse_full_box;
use super::stts::check_entries;
use crate::errors::MediaParserResult;

#[derive(Debug, Clone, PartialEq)]
pub struct EditListEntry {
    /// In movie timescale units.
    pub segment_duration: u64,
    /// In media timescale units, -1 for an empty edit.
    pub media_time: i64,
}

/// Parse elst (edit list) box payload
pub fn parse_elst(payload: &[u8]) -> MediaParserResult<Vec<EditListEntry>> {
    let (version, _, mut cursor) = parse_full_box(payload)?;
    let entry_count = cursor.read_u32()?;
    check_entries("elst", &cursor, entry_count, if version == 1 { 20 } else { 12 })?;
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let (segment_duration, media_time) = if version == 1 {
            (cursor.read_u64()?, cursor.read_i64()?)
        } else {
            (u64::from(cursor.read_u32()?), i64::from(cursor.read_i32()?))
        };
        cursor.skip(4)?; // media_rate_integer, media_rate_fraction
        entries.push(EditListEntry {
            segment_duration,
            media_time,
        });
    }
    Ok(entries)
}

/// Media time at which presentation starts, for edit lists this reader applies: a single
/// edit, optionally preceded by an empty edit.
pub fn presentation_start(entries: &[EditListEntry]) -> Option<i64> {
    match entries {
        [edit] if edit.media_time >= 0 => Some(edit.media_time),
        [empty, edit] if empty.media_time == -1 && edit.media_time >= 0 => Some(edit.media_time),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::r#box::make_full_box;

    #[test]
    fn test_single_edit() {
        let mut body = 1u32.to_be_bytes().to_vec();
        body.extend_from_slice(&1000u32.to_be_bytes());
        body.extend_from_slice(&1024i32.to_be_bytes());
        body.extend_from_slice(&[0, 1, 0, 0]);
        let elst = make_full_box(b"elst", 0, 0, &body);
        let entries = parse_elst(&elst[8..]).unwrap();
        assert_eq!(presentation_start(&entries), Some(1024));
    }
}
