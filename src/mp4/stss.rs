use super::r#box::parse_full_box;
use super::stts::check_entries;
use crate::errors::MediaParserResult;

/// Parse stss (sync samples) box payload into 1-based sample numbers
pub fn parse_stss(payload: &[u8]) -> MediaParserResult<Vec<u32>> {
    let (_, _, mut cursor) = parse_full_box(payload)?;
    let entry_count = cursor.read_u32()?;
    check_entries("stss", &cursor, entry_count, 4)?;
    let mut sync_samples = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        sync_samples.push(cursor.read_u32()?);
    }
    Ok(sync_samples)
}
