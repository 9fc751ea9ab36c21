use super::r#box::parse_full_box;
use super::stts::check_entries;
use crate::errors::MediaParserResult;

/// Parse stco (32-bit) or co64 (64-bit) chunk offset box payload
pub fn parse_chunk_offsets(payload: &[u8], is_co64: bool) -> MediaParserResult<Vec<u64>> {
    let (_, _, mut cursor) = parse_full_box(payload)?;
    let entry_count = cursor.read_u32()?;
    let name = if is_co64 { "co64" } else { "stco" };
    check_entries(name, &cursor, entry_count, if is_co64 { 8 } else { 4 })?;

    let mut offsets = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        offsets.push(if is_co64 {
            cursor.read_u64()?
        } else {
            u64::from(cursor.read_u32()?)
        });
    }
    Ok(offsets)
}
