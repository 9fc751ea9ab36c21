use super::r#box::parse_full_box;
use super::stts::check_entries;
use crate::errors::MediaParserResult;

#[derive(Debug, Clone, PartialEq)]
pub struct CttsEntry {
    pub sample_count: u32,
    /// Composition minus decode time. Read as signed for both box versions.
    pub sample_offset: i32,
}

/// Parse ctts (composition time to sample) box payload
pub fn parse_ctts(payload: &[u8]) -> MediaParserResult<Vec<CttsEntry>> {
    let (_, _, mut cursor) = parse_full_box(payload)?;
    let entry_count = cursor.read_u32()?;
    check_entries("ctts", &cursor, entry_count, 8)?;
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        entries.push(CttsEntry {
            sample_count: cursor.read_u32()?,
            sample_offset: cursor.read_i32()?,
        });
    }
    Ok(entries)
}

/// Per-sample composition offsets for `sample_count` samples. Missing entries are 0.
pub fn expand_composition_offsets(entries: &[CttsEntry], sample_count: usize) -> Vec<i64> {
    let mut offsets: Vec<i64> = entries
        .iter()
        .flat_map(|e| std::iter::repeat(i64::from(e.sample_offset)).take(e.sample_count as usize))
        .take(sample_count)
        .collect();
    offsets.resize(sample_count, 0);
    offsets
}
