use super::r#box::parse_full_box;
use super::stts::check_entries;
use crate::errors::{MediaParserError, MediaParserResult};

#[derive(Debug, Clone, PartialEq)]
pub struct SampleToChunkEntry {
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    pub sample_description_index: u32,
}

/// Parse stsc (sample to chunk) box payload
pub fn parse_stsc(payload: &[u8]) -> MediaParserResult<Vec<SampleToChunkEntry>> {
    let (_, _, mut cursor) = parse_full_box(payload)?;
    let entry_count = cursor.read_u32()?;
    check_entries("stsc", &cursor, entry_count, 12)?;

    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        entries.push(SampleToChunkEntry {
            first_chunk: cursor.read_u32()?,
            samples_per_chunk: cursor.read_u32()?,
            sample_description_index: cursor.read_u32()?,
        });
    }
    if entries.first().map_or(false, |e| e.first_chunk != 1) {
        return Err(MediaParserError::malformed(
            "stsc first entry does not start at chunk 1",
        ));
    }
    Ok(entries)
}

/// Number of samples in each of `chunk_count` chunks.
pub fn samples_per_chunk(entries: &[SampleToChunkEntry], chunk_count: usize) -> Vec<u32> {
    let mut counts = Vec::with_capacity(chunk_count);
    for (i, entry) in entries.iter().enumerate() {
        let next_first = entries
            .get(i + 1)
            .map_or(chunk_count as u64 + 1, |e| u64::from(e.first_chunk));
        let mut chunk = u64::from(entry.first_chunk);
        while chunk < next_first && counts.len() < chunk_count {
            counts.push(entry.samples_per_chunk);
            chunk += 1;
        }
    }
    counts.resize(chunk_count, 0);
    counts
}
