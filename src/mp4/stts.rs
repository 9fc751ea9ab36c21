use super::r#box::parse_full_box;
use crate::bits::ByteCursor;
use crate::errors::{MediaParserError, MediaParserResult};

#[derive(Debug, Clone, PartialEq)]
pub struct SttsEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

/// Check that `entry_count` entries of `entry_size` bytes fit in what is left of `cursor`.
pub(crate) fn check_entries(
    name: &str,
    cursor: &ByteCursor,
    entry_count: u32,
    entry_size: usize,
) -> MediaParserResult<()> {
    let required = entry_count as usize * entry_size;
    if required > cursor.bytes_left() {
        return Err(MediaParserError::malformed(format!(
            "{} box too small for {} entries: expected {} bytes, got {}",
            name,
            entry_count,
            required,
            cursor.bytes_left()
        )));
    }
    Ok(())
}

/// Reject sample counts that no real table carries, before anything is allocated for them.
pub(crate) fn check_sample_count(name: &str, sample_count: u32) -> MediaParserResult<()> {
    if sample_count > super::MAX_SAMPLE_COUNT {
        return Err(MediaParserError::malformed(format!(
            "{} declares {} samples, more than the supported {}",
            name,
            sample_count,
            super::MAX_SAMPLE_COUNT
        )));
    }
    Ok(())
}

/// Parse stts (decoding time to sample) box payload
pub fn parse_stts(payload: &[u8]) -> MediaParserResult<Vec<SttsEntry>> {
    let (_, _, mut cursor) = parse_full_box(payload)?;
    let entry_count = cursor.read_u32()?;
    check_entries("stts", &cursor, entry_count, 8)?;

    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        entries.push(SttsEntry {
            sample_count: cursor.read_u32()?,
            sample_delta: cursor.read_u32()?,
        });
    }
    Ok(entries)
}

/// Decode times in media timescale units for the first `sample_count` samples, plus the
/// decode time just past the last of them.
pub fn build_decode_times(entries: &[SttsEntry], sample_count: usize) -> (Vec<i64>, i64) {
    let mut times = Vec::with_capacity(sample_count);
    let mut time = 0i64;
    'outer: for entry in entries {
        for _ in 0..entry.sample_count {
            if times.len() == sample_count {
                break 'outer;
            }
            times.push(time);
            time += i64::from(entry.sample_delta);
        }
    }
    // samples without a timing entry reuse the last known delta
    let last_delta = entries.last().map_or(0, |e| i64::from(e.sample_delta));
    while times.len() < sample_count {
        times.push(time);
        time += last_delta;
    }
    (times, time)
}
