use super::r#box::parse_full_box;
use super::stts::{check_entries, check_sample_count};
use crate::errors::{MediaParserError, MediaParserResult};

/// Parse stsz (sample size) box payload
pub fn parse_stsz(payload: &[u8]) -> MediaParserResult<Vec<u32>> {
    let (_, _, mut cursor) = parse_full_box(payload)?;
    let sample_size = cursor.read_u32()?;
    let sample_count = cursor.read_u32()?;

    if sample_size != 0 {
        // All samples have the same size
        check_sample_count("stsz", sample_count)?;
        return Ok(vec![sample_size; sample_count as usize]);
    }
    check_entries("stsz", &cursor, sample_count, 4)?;
    let mut sizes = Vec::with_capacity(sample_count as usize);
    for _ in 0..sample_count {
        sizes.push(cursor.read_u32()?);
    }
    Ok(sizes)
}

/// Parse stz2 (compact sample size) box payload
pub fn parse_stz2(payload: &[u8]) -> MediaParserResult<Vec<u32>> {
    let (_, _, mut cursor) = parse_full_box(payload)?;
    cursor.skip(3)?; // reserved
    let field_size = cursor.read_u8()?;
    let sample_count = cursor.read_u32()?;
    let entry_bytes = match field_size {
        4 => sample_count / 2 + sample_count % 2,
        8 => sample_count,
        16 => sample_count.saturating_mul(2),
        other => {
            return Err(MediaParserError::malformed(format!(
                "stz2 field size {} not supported",
                other
            )))
        }
    };
    check_entries("stz2", &cursor, entry_bytes, 1)?;
    let mut sizes = Vec::with_capacity(sample_count as usize);
    match field_size {
        4 => {
            let mut current = 0u8;
            for i in 0..sample_count {
                if i % 2 == 0 {
                    current = cursor.read_u8()?;
                    sizes.push(u32::from(current >> 4));
                } else {
                    sizes.push(u32::from(current & 0x0F));
                }
            }
        }
        8 => {
            for _ in 0..sample_count {
                sizes.push(u32::from(cursor.read_u8()?));
            }
        }
        _ => {
            for _ in 0..sample_count {
                sizes.push(u32::from(cursor.read_u16()?));
            }
        }
    }
    Ok(sizes)
}
