use super::r#box::parse_full_box;
use crate::errors::MediaParserResult;

/// Movie header values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovieHeader {
    pub timescale: u32,
    pub duration: u64,
}

/// Parse mvhd box payload
pub fn parse_mvhd(payload: &[u8]) -> MediaParserResult<MovieHeader> {
    let (version, _, mut cursor) = parse_full_box(payload)?;
    if version == 1 {
        cursor.skip(16)?;
        Ok(MovieHeader {
            timescale: cursor.read_u32()?,
            duration: cursor.read_u64()?,
        })
    } else {
        cursor.skip(8)?;
        Ok(MovieHeader {
            timescale: cursor.read_u32()?,
            duration: u64::from(cursor.read_u32()?),
        })
    }
}

impl MovieHeader {
    /// Duration in microseconds, `None` when unknown.
    pub fn duration_us(&self) -> Option<i64> {
        if self.timescale == 0
            || self.duration == u64::from(u32::MAX)
            || self.duration == u64::MAX
        {
            return None;
        }
        Some(super::scale_to_us(self.duration as i64, self.timescale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::r#box::make_full_box;

    #[test]
    fn test_duration_us() {
        let mut body = vec![0u8; 8];
        body.extend_from_slice(&600u32.to_be_bytes());
        body.extend_from_slice(&1200u32.to_be_bytes());
        body.extend_from_slice(&[0u8; 80]);
        let mvhd = make_full_box(b"mvhd", 0, 0, &body);
        assert_eq!(parse_mvhd(&mvhd[8..]).unwrap().duration_us(), Some(2_000_000));
    }
}
