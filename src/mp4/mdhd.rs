use super::r#box::parse_full_box;
use crate::errors::{MediaParserError, MediaParserResult};

/// Media header values of one track
#[derive(Debug, Clone, PartialEq)]
pub struct MediaHeader {
    pub timescale: u32,
    pub duration: u64,
    /// ISO 639-2/T code, `None` for undetermined.
    pub language: Option<String>,
}

/// Parse mdhd box payload
pub fn parse_mdhd(payload: &[u8]) -> MediaParserResult<MediaHeader> {
    let (version, _, mut cursor) = parse_full_box(payload)?;
    let (timescale, duration) = if version == 1 {
        // creation and modification times
        cursor.skip(16)?;
        (cursor.read_u32()?, cursor.read_u64()?)
    } else {
        cursor.skip(8)?;
        (cursor.read_u32()?, u64::from(cursor.read_u32()?))
    };
    if timescale == 0 {
        return Err(MediaParserError::malformed("mdhd timescale is 0"));
    }
    let language = decode_language(cursor.read_u16()?);
    Ok(MediaHeader {
        timescale,
        duration,
        language,
    })
}

/// Decode a packed ISO 639-2/T code: a pad bit then three 5-bit letters offset by 0x60.
fn decode_language(code: u16) -> Option<String> {
    if code == 0 {
        return None;
    }
    let letters: String = [(code >> 10) & 0x1F, (code >> 5) & 0x1F, code & 0x1F]
        .iter()
        .map(|&c| char::from(c as u8 + 0x60))
        .collect();
    if letters.chars().all(|c| c.is_ascii_lowercase()) && letters != "und" {
        Some(letters)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::r#box::make_full_box;

    #[test]
    fn test_parse_v0_with_language() {
        let mut body = vec![0u8; 8];
        body.extend_from_slice(&1000u32.to_be_bytes());
        body.extend_from_slice(&5000u32.to_be_bytes());
        body.extend_from_slice(&[0x15, 0xc7, 0, 0]);
        let mdhd = make_full_box(b"mdhd", 0, 0, &body);
        let header = parse_mdhd(&mdhd[8..]).unwrap();
        assert_eq!(header.timescale, 1000);
        assert_eq!(header.duration, 5000);
        assert_eq!(header.language.as_deref(), Some("eng"));
    }

    #[test]
    fn test_zero_timescale_is_malformed() {
        let mdhd = make_full_box(b"mdhd", 0, 0, &[0u8; 20]);
        assert!(parse_mdhd(&mdhd[8..]).is_err());
    }
}
