use super::r#box::{FourCc, FTYP, HEADER_SIZE, LONG_HEADER_SIZE, MOOF, MOOV, MVEX};
use crate::errors::MediaParserResult;
use crate::streams::ExtractorInput;
use log::trace;
use serde::Serialize;

/// Bytes scanned from the start of the source when sniffing.
const SEARCH_LENGTH: u64 = 4096;

/// File family named by an ftyp brand
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Mp4Brand {
    Mp4,
    M4v,
    M4a,
    ThreeGp,
    ThreeG2,
    QuickTime,
    Unknown(String),
}

impl Mp4Brand {
    /// Classify an ftyp major or compatible brand.
    pub fn from_brand(brand: &FourCc) -> Mp4Brand {
        match brand {
            b"isom" | b"mp41" | b"mp42" | b"iso2" | b"iso3" | b"iso4" | b"iso5" | b"iso6"
            | b"iso8" | b"avc1" | b"hvc1" | b"hev1" | b"av01" | b"dash" | b"msdh" | b"msix"
            | b"cmfc" | b"cmfs" | b"cmf2" | b"mp71" | b"f4v " | b"kddi" => Mp4Brand::Mp4,
            b"M4V " | b"M4VH" | b"M4VP" => Mp4Brand::M4v,
            b"M4A " | b"M4B " | b"M4P " => Mp4Brand::M4a,
            b"3gp4" | b"3gp5" | b"3gp6" | b"3gp7" | b"3ge6" | b"3ge7" | b"3gg6" => {
                Mp4Brand::ThreeGp
            }
            b"3g2a" | b"3g2b" | b"3g2c" => Mp4Brand::ThreeG2,
            b"qt  " => Mp4Brand::QuickTime,
            _ => Mp4Brand::Unknown(String::from_utf8_lossy(brand).into_owned()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Mp4Brand::Unknown(_))
    }
}

/// Whether an ftyp payload names a brand this reader supports, either as major brand or as one
/// of the compatible brands.
pub fn has_supported_brand(ftyp_payload: &[u8]) -> bool {
    ftyp_payload
        .chunks_exact(4)
        .enumerate()
        // major brand, minor version, compatible brands
        .filter(|(i, _)| *i != 1)
        .any(|(_, brand)| {
            let brand: FourCc = [brand[0], brand[1], brand[2], brand[3]];
            Mp4Brand::from_brand(&brand).is_known()
        })
}

fn peek_u32(input: &mut dyn ExtractorInput) -> MediaParserResult<Option<u32>> {
    let mut buf = [0u8; 4];
    if !input.peek_fully(&mut buf, true)? {
        return Ok(None);
    }
    Ok(Some(u32::from_be_bytes(buf)))
}

/// Peek the leading atoms of `input` and report whether it is an MP4 file with a supported
/// brand whose fragmentation matches `fragmented`.
///
/// A `moof` or `mvex` atom within the scanned window marks the file as fragmented.
pub fn sniff_mp4(input: &mut dyn ExtractorInput, fragmented: bool) -> MediaParserResult<bool> {
    let input_length = input.length();
    let mut search_length = input_length.map_or(SEARCH_LENGTH, |len| len.min(SEARCH_LENGTH));
    let mut bytes_searched = 0u64;
    let mut found_good_file_type = false;
    let mut is_fragmented = false;

    while bytes_searched < search_length {
        let Some(size32) = peek_u32(input)? else {
            break;
        };
        let mut type_buf = [0u8; 4];
        input.peek_fully(&mut type_buf, false)?;
        let mut header_size = HEADER_SIZE as u64;
        let size = match size32 {
            1 => {
                let mut long = [0u8; 8];
                input.peek_fully(&mut long, false)?;
                header_size = LONG_HEADER_SIZE as u64;
                u64::from_be_bytes(long)
            }
            0 => match input_length {
                Some(len) => len.saturating_sub(input.peek_position() - HEADER_SIZE as u64),
                None => return Ok(found_good_file_type && !fragmented),
            },
            n => u64::from(n),
        };
        if size < header_size {
            return Ok(false);
        }
        bytes_searched += header_size;

        match type_buf {
            MOOV => {
                // descend into moov
                search_length = match input_length {
                    Some(len) => (search_length + size).min(len),
                    None => search_length + size,
                };
                continue;
            }
            MOOF | MVEX => {
                is_fragmented = true;
                break;
            }
            _ => {}
        }

        let data_size = size - header_size;
        if bytes_searched + data_size >= search_length {
            break;
        }
        bytes_searched += data_size;
        if type_buf == FTYP {
            if data_size < 8 || data_size > SEARCH_LENGTH {
                return Ok(false);
            }
            let mut payload = vec![0u8; data_size as usize];
            input.peek_fully(&mut payload, false)?;
            if !has_supported_brand(&payload) {
                trace!("ftyp names no supported brand");
                return Ok(false);
            }
            found_good_file_type = true;
        } else if data_size > 0 {
            input.advance_peek_position(data_size as usize, false)?;
        }
    }
    Ok(found_good_file_type && fragmented == is_fragmented)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mp4::r#box::make_box;
    use crate::streams::BufferedInput;

    fn ftyp(major: &[u8; 4], compatible: &[&[u8; 4]]) -> Vec<u8> {
        let mut body = major.to_vec();
        body.extend_from_slice(&[0, 0, 2, 0]);
        for brand in compatible {
            body.extend_from_slice(*brand);
        }
        make_box(b"ftyp", &body)
    }

    #[test]
    fn test_parse_ftyp_brand() {
        assert_eq!(Mp4Brand::from_brand(b"isom"), Mp4Brand::Mp4);
        assert_eq!(Mp4Brand::from_brand(b"M4V "), Mp4Brand::M4v);
        assert_eq!(Mp4Brand::from_brand(b"3gp6"), Mp4Brand::ThreeGp);
        assert_eq!(Mp4Brand::from_brand(b"qt  "), Mp4Brand::QuickTime);
        assert_eq!(
            Mp4Brand::from_brand(b"abcd"),
            Mp4Brand::Unknown("abcd".to_string())
        );
    }

    #[test]
    fn test_sniff_progressive_and_fragmented() {
        let progressive = [
            ftyp(b"isom", &[b"mp41"]),
            make_box(b"moov", &make_box(b"mvhd", &[0; 100])),
            make_box(b"mdat", &[0; 16]),
        ]
        .concat();
        let mut input = BufferedInput::from_bytes(progressive.clone());
        assert!(sniff_mp4(&mut input, false).unwrap());
        input.reset_peek_position();
        assert!(!sniff_mp4(&mut input, true).unwrap());

        let fragmented = [
            ftyp(b"iso6", &[b"dash"]),
            make_box(b"moov", &make_box(b"mvex", &[0; 8])),
        ]
        .concat();
        let mut input = BufferedInput::from_bytes(fragmented);
        assert!(sniff_mp4(&mut input, true).unwrap());
    }

    #[test]
    fn test_compatible_brand_is_enough() {
        let data = [ftyp(b"zzzz", &[b"iso5"]), make_box(b"free", &[])].concat();
        let mut input = BufferedInput::from_bytes(data);
        assert!(sniff_mp4(&mut input, false).unwrap());
    }

    #[test]
    fn test_not_mp4() {
        let mut input = BufferedInput::from_bytes(b"OggS\0\x02 and more bytes here".to_vec());
        assert!(!sniff_mp4(&mut input, false).unwrap());
    }
}
