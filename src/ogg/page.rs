use crate::bits::ByteCursor;
use crate::errors::{MediaParserError, MediaParserResult};
use crate::streams::ExtractorInput;
use log::trace;

pub const CAPTURE_PATTERN: [u8; 4] = *b"OggS";
pub const EMPTY_PAGE_HEADER_SIZE: usize = 27;
pub const MAX_SEGMENT_COUNT: usize = 255;
pub const MAX_PAGE_PAYLOAD: usize = 255 * 255;
pub const MAX_PAGE_SIZE: usize = EMPTY_PAGE_HEADER_SIZE + MAX_SEGMENT_COUNT + MAX_PAGE_PAYLOAD;

pub const FLAG_CONTINUED_PACKET: u8 = 0x01;
pub const FLAG_BEGINNING_OF_STREAM: u8 = 0x02;
pub const FLAG_END_OF_STREAM: u8 = 0x04;

/// Granule position of pages on which no packet ends.
pub const NO_GRANULE: i64 = -1;

/// Header of one Ogg page, including its segment table
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OggPageHeader {
    pub revision: u8,
    pub header_type: u8,
    pub granule_position: i64,
    pub stream_serial_number: u32,
    pub page_sequence_number: u32,
    pub page_checksum: u32,
    /// Header size including the segment table.
    pub header_size: usize,
    pub body_size: usize,
    pub lacing_values: Vec<u8>,
}

impl OggPageHeader {
    pub fn segment_count(&self) -> usize {
        self.lacing_values.len()
    }

    pub fn page_size(&self) -> usize {
        self.header_size + self.body_size
    }

    pub fn is_continued_packet(&self) -> bool {
        self.header_type & FLAG_CONTINUED_PACKET != 0
    }

    pub fn is_beginning_of_stream(&self) -> bool {
        self.header_type & FLAG_BEGINNING_OF_STREAM != 0
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.header_type & FLAG_END_OF_STREAM != 0
    }

    /// Parse the fixed 27-byte header. The segment table is filled in by `populate`.
    pub fn parse_fixed(data: &[u8]) -> MediaParserResult<Option<Self>> {
        let mut cursor = ByteCursor::new(data);
        if cursor.read_fourcc()? != CAPTURE_PATTERN {
            return Ok(None);
        }
        let revision = cursor.read_u8()?;
        if revision != 0 {
            return Ok(None);
        }
        let header_type = cursor.read_u8()?;
        let granule_position = cursor.read_i64_le()?;
        let stream_serial_number = cursor.read_u32_le()?;
        let page_sequence_number = cursor.read_u32_le()?;
        let page_checksum = cursor.read_u32_le()?;
        let segment_count = cursor.read_u8()? as usize;
        Ok(Some(Self {
            revision,
            header_type,
            granule_position,
            stream_serial_number,
            page_sequence_number,
            page_checksum,
            header_size: EMPTY_PAGE_HEADER_SIZE + segment_count,
            body_size: 0,
            lacing_values: vec![0; segment_count],
        }))
    }

    /// Peek the page header at the peek position, segment table included.
    ///
    /// Returns `None` when the bytes are not a page header. With `quiet` set, running off the
    /// end of the source is also reported as `None` instead of an error.
    pub fn populate(input: &mut dyn ExtractorInput, quiet: bool) -> MediaParserResult<Option<Self>> {
        let mut fixed = [0u8; EMPTY_PAGE_HEADER_SIZE];
        match input.peek_fully(&mut fixed, quiet) {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(MediaParserError::EndOfInput) if quiet => return Ok(None),
            Err(err) => return Err(err),
        }
        let Some(mut header) = Self::parse_fixed(&fixed)? else {
            if quiet {
                return Ok(None);
            }
            return Err(MediaParserError::malformed(
                "expected an Ogg page capture pattern with revision 0",
            ));
        };
        match input.peek_fully(&mut header.lacing_values, false) {
            Ok(_) => {}
            Err(MediaParserError::EndOfInput) if quiet => return Ok(None),
            Err(err) => return Err(err),
        }
        header.body_size = header.lacing_values.iter().map(|&v| v as usize).sum();
        Ok(Some(header))
    }
}

/// Skip to the next capture pattern at or after the read position, reading no further than
/// `limit` when given.
///
/// Returns false when no further page starts before the end of the source or `limit`.
pub fn skip_to_next_page(
    input: &mut dyn ExtractorInput,
    limit: Option<u64>,
) -> MediaParserResult<bool> {
    input.reset_peek_position();
    let mut window = [0u8; 4];
    loop {
        if let Some(limit) = limit {
            if input.position() + 4 > limit {
                return Ok(false);
            }
        }
        if !input.peek_fully(&mut window, true)? {
            return Ok(false);
        }
        if window == CAPTURE_PATTERN {
            input.reset_peek_position();
            return Ok(true);
        }
        // fewer than 4 trailing bytes left is a clean end
        match input.skip_fully(1, true) {
            Ok(true) => {}
            Ok(false) => return Ok(false),
            Err(err) => return Err(err),
        }
        input.reset_peek_position();
        trace!("resyncing ogg page at {}", input.position());
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::streams::BufferedInput;

    /// A page holding `packets`, each terminated within the page.
    pub(crate) fn build_page(
        header_type: u8,
        granule: i64,
        serial: u32,
        sequence: u32,
        packets: &[&[u8]],
    ) -> Vec<u8> {
        let mut lacing = Vec::new();
        for packet in packets {
            let mut len = packet.len();
            while len >= 255 {
                lacing.push(255);
                len -= 255;
            }
            lacing.push(len as u8);
        }
        build_raw_page(header_type, granule, serial, sequence, &lacing, &packets.concat())
    }

    /// A page with an explicit segment table, for packets spanning pages.
    pub(crate) fn build_raw_page(
        header_type: u8,
        granule: i64,
        serial: u32,
        sequence: u32,
        lacing: &[u8],
        body: &[u8],
    ) -> Vec<u8> {
        let mut page = CAPTURE_PATTERN.to_vec();
        page.push(0);
        page.push(header_type);
        page.extend_from_slice(&granule.to_le_bytes());
        page.extend_from_slice(&serial.to_le_bytes());
        page.extend_from_slice(&sequence.to_le_bytes());
        page.extend_from_slice(&0u32.to_le_bytes());
        page.push(lacing.len() as u8);
        page.extend_from_slice(lacing);
        page.extend_from_slice(body);
        page
    }

    #[test]
    fn test_populate_page_header() {
        let page = build_page(FLAG_BEGINNING_OF_STREAM, 0, 7, 0, &[&[1; 300], &[2; 10]]);
        let mut input = BufferedInput::from_bytes(page);
        let header = OggPageHeader::populate(&mut input, false).unwrap().expect("page");
        assert!(header.is_beginning_of_stream());
        assert_eq!(header.stream_serial_number, 7);
        assert_eq!(header.lacing_values, vec![255, 45, 10]);
        assert_eq!(header.header_size, 30);
        assert_eq!(header.body_size, 310);
        // peeked only
        assert_eq!(input.position(), 0);
    }

    #[test]
    fn test_not_a_page() {
        let mut input = BufferedInput::from_bytes(b"RIFF....WAVEfmt and some more bytes".to_vec());
        assert!(OggPageHeader::populate(&mut input, true).unwrap().is_none());
        input.reset_peek_position();
        assert!(OggPageHeader::populate(&mut input, false).is_err());
    }

    #[test]
    fn test_skip_to_next_page_resyncs() {
        let mut data = vec![0u8, b'O', b'g', 1, 2];
        data.extend_from_slice(&build_page(0, 100, 1, 3, &[&[5; 4]]));
        let mut input = BufferedInput::from_bytes(data);
        assert!(skip_to_next_page(&mut input, None).unwrap());
        assert_eq!(input.position(), 5);

        input.skip_fully(1, false).unwrap();
        assert!(!skip_to_next_page(&mut input, None).unwrap());
    }
}
