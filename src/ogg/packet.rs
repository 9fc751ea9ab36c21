use super::page::{skip_to_next_page, OggPageHeader};
use crate::errors::MediaParserResult;
use crate::streams::ExtractorInput;

/// Reassembles packets from the segment tables of consecutive pages.
///
/// Every step is all-or-nothing against the input, so `populate` can be retried after
/// `InsufficientData` without losing the partly assembled packet.
#[derive(Debug, Default)]
pub struct OggPacket {
    page_header: OggPageHeader,
    /// Start of the current page in the input.
    page_position: u64,
    /// Next segment of `page_header` to read. `None` when a new page must be read first.
    segment_index: Option<usize>,
    packet: Vec<u8>,
    populated: bool,
    ended_page: bool,
}

impl OggPacket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the current page and any partial packet.
    pub fn reset(&mut self) {
        self.page_header = OggPageHeader::default();
        self.page_position = 0;
        self.segment_index = None;
        self.packet.clear();
        self.populated = false;
        self.ended_page = false;
    }

    /// Header of the page the last packet ended on.
    pub fn page_header(&self) -> &OggPageHeader {
        &self.page_header
    }

    pub fn page_position(&self) -> u64 {
        self.page_position
    }

    pub fn data(&self) -> &[u8] {
        &self.packet
    }

    /// Whether the last packet was the final one completed on its page, so the page's
    /// granule position marks its end.
    pub fn ended_page(&self) -> bool {
        self.ended_page
    }

    /// Whether the input sits at a page boundary with no partial packet pending.
    pub fn at_page_boundary(&self) -> bool {
        self.segment_index.is_none() && (self.populated || self.packet.is_empty())
    }

    /// Read the next complete packet. Returns false at the end of input.
    pub fn populate(&mut self, input: &mut dyn ExtractorInput) -> MediaParserResult<bool> {
        if self.populated {
            self.populated = false;
            self.ended_page = false;
            self.packet.clear();
        }

        while !self.populated {
            let index = match self.segment_index {
                Some(index) => index,
                None => match self.start_page(input)? {
                    Some(index) => index,
                    None => return Ok(false),
                },
            };

            let segment_count = self.page_header.segment_count();
            if index >= segment_count {
                self.segment_index = None;
                continue;
            }
            let (size, segments) = packet_run(&self.page_header.lacing_values, index);
            let start = self.packet.len();
            self.packet.resize(start + size, 0);
            if let Err(err) = input.read_fully(&mut self.packet[start..], false) {
                self.packet.truncate(start);
                return Err(err);
            }

            let next = index + segments;
            self.populated = self.page_header.lacing_values[next - 1] != 255;
            if next == segment_count {
                self.segment_index = None;
                self.ended_page = self.populated;
            } else {
                self.segment_index = Some(next);
            }
        }
        Ok(true)
    }

    /// Consume the next page header. A continued packet at the start of the page is dropped
    /// when nothing was assembled before it, as happens after a seek.
    fn start_page(&mut self, input: &mut dyn ExtractorInput) -> MediaParserResult<Option<usize>> {
        if !skip_to_next_page(input, None)? {
            return Ok(None);
        }
        let Some(header) = OggPageHeader::populate(input, true)? else {
            return Ok(None);
        };
        let mut index = 0;
        let mut skip = header.header_size;
        if header.is_continued_packet() && self.packet.is_empty() {
            let (size, segments) = packet_run(&header.lacing_values, 0);
            input.advance_peek_position(size, false)?;
            skip += size;
            index = segments;
        }
        self.page_position = input.position();
        input.skip_fully(skip, false)?;
        self.page_header = header;
        self.segment_index = Some(index);
        Ok(Some(index))
    }
}

/// Size and segment count of the packet run starting at `start`, up to and including the
/// first lacing value below 255 or the end of the page.
fn packet_run(lacing_values: &[u8], start: usize) -> (usize, usize) {
    let mut size = 0;
    let mut segments = 0;
    for &value in &lacing_values[start.min(lacing_values.len())..] {
        size += value as usize;
        segments += 1;
        if value != 255 {
            break;
        }
    }
    (size, segments)
}
