use crate::bits::ByteCursor;
use crate::errors::{MediaParserError, MediaParserResult};

pub const HEADER_SIZE: usize = 8;
pub const LONG_HEADER_SIZE: usize = 16;

pub type FourCc = [u8; 4];

pub const FTYP: FourCc = *b"ftyp";
pub const MOOV: FourCc = *b"moov";
pub const MVHD: FourCc = *b"mvhd";
pub const TRAK: FourCc = *b"trak";
pub const TKHD: FourCc = *b"tkhd";
pub const EDTS: FourCc = *b"edts";
pub const ELST: FourCc = *b"elst";
pub const MDIA: FourCc = *b"mdia";
pub const MDHD: FourCc = *b"mdhd";
pub const HDLR: FourCc = *b"hdlr";
pub const MINF: FourCc = *b"minf";
pub const STBL: FourCc = *b"stbl";
pub const STSD: FourCc = *b"stsd";
pub const STTS: FourCc = *b"stts";
pub const CTTS: FourCc = *b"ctts";
pub const STSS: FourCc = *b"stss";
pub const STSC: FourCc = *b"stsc";
pub const STSZ: FourCc = *b"stsz";
pub const STZ2: FourCc = *b"stz2";
pub const STCO: FourCc = *b"stco";
pub const CO64: FourCc = *b"co64";
pub const UDTA: FourCc = *b"udta";
pub const META: FourCc = *b"meta";
pub const ILST: FourCc = *b"ilst";
pub const MVEX: FourCc = *b"mvex";
pub const MEHD: FourCc = *b"mehd";
pub const TREX: FourCc = *b"trex";
pub const MOOF: FourCc = *b"moof";
pub const MFHD: FourCc = *b"mfhd";
pub const TRAF: FourCc = *b"traf";
pub const TFHD: FourCc = *b"tfhd";
pub const TFDT: FourCc = *b"tfdt";
pub const TRUN: FourCc = *b"trun";
pub const MDAT: FourCc = *b"mdat";
pub const SIDX: FourCc = *b"sidx";

/// Box header information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    pub box_type: FourCc,
    /// Total size including the header. `None` for a size-0 box running to the end.
    pub size: Option<u64>,
    pub header_size: u64,
}

impl BoxHeader {
    /// Payload size, when the box size is known.
    pub fn payload_size(&self) -> Option<u64> {
        self.size.map(|s| s - self.header_size)
    }
}

/// Printable fourcc for logs.
pub fn fourcc_name(box_type: &FourCc) -> String {
    box_type
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { char::from(b) } else { '?' })
        .collect()
}

/// Parse a box header. Sizes smaller than the header itself are malformed.
pub fn parse_box_header(cursor: &mut ByteCursor) -> MediaParserResult<BoxHeader> {
    let start = cursor.position();
    let size32 = cursor.read_u32()?;
    let box_type = cursor.read_fourcc()?;
    let (size, header_size) = match size32 {
        0 => (None, HEADER_SIZE as u64),
        1 => (Some(cursor.read_u64()?), LONG_HEADER_SIZE as u64),
        n => (Some(u64::from(n)), HEADER_SIZE as u64),
    };
    if let Some(size) = size {
        if size < header_size {
            return Err(MediaParserError::malformed_at(
                format!(
                    "box {} size {} smaller than its header",
                    fourcc_name(&box_type),
                    size
                ),
                start as u64,
            ));
        }
    }
    Ok(BoxHeader {
        box_type,
        size,
        header_size,
    })
}

/// Iterator over the child boxes packed in `data`, yielding `(type, payload)`.
pub struct BoxIter<'a> {
    cursor: ByteCursor<'a>,
    failed: bool,
}

impl<'a> BoxIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: ByteCursor::new(data),
            failed: false,
        }
    }
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = MediaParserResult<(FourCc, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor.bytes_left() < HEADER_SIZE {
            return None;
        }
        let start = self.cursor.position();
        let result = parse_box_header(&mut self.cursor).and_then(|header| {
            let payload_len = match header.size {
                Some(size) => (size - header.header_size) as usize,
                None => self.cursor.bytes_left(),
            };
            if payload_len > self.cursor.bytes_left() {
                return Err(MediaParserError::malformed_at(
                    format!(
                        "box {} overruns its parent by {} bytes",
                        fourcc_name(&header.box_type),
                        payload_len - self.cursor.bytes_left()
                    ),
                    start as u64,
                ));
            }
            Ok((header.box_type, self.cursor.read_bytes(payload_len)?))
        });
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

/// Find a child box and return its payload
pub fn find_box<'a>(data: &'a [u8], box_type: &FourCc) -> Option<&'a [u8]> {
    BoxIter::new(data)
        .filter_map(Result::ok)
        .find(|(t, _)| t == box_type)
        .map(|(_, payload)| payload)
}

/// Split a full box payload into `(version, flags, body)`.
pub fn parse_full_box(payload: &[u8]) -> MediaParserResult<(u8, u32, ByteCursor<'_>)> {
    let mut cursor = ByteCursor::new(payload);
    let version_and_flags = cursor.read_u32()?;
    Ok((
        (version_and_flags >> 24) as u8,
        version_and_flags & 0x00FF_FFFF,
        cursor,
    ))
}

/// A leaf atom kept in memory for later parsing
#[derive(Debug, Clone, PartialEq)]
pub struct LeafAtom {
    pub atom_type: FourCc,
    pub data: Vec<u8>,
}

/// Container atom frame on the parse stack.
///
/// Frames are closed when the input reaches `end_position`, so nesting depth lives on the
/// heap rather than in recursion.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerAtom {
    pub atom_type: FourCc,
    pub end_position: u64,
    pub leaves: Vec<LeafAtom>,
    pub containers: Vec<ContainerAtom>,
}

impl ContainerAtom {
    pub fn new(atom_type: FourCc, end_position: u64) -> Self {
        Self {
            atom_type,
            end_position,
            leaves: Vec::new(),
            containers: Vec::new(),
        }
    }

    pub fn leaf(&self, atom_type: &FourCc) -> Option<&[u8]> {
        self.leaves
            .iter()
            .find(|l| &l.atom_type == atom_type)
            .map(|l| l.data.as_slice())
    }

    pub fn leaves_of<'a>(&'a self, atom_type: &'a FourCc) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.leaves
            .iter()
            .filter(move |l| &l.atom_type == atom_type)
            .map(|l| l.data.as_slice())
    }

    pub fn container(&self, atom_type: &FourCc) -> Option<&ContainerAtom> {
        self.containers.iter().find(|c| &c.atom_type == atom_type)
    }

    pub fn containers_of<'a>(
        &'a self,
        atom_type: &'a FourCc,
    ) -> impl Iterator<Item = &'a ContainerAtom> + 'a {
        self.containers
            .iter()
            .filter(move |c| &c.atom_type == atom_type)
    }

    /// Build a frame tree from an in-memory container payload.
    pub fn from_payload(
        atom_type: FourCc,
        payload: &[u8],
        is_container: fn(&FourCc) -> bool,
    ) -> MediaParserResult<Self> {
        let mut atom = ContainerAtom::new(atom_type, payload.len() as u64);
        for child in BoxIter::new(payload) {
            let (child_type, child_payload) = child?;
            if is_container(&child_type) {
                atom.containers.push(ContainerAtom::from_payload(
                    child_type,
                    child_payload,
                    is_container,
                )?);
            } else {
                atom.leaves.push(LeafAtom {
                    atom_type: child_type,
                    data: child_payload.to_vec(),
                });
            }
        }
        Ok(atom)
    }
}

/// Write a box header to a vector
#[cfg(test)]
pub(crate) fn write_box_header(output: &mut Vec<u8>, name: &[u8; 4], size: u32) {
    output.extend_from_slice(&size.to_be_bytes());
    output.extend_from_slice(name);
}

/// Box with a 32-bit size header
#[cfg(test)]
pub(crate) fn make_box(name: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + HEADER_SIZE);
    write_box_header(&mut buf, name, (payload.len() + HEADER_SIZE) as u32);
    buf.extend_from_slice(payload);
    buf
}

/// Full box (version and flags) with a 32-bit size header
#[cfg(test)]
pub(crate) fn make_full_box(name: &[u8; 4], version: u8, flags: u32, body: &[u8]) -> Vec<u8> {
    let mut payload = ((u32::from(version) << 24) | (flags & 0x00FF_FFFF))
        .to_be_bytes()
        .to_vec();
    payload.extend_from_slice(body);
    make_box(name, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extended_size_header() {
        let mut data = vec![0, 0, 0, 1];
        data.extend_from_slice(b"mdat");
        data.extend_from_slice(&20u64.to_be_bytes());
        data.extend_from_slice(&[0; 4]);
        let header = parse_box_header(&mut ByteCursor::new(&data)).unwrap();
        assert_eq!(header.box_type, MDAT);
        assert_eq!(header.size, Some(20));
        assert_eq!(header.header_size, 16);
        assert_eq!(header.payload_size(), Some(4));
    }

    #[test]
    fn test_size_smaller_than_header_is_malformed() {
        let data = [0, 0, 0, 4, b'f', b'r', b'e', b'e'];
        let err = parse_box_header(&mut ByteCursor::new(&data)).unwrap_err();
        assert!(matches!(err, MediaParserError::Malformed(_)));
    }

    #[test]
    fn test_find_box_and_overrun() {
        let data = [make_box(b"free", &[1, 2]), make_box(b"ilst", &[3])].concat();
        assert_eq!(find_box(&data, b"ilst"), Some(&[3u8][..]));
        assert_eq!(find_box(&data, b"moov"), None);

        let mut overrun = make_box(b"free", &[1, 2]);
        overrun[3] = 40;
        let results: Vec<_> = BoxIter::new(&overrun).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn test_container_from_payload() {
        let trak = [
            make_full_box(b"tkhd", 0, 0, &[0; 20]),
            make_box(b"mdia", &make_box(b"mdhd", &[0; 24])),
        ]
        .concat();
        let atom = ContainerAtom::from_payload(TRAK, &trak, |t| t == &MDIA).unwrap();
        assert!(atom.leaf(&TKHD).is_some());
        assert!(atom.container(&MDIA).and_then(|m| m.leaf(&MDHD)).is_some());
    }
}
