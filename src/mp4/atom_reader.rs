use super::r#box::*;
use super::RELOAD_MINIMUM_SEEK_DISTANCE;
use crate::bits::ByteCursor;
use crate::errors::{MediaParserError, MediaParserResult};
use crate::streams::ExtractorInput;
use log::trace;

/// Header of an atom read from the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomHeaderInfo {
    pub atom_type: FourCc,
    /// Absolute position of the first header byte.
    pub position: u64,
    pub size: u64,
    pub header_size: u64,
}

impl AtomHeaderInfo {
    pub fn end_position(&self) -> u64 {
        self.position + self.size
    }

    pub fn payload_size(&self) -> u64 {
        self.size - self.header_size
    }
}

/// Read the atom header at the current position.
///
/// The header is peeked in full before it is consumed, so a header cut short by the end of the
/// buffered bytes leaves the input untouched. Returns `None` when the source ends cleanly
/// before the header. A size-0 atom runs to the end of the source, or of `enclosing_end`
/// when the source length is unknown.
pub fn read_atom_header(
    input: &mut dyn ExtractorInput,
    enclosing_end: Option<u64>,
) -> MediaParserResult<Option<AtomHeaderInfo>> {
    input.reset_peek_position();
    let position = input.position();
    let mut header = [0u8; LONG_HEADER_SIZE];
    if !input.peek_fully(&mut header[..HEADER_SIZE], true)? {
        return Ok(None);
    }
    let header_len = if header[..4] == [0, 0, 0, 1] {
        input.peek_fully(&mut header[HEADER_SIZE..], false)?;
        LONG_HEADER_SIZE
    } else {
        HEADER_SIZE
    };
    let parsed = parse_box_header(&mut ByteCursor::new(&header[..header_len])).map_err(|_| {
        MediaParserError::malformed_at(
            format!("atom {} smaller than its header", fourcc_name(&header_type(&header))),
            position,
        )
    })?;
    let size = match parsed.size {
        Some(size) => size,
        None => match input.length().or(enclosing_end) {
            Some(end) if end >= position + parsed.header_size => end - position,
            _ => {
                return Err(MediaParserError::malformed_at(
                    format!(
                        "atom {} of unknown length",
                        fourcc_name(&parsed.box_type)
                    ),
                    position,
                ))
            }
        },
    };
    if let Some(end) = enclosing_end {
        if position + size > end {
            return Err(MediaParserError::malformed_at(
                format!(
                    "atom {} overruns its container by {} bytes",
                    fourcc_name(&parsed.box_type),
                    position + size - end
                ),
                position,
            ));
        }
    }
    input.skip_fully(header_len, false)?;
    trace!(
        "atom {} at {} size {}",
        fourcc_name(&parsed.box_type),
        position,
        size
    );
    Ok(Some(AtomHeaderInfo {
        atom_type: parsed.box_type,
        position,
        size,
        header_size: parsed.header_size,
    }))
}

fn header_type(header: &[u8]) -> FourCc {
    [header[4], header[5], header[6], header[7]]
}

/// Move the input forward to `target`. Short forward skips are read through; backward moves and
/// skips of at least `RELOAD_MINIMUM_SEEK_DISTANCE` are requested from the caller instead, in
/// which case `seek_position` is set and `true` returned.
pub fn skip_to(
    input: &mut dyn ExtractorInput,
    target: u64,
    seek_position: &mut u64,
) -> MediaParserResult<bool> {
    let position = input.position();
    if target < position || target - position >= RELOAD_MINIMUM_SEEK_DISTANCE {
        *seek_position = target;
        return Ok(true);
    }
    input.skip_fully((target - position) as usize, false)?;
    Ok(false)
}

/// Open container atoms, innermost last
#[derive(Debug, Clone, Default)]
pub struct ContainerStack {
    frames: Vec<ContainerAtom>,
}

impl ContainerStack {
    pub fn push(&mut self, atom: ContainerAtom) {
        self.frames.push(atom);
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// End position of the innermost open container.
    pub fn innermost_end(&self) -> Option<u64> {
        self.frames.last().map(|f| f.end_position)
    }

    /// Attach a leaf to the innermost open container. Top-level leaves are handed back.
    pub fn add_leaf(&mut self, leaf: LeafAtom) -> Option<LeafAtom> {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.leaves.push(leaf);
                None
            }
            None => Some(leaf),
        }
    }

    /// Close every container ending at `position`, nesting each into its parent. Top-level
    /// containers that closed are returned in closing order.
    pub fn pop_ended(&mut self, position: u64) -> Vec<ContainerAtom> {
        let mut finished = Vec::new();
        while self.innermost_end() == Some(position) {
            let Some(atom) = self.frames.pop() else {
                break;
            };
            match self.frames.last_mut() {
                Some(parent) => parent.containers.push(atom),
                None => finished.push(atom),
            }
        }
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::BufferedInput;

    #[test]
    fn test_header_needs_all_bytes_before_consuming() {
        let mut input = BufferedInput::new();
        input.append(&[0, 0, 0, 1, b'm', b'd', b'a', b't', 0, 0]);
        let err = read_atom_header(&mut input, None).unwrap_err();
        assert!(err.is_insufficient_data());
        assert_eq!(input.position(), 0);

        input.append(&[0, 0, 0, 0, 0, 32]);
        let header = read_atom_header(&mut input, None).unwrap().unwrap();
        assert_eq!(header.atom_type, MDAT);
        assert_eq!(header.size, 32);
        assert_eq!(header.header_size, 16);
        assert_eq!(input.position(), 16);
    }

    #[test]
    fn test_size_zero_with_unknown_length_is_malformed() {
        let mut input = BufferedInput::new();
        input.append(&[0, 0, 0, 0, b'm', b'd', b'a', b't']);
        let err = read_atom_header(&mut input, None).unwrap_err();
        assert!(matches!(err, MediaParserError::Malformed(_)));

        let mut input = BufferedInput::from_bytes(vec![0, 0, 0, 0, b'm', b'd', b'a', b't', 1, 2]);
        let header = read_atom_header(&mut input, None).unwrap().unwrap();
        assert_eq!(header.size, 10);
    }

    #[test]
    fn test_clean_end_and_overrun() {
        let mut input = BufferedInput::from_bytes(Vec::new());
        assert!(read_atom_header(&mut input, None).unwrap().is_none());

        let mut input = BufferedInput::from_bytes(make_box(b"free", &[0; 8]));
        assert!(read_atom_header(&mut input, Some(12)).is_err());
    }

    #[test]
    fn test_container_stack_nesting() {
        let mut stack = ContainerStack::default();
        stack.push(ContainerAtom::new(MOOV, 100));
        stack.push(ContainerAtom::new(TRAK, 100));
        assert!(stack
            .add_leaf(LeafAtom {
                atom_type: TKHD,
                data: vec![1],
            })
            .is_none());
        assert!(stack.pop_ended(50).is_empty());
        let finished = stack.pop_ended(100);
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].atom_type, MOOV);
        assert!(finished[0].container(&TRAK).and_then(|t| t.leaf(&TKHD)).is_some());
        assert!(stack.is_empty());
    }
}
