use super::extractor_input::ExtractorInput;
use crate::errors::{MediaParserError, MediaParserResult};
use log::trace;
use std::io::Read;
use std::path::Path;

/// In-memory byte source fed by the host.
///
/// Bytes are appended as they arrive; `end_of_input` marks the source as complete. The buffer
/// covers absolute positions `[base, base + data.len())` of the underlying stream.
#[derive(Debug, Default)]
pub struct BufferedInput {
    data: Vec<u8>,
    base: u64,
    position: u64,
    peek_position: u64,
    ended: bool,
    length: Option<u64>,
}

impl BufferedInput {
    /// Empty, still-open source starting at position 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete source backed by `data`.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let length = Some(data.len() as u64);
        Self {
            data,
            ended: true,
            length,
            ..Self::default()
        }
    }

    /// Load a whole local file.
    pub fn open<P: AsRef<Path>>(path: P) -> MediaParserResult<Self> {
        Ok(Self::from_bytes(std::fs::read(path)?))
    }

    /// Drain a reader into a complete source.
    pub fn read_from<R: Read>(mut reader: R) -> MediaParserResult<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self::from_bytes(data))
    }

    /// Append newly arrived bytes.
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Mark that no more bytes will be appended at this position.
    pub fn end_of_input(&mut self) {
        self.ended = true;
        if self.length.is_none() {
            self.length = Some(self.buffered_end());
        }
    }

    pub fn set_length(&mut self, length: Option<u64>) {
        self.length = length;
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Absolute position one past the last buffered byte.
    pub fn buffered_end(&self) -> u64 {
        self.base + self.data.len() as u64
    }

    /// Drop bytes before the read position.
    pub fn compact(&mut self) {
        let consumed = (self.position - self.base) as usize;
        if consumed > 0 {
            self.data.drain(..consumed);
            self.base = self.position;
        }
    }

    /// Reposition the source. Buffered bytes are kept when `position` lies inside them;
    /// otherwise the buffer restarts empty at `position` and waits for the host to append.
    pub fn seek_to(&mut self, position: u64) {
        if position < self.base || position > self.buffered_end() {
            trace!(
                "seek to {} outside buffered range {}..{}",
                position,
                self.base,
                self.buffered_end()
            );
            self.data.clear();
            self.base = position;
            self.ended = matches!(self.length, Some(len) if position >= len);
        }
        self.position = position;
        self.peek_position = position;
    }

    fn available_from(&self, from: u64) -> usize {
        self.buffered_end().saturating_sub(from) as usize
    }

    fn slice_from(&self, from: u64, len: usize) -> &[u8] {
        let start = (from - self.base) as usize;
        &self.data[start..start + len]
    }

    fn check_available(
        &self,
        from: u64,
        len: usize,
        allow_end_of_input: bool,
    ) -> MediaParserResult<bool> {
        let available = self.available_from(from);
        if available >= len {
            return Ok(true);
        }
        if !self.ended {
            return Err(MediaParserError::InsufficientData);
        }
        if available == 0 && allow_end_of_input {
            return Ok(false);
        }
        Err(MediaParserError::EndOfInput)
    }

    fn partial_count(&self, from: u64, wanted: usize) -> MediaParserResult<usize> {
        let available = self.available_from(from);
        if available == 0 && wanted > 0 {
            return if self.ended {
                Ok(0)
            } else {
                Err(MediaParserError::InsufficientData)
            };
        }
        Ok(available.min(wanted))
    }

    fn advance_position(&mut self, n: usize) {
        self.position += n as u64;
        self.peek_position = self.peek_position.max(self.position);
    }
}

impl ExtractorInput for BufferedInput {
    fn read(&mut self, buf: &mut [u8]) -> MediaParserResult<usize> {
        let n = self.partial_count(self.position, buf.len())?;
        buf[..n].copy_from_slice(self.slice_from(self.position, n));
        self.advance_position(n);
        Ok(n)
    }

    fn read_fully(&mut self, buf: &mut [u8], allow_end_of_input: bool) -> MediaParserResult<bool> {
        if !self.check_available(self.position, buf.len(), allow_end_of_input)? {
            return Ok(false);
        }
        buf.copy_from_slice(self.slice_from(self.position, buf.len()));
        self.advance_position(buf.len());
        Ok(true)
    }

    fn skip(&mut self, length: usize) -> MediaParserResult<usize> {
        let n = self.partial_count(self.position, length)?;
        self.advance_position(n);
        Ok(n)
    }

    fn skip_fully(&mut self, length: usize, allow_end_of_input: bool) -> MediaParserResult<bool> {
        if !self.check_available(self.position, length, allow_end_of_input)? {
            return Ok(false);
        }
        self.advance_position(length);
        Ok(true)
    }

    fn peek(&mut self, buf: &mut [u8]) -> MediaParserResult<usize> {
        let n = self.partial_count(self.peek_position, buf.len())?;
        buf[..n].copy_from_slice(self.slice_from(self.peek_position, n));
        self.peek_position += n as u64;
        Ok(n)
    }

    fn peek_fully(&mut self, buf: &mut [u8], allow_end_of_input: bool) -> MediaParserResult<bool> {
        if !self.check_available(self.peek_position, buf.len(), allow_end_of_input)? {
            return Ok(false);
        }
        buf.copy_from_slice(self.slice_from(self.peek_position, buf.len()));
        self.peek_position += buf.len() as u64;
        Ok(true)
    }

    fn advance_peek_position(
        &mut self,
        length: usize,
        allow_end_of_input: bool,
    ) -> MediaParserResult<bool> {
        if !self.check_available(self.peek_position, length, allow_end_of_input)? {
            return Ok(false);
        }
        self.peek_position += length as u64;
        Ok(true)
    }

    fn reset_peek_position(&mut self) {
        self.peek_position = self.position;
    }

    fn peek_position(&self) -> u64 {
        self.peek_position
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn length(&self) -> Option<u64> {
        self.length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_peek_does_not_consume() {
        let mut input = BufferedInput::from_bytes(vec![1, 2, 3, 4]);
        let mut buf = [0u8; 2];
        input.peek_fully(&mut buf, false).unwrap();
        assert_eq!(buf, [1, 2]);
        assert_eq!(input.position(), 0);
        assert_eq!(input.peek_position(), 2);
        input.reset_peek_position();
        input.read_fully(&mut buf, false).unwrap();
        assert_eq!(buf, [1, 2]);
        assert_eq!(input.position(), 2);
    }

    #[test]
    fn test_insufficient_data_while_open() {
        let mut input = BufferedInput::new();
        input.append(&[1, 2]);
        let mut buf = [0u8; 4];
        let err = input.read_fully(&mut buf, false).unwrap_err();
        assert!(err.is_insufficient_data());
        // all-or-nothing: nothing was consumed
        assert_eq!(input.position(), 0);
        input.append(&[3, 4]);
        assert!(input.read_fully(&mut buf, false).unwrap());
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn test_end_of_input_boundaries() {
        let mut input = BufferedInput::from_bytes(vec![9]);
        let mut buf = [0u8; 2];
        assert!(matches!(
            input.read_fully(&mut buf, true),
            Err(MediaParserError::EndOfInput)
        ));
        input.skip_fully(1, false).unwrap();
        assert!(!input.read_fully(&mut buf, true).unwrap());
        assert_eq!(input.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_seek_outside_buffer_restarts_window() {
        let mut input = BufferedInput::new();
        input.set_length(Some(1000));
        input.append(&[0u8; 10]);
        input.skip_fully(4, false).unwrap();
        input.compact();
        assert_eq!(input.buffered_end(), 10);
        input.seek_to(500);
        assert_eq!(input.position(), 500);
        assert!(input.skip(1).unwrap_err().is_insufficient_data());
        input.append(&[7]);
        let mut b = [0u8; 1];
        input.read_fully(&mut b, false).unwrap();
        assert_eq!(b[0], 7);
    }

    #[test]
    fn test_open_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"RIFF").unwrap();
        let mut input = BufferedInput::open(file.path()).unwrap();
        assert_eq!(input.length(), Some(4));
        let mut buf = [0u8; 4];
        input.read_fully(&mut buf, false).unwrap();
        assert_eq!(&buf, b"RIFF");
    }
}
