use crate::errors::MediaParserResult;

/// Pull-style byte source consumed by every container reader.
///
/// Two cursors are tracked: the read position, advanced by `read*`/`skip*`, and the peek
/// position, advanced by `peek*`/`advance_peek_position` and never behind the read position.
/// No call blocks: when bytes are not available yet the call fails with
/// `MediaParserError::InsufficientData` and the caller retries after supplying more input.
///
/// The `*_fully` calls are all-or-nothing. When `allow_end_of_input` is set and the source
/// has ended exactly at the starting point, they return `Ok(false)`; ending part way through
/// is `MediaParserError::EndOfInput`.
pub trait ExtractorInput {
    /// Read up to `buf.len()` bytes. Returns 0 only at the end of input.
    fn read(&mut self, buf: &mut [u8]) -> MediaParserResult<usize>;

    fn read_fully(&mut self, buf: &mut [u8], allow_end_of_input: bool) -> MediaParserResult<bool>;

    /// Skip up to `length` bytes. Returns 0 only at the end of input.
    fn skip(&mut self, length: usize) -> MediaParserResult<usize>;

    fn skip_fully(&mut self, length: usize, allow_end_of_input: bool) -> MediaParserResult<bool>;

    /// Copy up to `buf.len()` bytes from the peek position and advance it.
    fn peek(&mut self, buf: &mut [u8]) -> MediaParserResult<usize>;

    fn peek_fully(&mut self, buf: &mut [u8], allow_end_of_input: bool) -> MediaParserResult<bool>;

    fn advance_peek_position(
        &mut self,
        length: usize,
        allow_end_of_input: bool,
    ) -> MediaParserResult<bool>;

    /// Move the peek position back to the read position.
    fn reset_peek_position(&mut self);

    fn peek_position(&self) -> u64;

    fn position(&self) -> u64;

    /// Total length of the source when known.
    fn length(&self) -> Option<u64>;
}

/// Read exactly `len` bytes into a fresh vector.
pub fn read_vec(input: &mut dyn ExtractorInput, len: usize) -> MediaParserResult<Vec<u8>> {
    let mut buf = vec![0u8; len];
    input.read_fully(&mut buf, false)?;
    Ok(buf)
}

/// Peek exactly `len` bytes into a fresh vector.
pub fn peek_vec(input: &mut dyn ExtractorInput, len: usize) -> MediaParserResult<Vec<u8>> {
    let mut buf = vec![0u8; len];
    input.peek_fully(&mut buf, false)?;
    Ok(buf)
}
