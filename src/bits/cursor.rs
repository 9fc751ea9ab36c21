use crate::errors::{MediaParserError, MediaParserResult};

/// Byte-aligned reader over a borrowed slice.
///
/// Every read checks bounds and fails with a malformed-data error instead of panicking, so box
/// and chunk payloads that lie about their own lengths are reported, not trusted.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) -> MediaParserResult<()> {
        if pos > self.data.len() {
            return Err(MediaParserError::malformed(format!(
                "position {} beyond {} bytes",
                pos,
                self.data.len()
            )));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn bytes_left(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn limit(&self) -> usize {
        self.data.len()
    }

    /// Remaining unread bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn take(&mut self, n: usize) -> MediaParserResult<&'a [u8]> {
        if self.bytes_left() < n {
            return Err(MediaParserError::malformed(format!(
                "need {} bytes at offset {}, only {} left",
                n,
                self.pos,
                self.bytes_left()
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> MediaParserResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> MediaParserResult<()> {
        self.take(n).map(|_| ())
    }

    pub fn read_bytes(&mut self, n: usize) -> MediaParserResult<&'a [u8]> {
        self.take(n)
    }

    pub fn peek_u8(&self) -> MediaParserResult<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or_else(|| MediaParserError::malformed("peek past end of buffer"))
    }

    pub fn read_u8(&mut self) -> MediaParserResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> MediaParserResult<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub fn read_u24(&mut self) -> MediaParserResult<u32> {
        let b = self.take(3)?;
        Ok((u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]))
    }

    pub fn read_u32(&mut self) -> MediaParserResult<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn read_i32(&mut self) -> MediaParserResult<i32> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    pub fn read_u64(&mut self) -> MediaParserResult<u64> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    pub fn read_i64(&mut self) -> MediaParserResult<i64> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    pub fn read_u16_le(&mut self) -> MediaParserResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn read_u32_le(&mut self) -> MediaParserResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn read_u64_le(&mut self) -> MediaParserResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn read_i64_le(&mut self) -> MediaParserResult<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    /// Fourcc as a 4-byte array.
    pub fn read_fourcc(&mut self) -> MediaParserResult<[u8; 4]> {
        self.array()
    }

    /// Read `n` bytes as text, replacing invalid UTF-8 sequences.
    pub fn read_string(&mut self, n: usize) -> MediaParserResult<String> {
        Ok(String::from_utf8_lossy(self.take(n)?).into_owned())
    }

    /// Read up to a NUL byte (consumed, not returned) or to the end of the buffer.
    pub fn read_null_terminated_string(&mut self) -> String {
        let rest = self.remaining();
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let s = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += (end + 1).min(rest.len());
        s
    }

    /// ID3v2.4 style 28-bit synchsafe integer.
    pub fn read_synch_safe_int(&mut self) -> MediaParserResult<u32> {
        let b = self.take(4)?;
        Ok(b.iter()
            .fold(0u32, |acc, &byte| (acc << 7) | u32::from(byte & 0x7F)))
    }

    /// UTF-8 style variable length number as used in FLAC frame headers.
    pub fn read_utf8_encoded_long(&mut self) -> MediaParserResult<u64> {
        let first = self.peek_u8()?;
        let length = if first & 0x80 == 0 {
            1
        } else {
            let ones = first.leading_ones() as usize;
            if !(2..=7).contains(&ones) {
                return Err(MediaParserError::malformed(format!(
                    "invalid UTF-8 sequence start byte {:#04x}",
                    first
                )));
            }
            ones
        };
        let bytes = self.take(length)?;
        if length == 1 {
            return Ok(u64::from(first));
        }
        let mut value = u64::from(first & (0x7F >> length));
        for &b in &bytes[1..] {
            if b & 0xC0 != 0x80 {
                return Err(MediaParserError::malformed(format!(
                    "invalid UTF-8 continuation byte {:#04x}",
                    b
                )));
            }
            value = (value << 6) | u64::from(b & 0x3F);
        }
        Ok(value)
    }
}
