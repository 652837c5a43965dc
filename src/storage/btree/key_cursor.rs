use crate::types::{IndexError, Result};

/// Zero-copy reader over a key image: a varint field count, then `varint len | bytes`
/// per field.
#[derive(Clone, Copy, Debug)]
pub struct KeyCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> KeyCursor<'a> {
    /// Starts reading at the beginning of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns `true` once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Reads the leading field count.
    pub fn read_count(&mut self) -> Result<u64> {
        self.read_var_u64(IndexError::Corruption("key field count truncated"))
    }

    /// Reads one length-prefixed field.
    pub fn next_field(&mut self) -> Result<&'a [u8]> {
        let len = self.read_var_u64(IndexError::Corruption("key field length truncated"))?;
        let len =
            usize::try_from(len).map_err(|_| IndexError::Corruption("key field length overflow"))?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(IndexError::Corruption("key field truncated"))?;
        let field = &self.buf[self.pos..end];
        self.pos = end;
        Ok(field)
    }

    /// Reads an unsigned LEB128 varint, failing with `truncated` if input ends early.
    pub fn read_var_u64(&mut self, truncated: IndexError) -> Result<u64> {
        let mut value = 0u64;
        for (idx, byte) in self.buf[self.pos.min(self.buf.len())..].iter().take(10).enumerate() {
            value |= u64::from(byte & 0x7f) << (7 * idx);
            if byte & 0x80 == 0 {
                self.pos += idx + 1;
                return Ok(value);
            }
        }
        if self.buf.len() - self.pos.min(self.buf.len()) >= 10 {
            return Err(IndexError::Corruption("key varint too long"));
        }
        Err(truncated)
    }
}
