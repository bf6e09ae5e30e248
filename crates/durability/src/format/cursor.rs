//! Bounds-checked little-endian cursor over a byte slice.

use byteorder::{ByteOrder, LittleEndian};
use walplayer_core::MalformedEdit;

pub(crate) struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        ByteCursor { bytes, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub(crate) fn take(&mut self, field: &'static str, n: usize) -> Result<&'a [u8], MalformedEdit> {
        if self.remaining() < n {
            return Err(MalformedEdit::Truncated {
                field,
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let slice = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        slice
    }

    pub(crate) fn u8(&mut self, field: &'static str) -> Result<u8, MalformedEdit> {
        Ok(self.take(field, 1)?[0])
    }

    pub(crate) fn u16(&mut self, field: &'static str) -> Result<u16, MalformedEdit> {
        Ok(LittleEndian::read_u16(self.take(field, 2)?))
    }

    pub(crate) fn u32(&mut self, field: &'static str) -> Result<u32, MalformedEdit> {
        Ok(LittleEndian::read_u32(self.take(field, 4)?))
    }

    pub(crate) fn u64(&mut self, field: &'static str) -> Result<u64, MalformedEdit> {
        Ok(LittleEndian::read_u64(self.take(field, 8)?))
    }

    pub(crate) fn i64(&mut self, field: &'static str) -> Result<i64, MalformedEdit> {
        Ok(LittleEndian::read_i64(self.take(field, 8)?))
    }

    /// Read a u32 length prefix followed by that many bytes.
    pub(crate) fn bytes_u32(&mut self, field: &'static str) -> Result<Vec<u8>, MalformedEdit> {
        let len = self.u32(field)? as usize;
        Ok(self.take(field, len)?.to_vec())
    }

    /// Read a u16 length prefix followed by that many UTF-8 bytes.
    pub(crate) fn string_u16(&mut self, field: &'static str) -> Result<String, MalformedEdit> {
        let len = self.u16(field)? as usize;
        let raw = self.take(field, len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| MalformedEdit::InvalidUtf8(field))
    }
}
