//! Bounded varint streams (format v1).
//!
//! `StreamWriter` encodes a sequence of varints into a caller-supplied
//! byte range; `StreamReader` walks it back. Both track an explicit
//! position and fail with `OutOfBounds` instead of growing or wrapping.
//!
//! Besides varints the stream supports raw little-endian values of widths
//! 8/32/64 and `allocate_u32`, which reserves four bytes to be filled in
//! later — the usual size-prefix pattern:
//!
//! ```ignore
//! let slot = stream.allocate_u32()?;
//! let before = stream.size();
//! write_payload(&mut stream)?;
//! stream.set_slot_u32(slot, (stream.size() - before) as u32);
//! ```

use crate::error::{Error, Result};
use crate::transform::{UintReader, UintWriter};
use crate::varint;

/// Four reserved bytes inside a stream, to be filled in after the fact.
#[derive(Debug, Clone, Copy)]
pub struct SizeSlot {
    offset: usize,
}

impl SizeSlot {
    pub(crate) fn at(offset: usize) -> Self {
        Self { offset }
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }
}

/// Varint encoder over a fixed byte range.
pub struct StreamWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> StreamWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Varint-encode `value`. No partial write on failure.
    pub fn put(&mut self, value: u64) -> Result<()> {
        let n = varint::encode_u64(&mut self.buf[self.pos..], value)
            .ok_or(Error::OutOfBounds("can't write value, out of bounds"))?;
        self.pos += n;
        Ok(())
    }

    pub fn put_raw_u8(&mut self, value: u8) -> Result<()> {
        if self.space_left() < 1 {
            return Err(Error::OutOfBounds("can't write value, out of bounds"));
        }
        self.buf[self.pos] = value;
        self.pos += 1;
        Ok(())
    }

    pub fn put_raw_u32(&mut self, value: u32) -> Result<()> {
        self.put_raw_bytes(&value.to_le_bytes())
    }

    pub fn put_raw_u64(&mut self, value: u64) -> Result<()> {
        self.put_raw_bytes(&value.to_le_bytes())
    }

    fn put_raw_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.space_left() < bytes.len() {
            return Err(Error::OutOfBounds("can't write value, out of bounds"));
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    /// Reserve four bytes at the current position.
    pub fn allocate_u32(&mut self) -> Result<SizeSlot> {
        if self.space_left() < 4 {
            return Err(Error::OutOfBounds("can't allocate value, not enough space"));
        }
        let slot = SizeSlot { offset: self.pos };
        self.pos += 4;
        Ok(slot)
    }

    /// Fill a previously reserved slot (little-endian).
    pub fn set_slot_u32(&mut self, slot: SizeSlot, value: u32) {
        self.buf[slot.offset..slot.offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Bytes written so far.
    pub fn size(&self) -> usize {
        self.pos
    }

    pub fn space_left(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Nothing buffered in v1; present for pipeline symmetry.
    pub fn commit(&mut self) {}
}

impl UintWriter for StreamWriter<'_> {
    fn put(&mut self, value: u64) -> Result<()> {
        StreamWriter::put(self, value)
    }

    fn commit(&mut self) -> Result<()> {
        StreamWriter::commit(self);
        Ok(())
    }
}

/// Varint decoder over a fixed byte range.
pub struct StreamReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> StreamReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn next(&mut self) -> Result<u64> {
        let (value, n) = varint::decode_u64(&self.buf[self.pos..])?;
        self.pos += n;
        Ok(value)
    }

    pub fn read_raw_u8(&mut self) -> Result<u8> {
        if self.space_left() < 1 {
            return Err(Error::OutOfBounds("can't read value, out of bounds"));
        }
        let value = self.buf[self.pos];
        self.pos += 1;
        Ok(value)
    }

    pub fn read_raw_u32(&mut self) -> Result<u32> {
        let mut bytes = [0u8; 4];
        self.read_raw_bytes(&mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn read_raw_u64(&mut self) -> Result<u64> {
        let mut bytes = [0u8; 8];
        self.read_raw_bytes(&mut bytes)?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn read_raw_bytes(&mut self, dest: &mut [u8]) -> Result<()> {
        if self.space_left() < dest.len() {
            return Err(Error::OutOfBounds("can't read value, out of bounds"));
        }
        dest.copy_from_slice(&self.buf[self.pos..self.pos + dest.len()]);
        self.pos += dest.len();
        Ok(())
    }

    pub fn space_left(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn pos(&self) -> usize {
        self.pos
    }
}

impl UintReader for StreamReader<'_> {
    fn next(&mut self) -> Result<u64> {
        StreamReader::next(self)
    }
}
