//! Bounds-checked cursor over a borrowed byte range.
//!
//! [`ByteView`] is the only way decoders touch file bytes. Every read checks the
//! requested span against the view's limit and reports a [`DecodeError`] instead
//! of panicking, so garbage lengths read from a torn record can never index past
//! the mapped file.

use super::varint;
use crate::DecodeError;

/// Cursor over `data[pos..limit]` with checked reads.
#[derive(Debug, Clone, Copy)]
pub struct ByteView<'a> {
    data: &'a [u8],
    pos: usize,
    limit: usize,
}

impl<'a> ByteView<'a> {
    /// Create a view starting at `pos`. `limit` is clamped to `data.len()`.
    pub fn new(data: &'a [u8], pos: usize, limit: usize) -> Self {
        Self { data, pos, limit: limit.min(data.len()) }
    }

    /// Current absolute position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Absolute end of the readable range.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes left before the limit.
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.pos)
    }

    /// The full underlying buffer.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn read_varuint(&mut self) -> Result<u32, DecodeError> {
        let (value, next) = varint::read_varuint(self.data, self.pos, self.limit)?;
        self.pos = next;
        Ok(value)
    }

    pub fn read_varint(&mut self) -> Result<i32, DecodeError> {
        let (value, next) = varint::read_varint(self.data, self.pos, self.limit)?;
        self.pos = next;
        Ok(value)
    }

    /// Borrow the next `len` bytes and advance past them.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.checked_end(len)?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Advance by `len` bytes without reading them.
    pub fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.pos = self.checked_end(len)?;
        Ok(())
    }

    pub fn read_u32_le(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Look at the next little-endian u32 without consuming it.
    pub fn peek_u32_le(&self) -> Option<u32> {
        let end = self.checked_end(4).ok()?;
        u32_le_at(&self.data[..end], self.pos)
    }

    fn checked_end(&self, len: usize) -> Result<usize, DecodeError> {
        match self.pos.checked_add(len) {
            Some(end) if end <= self.limit => Ok(end),
            _ => Err(DecodeError::BufferOverrun {
                offset: self.pos,
                needed: len,
                limit: self.limit,
            }),
        }
    }
}

/// Little-endian u32 at `offset`, or `None` if fewer than four bytes remain.
#[inline]
pub fn u32_le_at(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Little-endian i32 at `offset`, or `None` if fewer than four bytes remain.
#[inline]
pub fn i32_le_at(data: &[u8], offset: usize) -> Option<i32> {
    u32_le_at(data, offset).map(|v| v as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_respects_limit_not_buffer_length() {
        let data = [1u8, 2, 3, 4, 5, 6];
        let mut view = ByteView::new(&data, 1, 4);
        assert_eq!(view.take(2), Ok(&data[1..3]));
        assert_eq!(view.remaining(), 1);
        assert_eq!(
            view.take(2),
            Err(DecodeError::BufferOverrun { offset: 3, needed: 2, limit: 4 })
        );
        // A failed read leaves the cursor where it was.
        assert_eq!(view.position(), 3);
    }

    #[test]
    fn huge_lengths_do_not_overflow() {
        let data = [0u8; 8];
        let mut view = ByteView::new(&data, 4, 8);
        assert!(matches!(view.take(usize::MAX), Err(DecodeError::BufferOverrun { .. })));
        assert!(matches!(view.skip(usize::MAX - 1), Err(DecodeError::BufferOverrun { .. })));
    }

    #[test]
    fn u32_reads() {
        let data = 0xB7E9_DA86u32.to_le_bytes();
        let mut view = ByteView::new(&data, 0, data.len());
        assert_eq!(view.peek_u32_le(), Some(0xB7E9_DA86));
        assert_eq!(view.read_u32_le(), Ok(0xB7E9_DA86));
        assert_eq!(view.peek_u32_le(), None);
        assert_eq!(u32_le_at(&data, 1), None);
        assert_eq!(u32_le_at(&data, usize::MAX), None);
        assert_eq!(i32_le_at(&(-5i32).to_le_bytes(), 0), Some(-5));
    }
}
