//! LEB128-style variable-length integers.
//!
//! RSD firmware encodes unsigned values as little-endian base-128 groups with the
//! continuation flag in bit 7. Values are limited to 32 bits, so at most five bytes
//! are ever consumed and the fifth byte may only carry four payload bits.
//! Signed values use zig-zag mapping on top of the unsigned form.

use crate::DecodeError;

/// Maximum encoded length of a 32-bit varuint.
pub const MAX_VARUINT_LEN: usize = 5;

/// Read a varuint from `buf[pos..limit]`.
///
/// Returns the value and the position just past its final byte. `limit` is
/// clamped to `buf.len()`, so a limit past the end of the buffer can never cause
/// an out-of-range read.
///
/// # Errors
///
/// - [`DecodeError::VarintTruncated`] if the range ends before a terminating byte.
/// - [`DecodeError::VarintOverflow`] if the encoding needs more than five bytes or
///   the value does not fit in 32 bits.
pub fn read_varuint(buf: &[u8], pos: usize, limit: usize) -> Result<(u32, usize), DecodeError> {
    let limit = limit.min(buf.len());
    let mut value = 0u32;
    let mut cursor = pos;

    for index in 0..MAX_VARUINT_LEN {
        if cursor >= limit {
            return Err(DecodeError::VarintTruncated { offset: pos });
        }
        let byte = buf[cursor];
        cursor += 1;

        let payload = u32::from(byte & 0x7F);
        if index == MAX_VARUINT_LEN - 1 && (payload > 0x0F || byte & 0x80 != 0) {
            return Err(DecodeError::VarintOverflow { offset: pos });
        }
        value |= payload << (7 * index);

        if byte & 0x80 == 0 {
            return Ok((value, cursor));
        }
    }

    Err(DecodeError::VarintOverflow { offset: pos })
}

/// Read a zig-zag encoded signed varint from `buf[pos..limit]`.
pub fn read_varint(buf: &[u8], pos: usize, limit: usize) -> Result<(i32, usize), DecodeError> {
    let (raw, next) = read_varuint(buf, pos, limit)?;
    Ok((zigzag_decode(raw), next))
}

/// Map a zig-zag encoded value back to its signed form.
#[inline]
pub fn zigzag_decode(raw: u32) -> i32 {
    ((raw >> 1) as i32) ^ -((raw & 1) as i32)
}

/// Map a signed value onto the unsigned zig-zag domain.
#[inline]
pub fn zigzag_encode(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Append the varuint encoding of `value` to `out`.
pub fn write_varuint(mut value: u32, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Append the zig-zag varint encoding of `value` to `out`.
pub fn write_varint(value: i32, out: &mut Vec<u8>) {
    write_varuint(zigzag_encode(value), out);
}
