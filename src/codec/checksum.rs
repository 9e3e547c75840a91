//! RSD sub-record checksum.
//!
//! The firmware runs a plain MSB-first CRC over polynomial `0x04C11DB7` starting
//! from zero, then bit-reverses the 32-bit register and inverts it. This is not
//! CRC-32/IEEE (which reflects every input byte); the two agree on nothing but
//! the polynomial, so swapping in a stock CRC crate would reject every record.

const POLY: u32 = 0x04C1_1DB7;

const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut index = 0;
    while index < 256 {
        let mut crc = (index as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 { (crc << 1) ^ POLY } else { crc << 1 };
            bit += 1;
        }
        table[index] = crc;
        index += 1;
    }
    table
}

/// Compute the RSD checksum of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    let register = data.iter().fold(0u32, |crc, &byte| {
        TABLE[((crc >> 24) ^ u32::from(byte)) as usize] ^ (crc << 8)
    });
    register.reverse_bits() ^ 0xFFFF_FFFF
}
