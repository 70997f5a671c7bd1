//! CRC-32 as used by Ogg page headers.
//!
//! Polynomial `0x04C11DB7`, processed MSB-first, with a zero initial value,
//! no reflection and no final XOR. This is not the zlib CRC-32.

/// Generator polynomial.
pub const POLYNOMIAL: u32 = 0x04C1_1DB7;

static TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut r = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            r = if r & 0x8000_0000 != 0 {
                (r << 1) ^ POLYNOMIAL
            } else {
                r << 1
            };
            bit += 1;
        }
        table[i] = r;
        i += 1;
    }
    table
}

/// Continue a running CRC over `data`.
///
/// Pass `0` as `previous` to start a new checksum. Chaining calls over
/// consecutive slices gives the same result as one call over their
/// concatenation, which is how page header and payload are combined.
pub fn crc32(data: &[u8], previous: u32) -> u32 {
    data.iter().fold(previous, |crc, &byte| {
        (crc << 8) ^ TABLE[(((crc >> 24) as u8) ^ byte) as usize]
    })
}
