use std::io::{ErrorKind, Read};

use crate::error::{PageError, Result};

/// Widest value a single [`BitReader::read`] call can return.
pub const MAX_READ_BITS: u32 = 32;

/// Reads big-endian, sub-byte values from any `Read` source.
///
/// Bits are consumed most significant first. The reader pulls one byte at a
/// time from the source and keeps the unconsumed low bits of that byte
/// pending until the next call.
///
/// Reads that run into the end of the source return `Ok(None)` and latch
/// [`BitReader::is_eof`]. Bits gathered by such a read are discarded.
pub struct BitReader<R> {
    inner: R,
    pending_byte: u8,
    pending_bits: u32,
    eof: bool,
}

impl<R: Read> BitReader<R> {
    /// Create a bit reader positioned at the first bit of `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending_byte: 0,
            pending_bits: 0,
            eof: false,
        }
    }

    /// Read `bits` bits (at most 32) as an unsigned value.
    pub fn read(&mut self, bits: u32) -> Result<Option<u32>> {
        if bits > MAX_READ_BITS {
            return Err(PageError::InvalidBitWidth(bits));
        }

        let mut value: u64 = 0;
        let mut remaining = bits;
        while remaining > 0 {
            if self.pending_bits == 0 && !self.refill()? {
                return Ok(None);
            }

            let take = remaining.min(self.pending_bits);
            let shift = self.pending_bits - take;
            let mask = ((1u16 << take) - 1) as u8;
            let chunk = (self.pending_byte >> shift) & mask;

            value = (value << take) | u64::from(chunk);
            self.pending_bits -= take;
            remaining -= take;
        }

        Ok(Some(value as u32))
    }

    /// Read a single bit.
    pub fn read_bit(&mut self) -> Result<Option<bool>> {
        Ok(self.read(1)?.map(|bit| bit == 1))
    }

    /// Count 1-bits up to the next 0-bit, consuming the terminating zero.
    ///
    /// Stops early at end of input; the count seen so far is returned and
    /// [`BitReader::is_eof`] is set.
    pub fn bits_to_next_zero(&mut self) -> Result<u32> {
        self.count_run(true)
    }

    /// Count 0-bits up to the next 1-bit, consuming the terminating one.
    pub fn bits_to_next_one(&mut self) -> Result<u32> {
        self.count_run(false)
    }

    /// Discard the rest of the current byte, returning the discarded bits.
    ///
    /// Returns `Some(0)` when already aligned and `None` once the source
    /// is exhausted.
    pub fn read_to_byte_boundary(&mut self) -> Result<Option<u32>> {
        if self.eof {
            return Ok(None);
        }
        if self.pending_bits == 0 {
            return Ok(Some(0));
        }
        self.read(self.pending_bits)
    }

    /// Whether a read has hit the end of the source.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Number of bits left over from the last byte pulled from the source.
    pub fn pending_bits(&self) -> u32 {
        self.pending_bits
    }

    /// Consume the reader and return the inner source.
    ///
    /// Pending sub-byte bits are lost.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn count_run(&mut self, run_bit: bool) -> Result<u32> {
        let mut count = 0;
        while let Some(bit) = self.read_bit()? {
            if bit != run_bit {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    fn refill(&mut self) -> Result<bool> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(false);
                }
                Ok(_) => {
                    self.pending_byte = byte[0];
                    self.pending_bits = 8;
                    return Ok(true);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(PageError::Io(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn reader(bytes: &[u8]) -> BitReader<Cursor<Vec<u8>>> {
        BitReader::new(Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn reads_sub_byte_fields_then_eof() {
        let mut bits = reader(&[0b1011_0100]);

        assert_eq!(bits.read(3).unwrap(), Some(0b101));
        assert_eq!(bits.read(5).unwrap(), Some(0b10100));
        assert!(!bits.is_eof());

        assert_eq!(bits.read(1).unwrap(), None);
        assert!(bits.is_eof());
    }

    #[test]
    fn reads_across_byte_boundaries() {
        let mut bits = reader(&[0xAB, 0xCD, 0xEF]);

        assert_eq!(bits.read(4).unwrap(), Some(0xA));
        assert_eq!(bits.read(12).unwrap(), Some(0xBCD));
        assert_eq!(bits.read(8).unwrap(), Some(0xEF));
    }

    #[test]
    fn reads_full_32_bits() {
        let mut bits = reader(&[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(bits.read(32).unwrap(), Some(0xDEAD_BEEF));
    }

    #[test]
    fn rejects_reads_wider_than_accumulator() {
        let mut bits = reader(&[0; 8]);
        let err = bits.read(33).unwrap_err();
        assert!(matches!(err, PageError::InvalidBitWidth(33)));
    }

    #[test]
    fn partial_read_at_eof_is_discarded() {
        let mut bits = reader(&[0xFF]);
        assert_eq!(bits.read(12).unwrap(), None);
        assert!(bits.is_eof());
        assert_eq!(bits.read(1).unwrap(), None);
    }

    #[test]
    fn zero_width_read_consumes_nothing() {
        let mut bits = reader(&[0x80]);
        assert_eq!(bits.read(0).unwrap(), Some(0));
        assert_eq!(bits.read_bit().unwrap(), Some(true));
    }

    #[test]
    fn unary_runs() {
        // 1110 0001 1...
        let mut bits = reader(&[0b1110_0001, 0b1000_0000]);

        assert_eq!(bits.bits_to_next_zero().unwrap(), 3);
        assert_eq!(bits.bits_to_next_one().unwrap(), 3);
        assert_eq!(bits.bits_to_next_zero().unwrap(), 1);
    }

    #[test]
    fn unary_run_stops_at_eof() {
        let mut bits = reader(&[0xFF]);
        assert_eq!(bits.bits_to_next_zero().unwrap(), 8);
        assert!(bits.is_eof());
    }

    #[test]
    fn byte_boundary_returns_leftover_bits() {
        let mut bits = reader(&[0b1010_0110, 0x42]);

        assert_eq!(bits.read(3).unwrap(), Some(0b101));
        assert_eq!(bits.pending_bits(), 5);
        assert_eq!(bits.read_to_byte_boundary().unwrap(), Some(0b00110));
        assert_eq!(bits.read_to_byte_boundary().unwrap(), Some(0));
        assert_eq!(bits.read(8).unwrap(), Some(0x42));

        assert_eq!(bits.read(1).unwrap(), None);
        assert_eq!(bits.read_to_byte_boundary().unwrap(), None);
    }
}
