//! Bit-oriented reading on top of an arbitrary byte source.
//!
//! `BitStream` buffers up to 64 bits in a reservoir and serves `read_bit`
//! and `read_bits` from it, refilling one byte at a time as needed. Two bit
//! orders are supported because the formats built on top of this primitive
//! disagree on which end of a byte comes first: LHA reads the most
//! significant bit of each byte first, while LZW (`.Z`) reads the least
//! significant bit first.

use std::io::Read;

use crate::error::Result;

/// Which end of each incoming byte is logically "first".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    /// Most significant bit of each byte is consumed first (LHA).
    Msb0,
    /// Least significant bit of each byte is consumed first (LZW `.Z`).
    Lsb0,
}

/// A bit-at-a-time reader over a borrowed or owned byte source.
///
/// Exactly one byte is pulled from `inner` at a time; `bytes_read` always
/// reflects the count of bytes pulled, even if some of the last byte's bits
/// are still sitting unconsumed in the reservoir.
pub struct BitStream<R> {
    inner: R,
    order: BitOrder,
    reservoir: u64,
    fill: u32,
    bytes_read: u64,
}

impl<R: Read> BitStream<R> {
    pub fn new(inner: R, order: BitOrder) -> Self {
        BitStream { inner, order, reservoir: 0, fill: 0, bytes_read: 0 }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Discards any buffered, not-yet-consumed bits and resumes reading from
    /// the next whole byte of `inner`. Used by LZW to re-align after a
    /// code-width bump or a CLEAR code (see `crate::lzw`).
    pub fn align_to_byte(&mut self) {
        self.reservoir = 0;
        self.fill = 0;
    }

    fn pull_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            return match self.inner.read(&mut byte) {
                Ok(0) => Ok(None),
                Ok(_) => {
                    self.bytes_read += 1;
                    Ok(Some(byte[0]))
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => Err(e.into()),
            };
        }
    }

    /// Buffers at least `need` bits, pulling whole bytes from `inner`.
    /// Returns `false` if the source ran dry before `need` bits were
    /// available.
    fn fill_to(&mut self, need: u32) -> Result<bool> {
        while self.fill < need {
            match self.pull_byte()? {
                None => return Ok(false),
                Some(byte) => {
                    match self.order {
                        BitOrder::Msb0 => self.reservoir = (self.reservoir << 8) | byte as u64,
                        BitOrder::Lsb0 => self.reservoir |= (byte as u64) << self.fill,
                    }
                    self.fill += 8;
                }
            }
        }
        Ok(true)
    }

    fn mask(bits: u32) -> u64 {
        if bits >= 64 {
            u64::MAX
        } else {
            (1u64 << bits) - 1
        }
    }

    /// Reads a single bit, or `None` at end of stream.
    pub fn read_bit(&mut self) -> Result<Option<u32>> {
        Ok(self.read_bits_opt(1)?.map(|v| v as u32))
    }

    /// Reads `n` bits (`1..=63`) as an unsigned value, erroring with
    /// `TruncatedStream` at end of stream.
    pub fn read_bits(&mut self, n: u32) -> Result<u64> {
        self.read_bits_opt(n)?
            .ok_or_else(|| crate::error::CodecError::truncated(format!("expected {n} more bits")))
    }

    /// Reads `n` bits (`1..=63`), returning `None` instead of erroring at
    /// end of stream.
    pub fn read_bits_opt(&mut self, n: u32) -> Result<Option<u64>> {
        assert!((1..=63).contains(&n), "read_bits_opt: n must be in 1..=63, got {n}");
        if !self.fill_to(n)? {
            return Ok(None);
        }
        let value = match self.order {
            BitOrder::Msb0 => {
                let shift = self.fill - n;
                let v = (self.reservoir >> shift) & Self::mask(n);
                self.fill -= n;
                self.reservoir &= Self::mask(self.fill);
                v
            }
            BitOrder::Lsb0 => {
                let v = self.reservoir & Self::mask(n);
                self.reservoir >>= n;
                self.fill -= n;
                v
            }
        };
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn msb0_reads_in_natural_order() {
        // 0b1011_0010 -> bits read MSB first: 1,0,1,1,0,0,1,0
        let mut bs = BitStream::new(Cursor::new(vec![0b1011_0010]), BitOrder::Msb0);
        assert_eq!(bs.read_bits(4).unwrap(), 0b1011);
        assert_eq!(bs.read_bits(4).unwrap(), 0b0010);
        assert_eq!(bs.bytes_read(), 1);
    }

    #[test]
    fn lsb0_reads_in_reverse_bit_order() {
        let mut bs = BitStream::new(Cursor::new(vec![0b1011_0010]), BitOrder::Lsb0);
        assert_eq!(bs.read_bits(4).unwrap(), 0b0010);
        assert_eq!(bs.read_bits(4).unwrap(), 0b1011);
    }

    #[test]
    fn unaligned_multi_byte_read_msb0() {
        let mut bs = BitStream::new(Cursor::new(vec![0xAB, 0xCD]), BitOrder::Msb0);
        assert_eq!(bs.read_bits(4).unwrap(), 0xA);
        assert_eq!(bs.read_bits(12).unwrap(), 0xBCD);
        assert_eq!(bs.bytes_read(), 2);
    }

    #[test]
    fn bytes_read_counts_whole_bytes_pulled_not_bits_consumed() {
        let mut bs = BitStream::new(Cursor::new(vec![0xFF, 0x00]), BitOrder::Msb0);
        bs.read_bit().unwrap();
        assert_eq!(bs.bytes_read(), 1);
        bs.read_bits(6).unwrap();
        assert_eq!(bs.bytes_read(), 1);
        bs.read_bits(2).unwrap();
        assert_eq!(bs.bytes_read(), 2);
    }

    #[test]
    fn eof_returns_none_not_error() {
        let mut bs = BitStream::new(Cursor::new(vec![0xFF]), BitOrder::Lsb0);
        bs.read_bits(8).unwrap();
        assert_eq!(bs.read_bits_opt(1).unwrap(), None);
        assert!(bs.read_bits(1).is_err());
    }

    #[test]
    fn align_to_byte_drops_buffered_bits() {
        let mut bs = BitStream::new(Cursor::new(vec![0xFF, 0x00, 0xAA]), BitOrder::Lsb0);
        bs.read_bits(3).unwrap();
        bs.align_to_byte();
        assert_eq!(bs.read_bits(8).unwrap(), 0x00);
        assert_eq!(bs.bytes_read(), 2);
    }
}
