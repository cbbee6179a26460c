//! The classical `.Z` (`compress`) LZW decoder: table growth, code-width
//! transitions with 8-symbol alignment skips, and the KwKwK special case.

use std::io::Read;

use crate::bitstream::{BitOrder, BitStream};
use crate::error::{CodecError, Result};

const MAGIC: [u8; 2] = [0x1F, 0x9D];
const CLEAR: i32 = 256;
const INITIAL_WIDTH: u32 = 9;

struct LzwTable {
    prefix: Vec<i32>,
    suffix: Vec<u8>,
    size: usize,
    block_mode: bool,
}

impl LzwTable {
    fn new(max_width: u32, block_mode: bool) -> Self {
        let capacity = 1usize << max_width;
        let mut prefix = vec![-1i32; capacity];
        let mut suffix = vec![0u8; capacity];
        for i in 0..256usize {
            prefix[i] = -1;
            suffix[i] = i as u8;
        }
        LzwTable { prefix, suffix, size: if block_mode { 257 } else { 256 }, block_mode }
    }

    fn reset(&mut self) {
        self.size = if self.block_mode { 257 } else { 256 };
    }

    fn first_char(&self, mut code: i32) -> u8 {
        while self.prefix[code as usize] != -1 {
            code = self.prefix[code as usize];
        }
        self.suffix[code as usize]
    }

    /// Appends a new entry, ignoring the call once the table is at capacity
    /// (the encoder stops growing it too, relying on existing entries).
    fn add_entry(&mut self, prefix: i32, suffix: u8) {
        if self.size < self.prefix.len() {
            self.prefix[self.size] = prefix;
            self.suffix[self.size] = suffix;
            self.size += 1;
        }
    }

    /// Pushes the expansion of `code` onto `stack` such that popping the
    /// stack yields the bytes in forward output order.
    fn expand_onto(&self, mut code: i32, stack: &mut Vec<u8>) {
        loop {
            stack.push(self.suffix[code as usize]);
            let p = self.prefix[code as usize];
            if p == -1 {
                break;
            }
            code = p;
        }
    }
}

/// Streaming decoder for the `compress`/`.Z` LZW format.
pub struct LzwDecoder<R> {
    bits: BitStream<R>,
    table: LzwTable,
    code_width: u32,
    max_width: u32,
    prev: i32,
    codes_since_align: u64,
    stack: Vec<u8>,
    finished: bool,
}

impl<R: Read> LzwDecoder<R> {
    /// Reads and validates the 3-byte `.Z` header, then wraps the remainder
    /// of `reader` as a little-endian-bit stream.
    pub fn new(mut reader: R) -> Result<Self> {
        let mut header = [0u8; 3];
        reader.read_exact(&mut header).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                CodecError::truncated("'.Z' header truncated".to_string())
            }
            _ => e.into(),
        })?;
        if header[0] != MAGIC[0] || header[1] != MAGIC[1] {
            log::error!("'.Z' magic mismatch: got {:02x} {:02x}", header[0], header[1]);
            return Err(CodecError::format("not a '.Z' (LZW compress) stream"));
        }
        let max_width = (header[2] & 0x1F) as u32;
        let block_mode = header[2] & 0x80 != 0;
        if !(INITIAL_WIDTH..=16).contains(&max_width) {
            log::error!("'.Z' stream declares invalid max code width {max_width}");
            return Err(CodecError::format(format!(
                "'.Z' stream declares invalid max code width {max_width}"
            )));
        }
        log::debug!("'.Z' header: max_width={max_width}, block_mode={block_mode}");
        Ok(LzwDecoder {
            bits: BitStream::new(reader, BitOrder::Lsb0),
            table: LzwTable::new(max_width, block_mode),
            code_width: INITIAL_WIDTH,
            max_width,
            prev: -1,
            codes_since_align: 0,
            stack: Vec::new(),
            finished: false,
        })
    }

    fn next_code(&mut self) -> Result<Option<i32>> {
        let code = self.bits.read_bits_opt(self.code_width)?;
        if code.is_some() {
            self.codes_since_align += 1;
        }
        Ok(code.map(|v| v as i32))
    }

    /// Discards the garbage codes left over in the current 8-code group at
    /// the old width, then drops any partial byte so the next code starts
    /// on a byte boundary.
    fn realign(&mut self) -> Result<()> {
        let skip = (8 - self.codes_since_align % 8) % 8;
        for _ in 0..skip {
            if self.bits.read_bits_opt(self.code_width)?.is_none() {
                break;
            }
        }
        self.bits.align_to_byte();
        self.codes_since_align = 0;
        Ok(())
    }

    /// Decodes (at most) one code and pushes its expansion onto the output
    /// stack. Returns `false` at clean end of stream. A CLEAR code is a
    /// legitimate "decoded nothing, not EOF" outcome, matching §4.3's
    /// reading-window rule; the caller's loop simply tries again.
    fn step(&mut self) -> Result<bool> {
        let code = match self.next_code()? {
            None => return Ok(false),
            Some(c) => c,
        };

        if self.table.block_mode && code == CLEAR {
            log::debug!("LZW: CLEAR code, resetting table");
            self.table.reset();
            self.realign()?;
            self.code_width = INITIAL_WIDTH;
            self.prev = -1;
            return Ok(true);
        }

        let mut table_grown = false;
        if code as usize == self.table.size {
            if self.prev == -1 {
                log::error!("LZW: KwKwK code with no previous entry");
                return Err(CodecError::format("LZW: KwKwK code with no previous entry"));
            }
            let first = self.table.first_char(self.prev);
            self.table.add_entry(self.prev, first);
            table_grown = true;
        } else if code as usize > self.table.size {
            log::error!("LZW: code {code} exceeds table size {}", self.table.size);
            return Err(CodecError::format(format!(
                "LZW: code {code} exceeds table size {}",
                self.table.size
            )));
        }

        let mark = self.stack.len();
        self.table.expand_onto(code, &mut self.stack);
        let first_char = self.stack[self.stack.len() - 1];
        debug_assert!(self.stack.len() > mark);

        if !table_grown && self.prev != -1 {
            self.table.add_entry(self.prev, first_char);
        }

        self.prev = code;

        if self.table.size == (1usize << self.code_width) && self.code_width < self.max_width {
            self.realign()?;
            self.code_width += 1;
        }

        Ok(true)
    }

    /// Reads the next decoded byte, or `None` at end of stream.
    pub fn read_next(&mut self) -> Result<Option<u8>> {
        loop {
            if let Some(b) = self.stack.pop() {
                return Ok(Some(b));
            }
            if self.finished {
                return Ok(None);
            }
            if !self.step()? {
                self.finished = true;
                return Ok(None);
            }
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bits.bytes_read()
    }
}

impl<R: Read> Read for LzwDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            match self.read_next() {
                Ok(Some(b)) => {
                    buf[written] = b;
                    written += 1;
                }
                Ok(None) => break,
                Err(e) => return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn decodes_two_literal_codes() {
        // max width 9, block mode off: the encoder for "AA" emits code 65
        // ('A') twice, never reaching the grown code 256 it allocates
        // along the way. Both 9-bit codes packed LSB-first: 0x41 0x82 0x00.
        let input: [u8; 6] = [0x1F, 0x9D, 0x09, 0x41, 0x82, 0x00];
        let mut dec = LzwDecoder::new(Cursor::new(input)).unwrap();
        let mut out = Vec::new();
        while let Some(b) = dec.read_next().unwrap() {
            out.push(b);
        }
        assert_eq!(out, b"AA");
    }

    #[test]
    fn rejects_bad_magic() {
        let input = [0x1F, 0x8B, 0x90];
        assert!(LzwDecoder::new(Cursor::new(input)).is_err());
    }

    #[test]
    fn kwkwk_as_first_code_is_an_error() {
        // width 9, block mode off, max width 16: first code equal to table
        // size (256) before any prefix has been established.
        let header = [0x1F, 0x9D, 16];
        let mut bytes = header.to_vec();
        // code 256 (0b1_0000_0000) packed LSB-first across two bytes
        bytes.extend_from_slice(&[0x00, 0x01]);
        let mut dec = LzwDecoder::new(Cursor::new(bytes)).unwrap();
        assert!(dec.read_next().is_err());
    }

    #[test]
    fn read_impl_stops_at_eof() {
        let input: [u8; 6] = [0x1F, 0x9D, 0x09, 0x41, 0x82, 0x00];
        let mut dec = LzwDecoder::new(Cursor::new(input)).unwrap();
        let mut out = Vec::new();
        std::io::Read::read_to_end(&mut dec, &mut out).unwrap();
        assert_eq!(out, b"AA");
    }
}
