//! LHA's lh4/lh5/lh6/lh7 compression methods: per-block Huffman tables over
//! a sliding-window LZ77 output, built on the shared bit reader, canonical
//! Huffman decoder, and circular buffer.

use std::io::Read;

use crate::bitstream::{BitOrder, BitStream};
use crate::error::{CodecError, Result};
use crate::huffman::{HuffmanTree, MAX_CODE_LENGTH};
use crate::window::CircularBuffer;

const NUM_COMMANDS: usize = 510;
const NUM_TEMP_CODELEN: usize = 19;
const MAX_OFFSET_CODELEN: usize = 32;
const COPY_THRESHOLD: u64 = 3;
const MAX_MATCH: usize = 256;

/// Per-method dictionary size and distance-tree count width.
#[derive(Debug, Clone, Copy)]
pub struct LhaVariant {
    pub distance_bits: u32,
    pub dict_size: usize,
}

pub const LH4: LhaVariant = LhaVariant { distance_bits: 4, dict_size: 4 * 1024 };
pub const LH5: LhaVariant = LhaVariant { distance_bits: 4, dict_size: 8 * 1024 };
pub const LH6: LhaVariant = LhaVariant { distance_bits: 5, dict_size: 32 * 1024 };
pub const LH7: LhaVariant = LhaVariant { distance_bits: 5, dict_size: 64 * 1024 };

pub struct LhaDecoder<R> {
    bits: BitStream<R>,
    window: CircularBuffer,
    command_tree: HuffmanTree,
    offset_tree: HuffmanTree,
    remaining_commands: u32,
    distance_bits: u32,
    finished: bool,
}

impl<R: Read> LhaDecoder<R> {
    pub fn new(reader: R, variant: LhaVariant) -> Self {
        LhaDecoder {
            bits: BitStream::new(reader, BitOrder::Msb0),
            window: CircularBuffer::new(variant.dict_size + MAX_MATCH),
            command_tree: HuffmanTree::single(0),
            offset_tree: HuffmanTree::single(0),
            remaining_commands: 0,
            distance_bits: variant.distance_bits,
            finished: false,
        }
    }

    // Usually 0..=7, but the 7-escape can push it arbitrarily higher before
    // the 16 cap rejects it.
    fn read_code_length(&mut self) -> Result<u8> {
        let mut len = self.bits.read_bits(3)? as u8;
        if len == 7 {
            while self.bits.read_bits(1)? == 1 {
                len = len
                    .checked_add(1)
                    .filter(|&l| l <= MAX_CODE_LENGTH as u8)
                    .ok_or_else(|| CodecError::format("LHA: code length overflow"))?;
            }
        }
        if len as u32 > MAX_CODE_LENGTH {
            return Err(CodecError::format("LHA: code length exceeds 16"));
        }
        Ok(len)
    }

    fn read_code_skip(&mut self, skip_range: u16) -> Result<usize> {
        let (bits, increment) = match skip_range {
            0 => return Ok(1),
            1 => (4, 3),
            _ => (9, 20),
        };
        Ok(self.bits.read_bits(bits)? as usize + increment)
    }

    /// Reads the sparse-encoded length table that in turn describes the
    /// command tree's own code lengths.
    fn read_temp_tree(&mut self) -> Result<HuffmanTree> {
        let num_codes = self.bits.read_bits(5)? as usize;
        if num_codes == 0 {
            let code = self.bits.read_bits(5)? as u16;
            return Ok(HuffmanTree::single(code));
        }
        if num_codes > NUM_TEMP_CODELEN {
            log::error!("LHA: temp code-length table too large ({num_codes})");
            return Err(CodecError::format("LHA: temp code-length table too large"));
        }

        let mut lengths = [0u8; NUM_TEMP_CODELEN];
        for p in lengths[0..num_codes.min(3)].iter_mut() {
            *p = self.read_code_length()?;
        }
        let skip = self.bits.read_bits(2)? as usize;
        let start = 3 + skip;
        if start < num_codes {
            for p in lengths[start..num_codes].iter_mut() {
                *p = self.read_code_length()?;
            }
        }

        HuffmanTree::build(&lengths[0..num_codes])
    }

    fn read_command_tree(&mut self) -> Result<HuffmanTree> {
        let temp_tree = self.read_temp_tree()?;

        let num_codes = self.bits.read_bits(9)? as usize;
        if num_codes == 0 {
            let code = self.bits.read_bits(9)? as u16;
            return Ok(HuffmanTree::single(code));
        }
        if num_codes > NUM_COMMANDS {
            log::error!("LHA: command code-length table too large ({num_codes})");
            return Err(CodecError::format("LHA: command code-length table too large"));
        }

        let mut lengths = [0u8; NUM_COMMANDS];
        let mut index = 0usize;
        'outer: while index < num_codes {
            let mut n = 0usize;
            while index + n < num_codes {
                let code = temp_tree
                    .read(&mut self.bits)?
                    .ok_or_else(|| CodecError::truncated("LHA: command code lengths truncated"))?;
                if code <= 2 {
                    let skip_count = self.read_code_skip(code)?;
                    index += n + skip_count;
                    continue 'outer;
                }
                let len = code
                    .checked_sub(2)
                    .filter(|&l| l as u32 <= MAX_CODE_LENGTH)
                    .ok_or_else(|| CodecError::format("LHA: invalid command code length"))?;
                lengths[index + n] = len as u8;
                n += 1;
            }
            break;
        }

        HuffmanTree::build(&lengths[0..num_codes])
    }

    fn read_offset_tree(&mut self) -> Result<HuffmanTree> {
        let num_codes = self.bits.read_bits(self.distance_bits)? as usize;
        if num_codes == 0 {
            let code = self.bits.read_bits(self.distance_bits)? as u16;
            return Ok(HuffmanTree::single(code));
        }
        if num_codes > MAX_OFFSET_CODELEN {
            log::error!("LHA: distance code-length table too large ({num_codes})");
            return Err(CodecError::format("LHA: distance code-length table too large"));
        }

        let mut lengths = [0u8; MAX_OFFSET_CODELEN];
        for p in lengths[0..num_codes].iter_mut() {
            *p = self.read_code_length()?;
        }

        HuffmanTree::build(&lengths[0..num_codes])
    }

    /// Returns `false` at a clean block boundary with no further blocks.
    fn begin_new_block(&mut self) -> Result<bool> {
        let count = match self.bits.read_bits_opt(16)? {
            None => return Ok(false),
            Some(c) => c as u32,
        };
        log::debug!("LHA: starting block with {count} commands");
        self.remaining_commands = count;
        self.command_tree = self.read_command_tree()?;
        self.offset_tree = self.read_offset_tree()?;
        Ok(true)
    }

    fn read_distance(&mut self) -> Result<u64> {
        let class = self
            .offset_tree
            .read(&mut self.bits)?
            .ok_or_else(|| CodecError::truncated("LHA: distance class truncated"))? as u64;
        if class <= 1 {
            Ok(class)
        } else {
            let low = self.bits.read_bits((class - 1) as u32)?;
            Ok(low | (1 << (class - 1)))
        }
    }

    fn step(&mut self) -> Result<bool> {
        while self.remaining_commands == 0 {
            if !self.begin_new_block()? {
                return Ok(false);
            }
        }
        self.remaining_commands -= 1;

        let command = self
            .command_tree
            .read(&mut self.bits)?
            .ok_or_else(|| CodecError::truncated("LHA: command truncated"))?;

        if command < 256 {
            self.window.put(command as u8)?;
        } else {
            let distance = self.read_distance()?;
            let length = (command - 256) as u64 + COPY_THRESHOLD;
            self.window.copy(distance + 1, length)?;
        }
        Ok(true)
    }

    /// Reads the next decoded byte, or `None` at a clean block-boundary EOF.
    pub fn read_next(&mut self) -> Result<Option<u8>> {
        loop {
            if let Some(b) = self.window.get() {
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
}

impl<R: Read> Read for LhaDecoder<R> {
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
    use crate::bitstream::BitOrder as Order;
    use std::io::Cursor;

    /// Packs a sequence of (value, width) bit-fields MSB-first into bytes.
    fn pack(fields: &[(u64, u32)]) -> Vec<u8> {
        let mut bits: Vec<u8> = Vec::new();
        for &(value, width) in fields {
            for i in (0..width).rev() {
                bits.push(((value >> i) & 1) as u8);
            }
        }
        while bits.len() % 8 != 0 {
            bits.push(0);
        }
        bits.chunks(8)
            .map(|chunk| chunk.iter().fold(0u8, |acc, &b| (acc << 1) | b))
            .collect()
    }

    #[test]
    fn single_literal_block_then_eof() {
        // One block, one command. Temp tree: single code (num_codes=0) fixed
        // to value 0 -> the command tree reader skips straight to "single
        // code" too since we drive it from a command-tree num_codes=0 path
        // instead, to keep the fixture simple: command tree is a single
        // code (0x41), distance tree is a single code (unused for a literal).
        let fields = [
            (1u64, 16),  // remaining_commands = 1
            (0, 5),      // temp tree: num_codes = 0
            (0, 5),      // temp tree: single code value (irrelevant, unused)
            (0, 9),      // command tree: num_codes = 0 (single code)
            (0x41, 9),   // command tree: single code value = literal 'A'
            (0, 4),      // distance tree: num_codes = 0 (lh5 distance_bits=4)
            (0, 4),      // distance tree: single code value (unused)
        ];
        let bytes = pack(&fields);
        let mut dec = LhaDecoder::new(Cursor::new(bytes), LH5);
        assert_eq!(dec.read_next().unwrap(), Some(0x41));
        assert_eq!(dec.read_next().unwrap(), None);
    }

    #[test]
    fn bitstream_order_is_msb_first() {
        // sanity check on the pack() helper itself, independent of LhaDecoder
        let bytes = pack(&[(0b101, 3), (0b1, 1)]);
        let mut bs = BitStream::new(Cursor::new(bytes), Order::Msb0);
        assert_eq!(bs.read_bits(3).unwrap(), 0b101);
        assert_eq!(bs.read_bits(1).unwrap(), 1);
    }
}
