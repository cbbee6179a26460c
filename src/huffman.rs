//! Canonical Huffman decoding from a vector of code lengths.
//!
//! The tree is stored as a heap-indexed array (node `k`'s children live at
//! `2k+1` and `2k+2`) rather than as a graph of owned nodes: there is
//! exactly one way to lay out a canonical code given its length vector, so
//! index arithmetic is both simpler and cheaper than pointer-chasing.

use crate::bitstream::BitStream;
use crate::error::{CodecError, Result};
use std::io::Read;

pub const MAX_CODE_LENGTH: u32 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    Undefined,
    Node,
    Leaf(u16),
}

enum Shape {
    /// `n == 1`: the sole symbol is returned without consuming any bits.
    Single(u16),
    Tree(Vec<Slot>),
}

pub struct HuffmanTree {
    shape: Shape,
}

impl HuffmanTree {
    /// Builds a tree from code lengths `lengths[i] = L[i]`, `0 ..= 16`.
    pub fn build(lengths: &[u8]) -> Result<Self> {
        if lengths.len() == 1 {
            return Ok(HuffmanTree { shape: Shape::Single(0) });
        }

        let max_len = lengths.iter().copied().max().unwrap_or(0);
        if max_len == 0 {
            return Err(CodecError::format("huffman: empty code-length table"));
        }
        if max_len as u32 > MAX_CODE_LENGTH {
            return Err(CodecError::format(format!(
                "huffman: code length {max_len} exceeds cap of {MAX_CODE_LENGTH}"
            )));
        }

        // Canonical code assignment (RFC 1951 3.2.2): symbols of the same
        // length receive consecutive codes in ascending symbol order, which
        // is exactly the "leaves placed left-to-right in increasing symbol
        // order" invariant.
        let mut count = vec![0u32; max_len as usize + 1];
        for &l in lengths {
            if l > 0 {
                count[l as usize] += 1;
            }
        }
        let mut next_code = vec![0u32; max_len as usize + 2];
        let mut code = 0u32;
        for len in 1..=max_len as usize {
            code = (code + count[len - 1]) << 1;
            next_code[len] = code;
        }

        let size = (1usize << (max_len as usize + 1)) - 1;
        let mut nodes = vec![Slot::Undefined; size];

        for (symbol, &len) in lengths.iter().enumerate() {
            if len == 0 {
                continue;
            }
            let len = len as usize;
            let assigned = next_code[len];
            next_code[len] += 1;
            if assigned >= (1u32 << len) {
                return Err(CodecError::format(
                    "huffman: code-length table overflows its tree (too many leaves)",
                ));
            }

            let mut index = 0usize;
            for depth in 0..len {
                let bit = (assigned >> (len - 1 - depth)) & 1;
                match nodes[index] {
                    Slot::Leaf(_) => {
                        return Err(CodecError::format("huffman: overlapping canonical codes"))
                    }
                    Slot::Undefined => nodes[index] = Slot::Node,
                    Slot::Node => {}
                }
                index = 2 * index + 1 + bit as usize;
            }
            match nodes[index] {
                Slot::Undefined => nodes[index] = Slot::Leaf(symbol as u16),
                _ => return Err(CodecError::format("huffman: overlapping canonical codes")),
            }
        }

        Ok(HuffmanTree { shape: Shape::Tree(nodes) })
    }

    /// Builds a degenerate tree whose only symbol is `value`, consuming no
    /// bits on read. Used by formats (LHA) that special-case a one-entry
    /// table rather than emitting a length vector of length 1.
    pub fn single(value: u16) -> Self {
        HuffmanTree { shape: Shape::Single(value) }
    }

    /// Reads one symbol, returning `None` at end of stream mid-descent.
    pub fn read<R: Read>(&self, bits: &mut BitStream<R>) -> Result<Option<u16>> {
        match &self.shape {
            Shape::Single(v) => Ok(Some(*v)),
            Shape::Tree(nodes) => {
                let mut index = 0usize;
                loop {
                    match nodes[index] {
                        Slot::Leaf(symbol) => return Ok(Some(symbol)),
                        Slot::Undefined => {
                            return Err(CodecError::format("huffman: decoded into undefined slot"))
                        }
                        Slot::Node => {
                            let bit = match bits.read_bit()? {
                                Some(b) => b,
                                None => return Ok(None),
                            };
                            index = 2 * index + 1 + bit as usize;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::BitOrder;
    use std::io::Cursor;

    fn tree_of(lengths: &[u8]) -> HuffmanTree {
        HuffmanTree::build(lengths).unwrap()
    }

    #[test]
    fn single_symbol_consumes_no_bits() {
        let tree = HuffmanTree::build(&[3]).unwrap();
        let mut bs = BitStream::new(Cursor::new(Vec::<u8>::new()), BitOrder::Msb0);
        assert_eq!(tree.read(&mut bs).unwrap(), Some(0));
    }

    #[test]
    fn round_trips_every_symbol() {
        // symbol 0 -> len 1 ("0"), symbol 1 -> len 2 ("10"), symbol 2 -> len 2 ("11")
        let lengths = [1u8, 2, 2];
        let tree = tree_of(&lengths);
        // bit sequence "0" + "10" + "11" = "01011", padded with zeros to a byte
        let bytes = [0b0101_1000u8];
        let mut bs = BitStream::new(Cursor::new(bytes.to_vec()), BitOrder::Msb0);
        assert_eq!(tree.read(&mut bs).unwrap(), Some(0));
        assert_eq!(tree.read(&mut bs).unwrap(), Some(1));
        assert_eq!(tree.read(&mut bs).unwrap(), Some(2));
    }

    #[test]
    fn eof_mid_descent_yields_no_value() {
        let lengths = [1u8, 1];
        let tree = tree_of(&lengths);
        let mut bs = BitStream::new(Cursor::new(Vec::<u8>::new()), BitOrder::Msb0);
        assert_eq!(tree.read(&mut bs).unwrap(), None);
    }

    #[test]
    fn overlapping_lengths_are_rejected() {
        // three symbols all claiming length 1 cannot be represented (only two length-1 codes exist)
        let lengths = [1u8, 1, 1];
        assert!(HuffmanTree::build(&lengths).is_err());
    }

    #[test]
    fn all_zero_lengths_is_an_error() {
        assert!(HuffmanTree::build(&[0, 0, 0]).is_err());
    }
}
