#![allow(clippy::too_many_arguments)]
#![warn(clippy::indexing_slicing, clippy::unwrap_used, clippy::panic)]

//! Streaming compression codecs and archive readers/writers behind a
//! uniform byte-stream contract: a shared Huffman/bitstream/window toolkit
//! backs the self-contained formats (`compress`, LHA), thin adapters wrap
//! third-party crates for the rest, and `dispatch` ties signature
//! recognition to decoder construction.

mod adapters;
mod archive;
mod bitstream;
mod dispatch;
mod error;
mod huffman;
mod io_ext;
mod lha;
mod lzw;
mod window;

pub use crate::adapters::{Bzip2Decoder, BrotliDecoder, LzmaDecoder, ZstdDecoder};
pub use crate::archive::{
    refine_zip_or_jar, ArReader, ArWriter, ArchiveEntry, DumpReader, EntryKind, LongNameMode,
    ZipReader, ZipWriter, JAR_MARKER_TAG,
};
pub use crate::dispatch::{detect, open, AnyDecoder, Format};
pub use crate::error::{CodecError, Result};
pub use crate::huffman::HuffmanTree;
pub use crate::io_ext::{ByteCounter, CountingReader};
pub use crate::lha::LhaDecoder;
pub use crate::lzw::LzwDecoder;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    #[test_log::test]
    fn detect_then_open_round_trips_a_compress_stream() {
        // "AA" compressed with `compress -b 9`, hand-verified in lzw.rs's
        // own tests.
        let bytes = vec![0x1F, 0x9D, 0x09, 0x41, 0x82, 0x00];
        let format = detect(&bytes).expect("should recognize the .Z signature");
        assert_eq!(format, Format::CompressZ);

        let mut decoder = open(format, Cursor::new(bytes), 0).unwrap();
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"AA");
        // `bytes_read` only counts bytes pulled through the bit reservoir,
        // not the 3-byte `.Z` header consumed before it was constructed.
        assert_eq!(decoder.bytes_read(), 3);
    }
}
