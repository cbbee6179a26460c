//! Format dispatch by leading-byte signature, plus the tagged-variant
//! decoder handle that replaces a per-format trait-object hierarchy (a
//! single enum implementing `Read` is cheaper and easier to reason about
//! than `Box<dyn Read>` plus a parallel `bytes_read` vtable).

use std::io::Read;

use crate::adapters::{Bzip2Decoder, BrotliDecoder, LzmaDecoder, ZstdDecoder};
use crate::error::{CodecError, Result};
use crate::lzw::LzwDecoder;

/// One of the formats this crate can recognize by signature. Not every tag
/// has a bundled decoder: `Tar`, `Cpio`, `SevenZip`, `Pack200`, `Lz4Block`,
/// and `SnappyFramed` exist only so the tag space matches the full range a
/// caller may encounter; `open` reports `UnsupportedFeature` for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Gzip,
    Bzip2,
    CompressZ,
    Lzma,
    Zstd,
    Brotli,
    Deflate,
    Ar,
    Dump,
    Zip,
    Jar,
    Tar,
    Cpio,
    SevenZip,
    Pack200,
    Lz4Frame,
    Lz4Block,
    SnappyFramed,
}

impl Format {
    pub fn tag(self) -> &'static str {
        match self {
            Format::Gzip => "gzip",
            Format::Bzip2 => "bzip2",
            Format::CompressZ => "compress-z",
            Format::Lzma => "lzma",
            Format::Zstd => "zstd",
            Format::Brotli => "brotli",
            Format::Deflate => "deflate",
            Format::Ar => "ar",
            Format::Dump => "dump",
            Format::Zip => "zip",
            Format::Jar => "jar",
            Format::Tar => "tar",
            Format::Cpio => "cpio",
            Format::SevenZip => "7z",
            Format::Pack200 => "pack200",
            Format::Lz4Frame => "lz4-frame",
            Format::Lz4Block => "lz4-block",
            Format::SnappyFramed => "snappy-framed",
        }
    }
}

struct Signature {
    min_len: usize,
    format: Format,
    matches: fn(&[u8]) -> bool,
}

fn is_deflate_zlib_header(b: &[u8]) -> bool {
    matches!(
        (b[0], b[1]),
        (0x78, 0x01) | (0x78, 0x5E) | (0x78, 0x9C) | (0x78, 0xDA)
    )
}

/// Ordered, process-wide-in-spirit registry: owned explicitly by this slice
/// rather than hidden global state, so tests can reason about it directly.
/// Order only matters among overlapping signatures, and none here overlap
/// except ZIP/JAR, which `detect` never needs to disambiguate (see
/// `refine_zip_or_jar` in `crate::archive::zip`).
const REGISTRY: &[Signature] = &[
    Signature { min_len: 2, format: Format::Gzip, matches: |b| b[0] == 0x1F && b[1] == 0x8B },
    Signature {
        min_len: 3,
        format: Format::Bzip2,
        matches: |b| b[0] == 0x42 && b[1] == 0x5A && b[2] == 0x68,
    },
    Signature { min_len: 2, format: Format::CompressZ, matches: |b| b[0] == 0x1F && b[1] == 0x9D },
    Signature {
        min_len: 3,
        format: Format::Lzma,
        matches: |b| b[0] == 0x5D && b[1] == 0x00 && b[2] == 0x00,
    },
    Signature {
        min_len: 4,
        format: Format::Zstd,
        matches: |b| b == [0x28, 0xB5, 0x2F, 0xFD],
    },
    Signature { min_len: 2, format: Format::Deflate, matches: is_deflate_zlib_header },
    Signature {
        min_len: 4,
        format: Format::Zip,
        matches: |b| b == [0x50, 0x4B, 0x03, 0x04],
    },
    Signature { min_len: 8, format: Format::Ar, matches: |b| b == b"!<arch>\n" },
    Signature {
        min_len: 6,
        format: Format::SevenZip,
        matches: |b| b == [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C],
    },
    Signature {
        min_len: 4,
        format: Format::Pack200,
        matches: |b| b == [0xCA, 0xFE, 0xD0, 0x0D],
    },
    Signature {
        min_len: 4,
        format: Format::Lz4Frame,
        matches: |b| b == [0x04, 0x22, 0x4D, 0x18],
    },
];

/// Finds the first registered signature matching the leading bytes of
/// `buffer`. Each predicate only ever inspects its own declared
/// `min_len` prefix.
pub fn detect(buffer: &[u8]) -> Option<Format> {
    let found = REGISTRY
        .iter()
        .find(|s| buffer.len() >= s.min_len && (s.matches)(&buffer[..s.min_len]))
        .map(|s| s.format);
    match found {
        Some(format) => log::debug!("dispatch: matched signature for {}", format.tag()),
        None => log::debug!("dispatch: no registered signature matched"),
    }
    found
}

/// The capability set every decoder variant exposes, replacing a
/// `Box<dyn Read>` plus a side-channel trait for `bytes_read`.
pub enum AnyDecoder<R: Read> {
    Bzip2(Bzip2Decoder<R>),
    Lzma(LzmaDecoder<R>),
    Zstd(ZstdDecoder<R>),
    Brotli(BrotliDecoder<R>),
    CompressZ(LzwDecoder<R>),
}

impl<R: Read> AnyDecoder<R> {
    pub fn bytes_read(&self) -> u64 {
        match self {
            AnyDecoder::Bzip2(d) => d.bytes_read(),
            AnyDecoder::Lzma(d) => d.bytes_read(),
            AnyDecoder::Zstd(d) => d.bytes_read(),
            AnyDecoder::Brotli(d) => d.bytes_read(),
            AnyDecoder::CompressZ(d) => d.bytes_read(),
        }
    }
}

impl<R: Read> Read for AnyDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            AnyDecoder::Bzip2(d) => d.read(buf),
            AnyDecoder::Lzma(d) => d.read(buf),
            AnyDecoder::Zstd(d) => d.read(buf),
            AnyDecoder::Brotli(d) => d.read(buf),
            AnyDecoder::CompressZ(d) => d.read(buf),
        }
    }
}

/// Detects `reader`'s format from `lookahead` and constructs the matching
/// decoder. `lookahead` must be re-fed as the start of `reader`'s contents
/// by the caller (e.g. via `std::io::Cursor::new(lookahead).chain(reader)`)
/// since `detect` only peeks, it never consumes.
pub fn open<R: Read>(format: Format, reader: R, lzma_memlimit_kib: u64) -> Result<AnyDecoder<R>> {
    log::debug!("dispatch: opening decoder for {}", format.tag());
    match format {
        Format::Bzip2 => Ok(AnyDecoder::Bzip2(Bzip2Decoder::new(reader))),
        Format::Lzma => Ok(AnyDecoder::Lzma(LzmaDecoder::new(reader, lzma_memlimit_kib)?)),
        Format::Zstd => Ok(AnyDecoder::Zstd(ZstdDecoder::new(reader)?)),
        Format::CompressZ => Ok(AnyDecoder::CompressZ(LzwDecoder::new(reader)?)),
        Format::Brotli => Ok(AnyDecoder::Brotli(BrotliDecoder::new(reader))),
        other => {
            log::error!("dispatch: {} is a recognized tag with no bundled decoder", other.tag());
            Err(CodecError::UnsupportedFeature(other.tag()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_each_required_signature() {
        assert_eq!(detect(&[0x1F, 0x8B, 0x08]), Some(Format::Gzip));
        assert_eq!(detect(b"BZh9"), Some(Format::Bzip2));
        assert_eq!(detect(&[0x1F, 0x9D, 0x90]), Some(Format::CompressZ));
        assert_eq!(detect(&[0x5D, 0x00, 0x00, 0x00]), Some(Format::Lzma));
        assert_eq!(detect(&[0x28, 0xB5, 0x2F, 0xFD]), Some(Format::Zstd));
        assert_eq!(detect(&[0x78, 0x9C, 0x00]), Some(Format::Deflate));
        assert_eq!(detect(&[0x50, 0x4B, 0x03, 0x04, 0x0A]), Some(Format::Zip));
        assert_eq!(detect(b"!<arch>\n"), Some(Format::Ar));
    }

    #[test]
    fn predicate_never_requires_bytes_past_its_min_len() {
        // a 2-byte buffer must still resolve gzip even though later
        // registry entries need more bytes than are available
        assert_eq!(detect(&[0x1F, 0x8B]), Some(Format::Gzip));
    }

    #[test]
    fn unknown_signature_is_none() {
        assert_eq!(detect(&[0, 0, 0, 0, 0, 0, 0, 0]), None);
    }

    #[test]
    fn open_reports_unsupported_for_bodyless_tags() {
        let err = open(Format::Tar, std::io::Cursor::new(Vec::<u8>::new()), 1024).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedFeature("tar")));
    }
}
