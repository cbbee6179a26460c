//! Thin wrappers around third-party decompressors, behind the crate's
//! uniform `Read` + `bytes_read` contract. No arithmetic coding is
//! reimplemented here; each adapter owns the real crate's reader and a
//! byte counter over the compressed side.

mod bzip2;
mod lzma;
mod zstd;

mod brotli;

pub use self::bzip2::Bzip2Decoder;
pub use self::brotli::BrotliDecoder;
pub use self::lzma::LzmaDecoder;
pub use self::zstd::ZstdDecoder;
