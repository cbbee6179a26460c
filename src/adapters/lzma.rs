use std::io::{Chain, Cursor, Read};

use xz2::read::XzDecoder;
use xz2::stream::Stream;

use crate::error::{CodecError, Result};
use crate::io_ext::{ByteCounter, CountingReader};

const HEADER_LEN: usize = 13;

type Source<R> = Chain<Cursor<[u8; HEADER_LEN]>, CountingReader<R>>;

/// Wraps `xz2::read::XzDecoder` (liblzma) behind the crate's byte-counted
/// reader contract, with a caller-supplied working-memory cap.
///
/// The classic `.lzma` header carries its dictionary size in bytes 1..5;
/// construction reads just those 13 header bytes and rejects streams whose
/// declared dictionary exceeds `memlimit_kib` before liblzma (or any
/// payload byte) is ever touched.
pub struct LzmaDecoder<R> {
    inner: XzDecoder<Source<R>>,
    counter: ByteCounter,
}

impl<R: Read> LzmaDecoder<R> {
    pub fn new(reader: R, memlimit_kib: u64) -> Result<Self> {
        let mut counting = CountingReader::new(reader);
        let counter = counting.counter();

        let mut header = [0u8; HEADER_LEN];
        counting.read_exact(&mut header).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                CodecError::truncated("lzma header truncated".to_string())
            }
            _ => e.into(),
        })?;

        let dict_size = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as u64;
        let dict_kib = dict_size.div_ceil(1024);
        log::debug!("lzma header: dict_size={dict_size} bytes ({dict_kib} KiB), limit={memlimit_kib} KiB");
        if dict_kib > memlimit_kib {
            log::error!("lzma: dictionary {dict_kib} KiB exceeds limit {memlimit_kib} KiB");
            return Err(CodecError::MemoryLimit { requested: dict_kib, limit: memlimit_kib });
        }

        let stream = Stream::new_lzma_decoder(memlimit_kib.saturating_mul(1024)).map_err(|e| {
            log::error!("lzma: failed to construct decoder stream: {e}");
            CodecError::format(format!("lzma: {e}"))
        })?;
        let source = Cursor::new(header).chain(counting);
        Ok(LzmaDecoder { inner: XzDecoder::new_stream(source, stream), counter })
    }

    pub fn bytes_read(&self) -> u64 {
        self.counter.get()
    }
}

impl<R: Read> Read for LzmaDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn header_with_dict_size(bytes: u32) -> [u8; HEADER_LEN] {
        let mut h = [0u8; HEADER_LEN];
        h[0] = 0x5D; // a typical LZMA1 properties byte
        h[1..5].copy_from_slice(&bytes.to_le_bytes());
        h[5..13].copy_from_slice(&u64::MAX.to_le_bytes()); // unknown uncompressed size
        h
    }

    #[test]
    fn rejects_oversized_dictionary_before_reading_payload() {
        let header = header_with_dict_size(128 * 1024 * 1024); // 128 MiB
        let input = IoCursor::new(header.to_vec());
        let result = LzmaDecoder::new(input, 1024); // 1 MiB limit
        match result {
            Err(CodecError::MemoryLimit { requested, limit }) => {
                assert_eq!(limit, 1024);
                assert!(requested > limit);
            }
            other => panic!("expected MemoryLimit, got {other:?}"),
        }
    }

    #[test]
    fn accepts_dictionary_within_limit() {
        let header = header_with_dict_size(64 * 1024); // 64 KiB
        let input = IoCursor::new(header.to_vec());
        let result = LzmaDecoder::new(input, 1024);
        assert!(result.is_ok());
        assert_eq!(result.unwrap().bytes_read(), HEADER_LEN as u64);
    }
}
