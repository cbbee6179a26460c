use std::io::Read;

use zstd::stream::read::Decoder as InnerDecoder;

use crate::error::{CodecError, Result};
use crate::io_ext::{ByteCounter, CountingReader};

/// Wraps `zstd::stream::read::Decoder` behind the crate's byte-counted
/// reader contract.
pub struct ZstdDecoder<R: Read> {
    inner: InnerDecoder<'static, std::io::BufReader<CountingReader<R>>>,
    counter: ByteCounter,
}

impl<R: Read> ZstdDecoder<R> {
    pub fn new(reader: R) -> Result<Self> {
        log::debug!("zstd: opening decoder stream");
        let counting = CountingReader::new(reader);
        let counter = counting.counter();
        let inner = InnerDecoder::new(counting).map_err(|e| {
            log::error!("zstd: failed to open decoder stream: {e}");
            CodecError::format(e.to_string())
        })?;
        Ok(ZstdDecoder { inner, counter })
    }

    pub fn bytes_read(&self) -> u64 {
        self.counter.get()
    }
}

impl<R: Read> Read for ZstdDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn rejects_non_zstd_input() {
        let result = ZstdDecoder::new(Cursor::new(vec![0u8; 16]));
        assert!(result.is_err());
    }
}
