use std::io::Read;

use brotli::Decompressor;

use crate::io_ext::{ByteCounter, CountingReader};

const DECOMPRESSOR_BUFFER_SIZE: usize = 4096;

/// Wraps `brotli::Decompressor` behind the crate's byte-counted reader
/// contract.
pub struct BrotliDecoder<R> {
    inner: Decompressor<CountingReader<R>>,
    counter: ByteCounter,
}

impl<R: Read> BrotliDecoder<R> {
    pub fn new(reader: R) -> Self {
        log::debug!("brotli: opening decoder stream");
        let counting = CountingReader::new(reader);
        let counter = counting.counter();
        BrotliDecoder { inner: Decompressor::new(counting, DECOMPRESSOR_BUFFER_SIZE), counter }
    }

    pub fn bytes_read(&self) -> u64 {
        self.counter.get()
    }
}

impl<R: Read> Read for BrotliDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}
