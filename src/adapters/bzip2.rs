use std::io::Read;

use bzip2::read::BzDecoder;

use crate::io_ext::{ByteCounter, CountingReader};

/// Wraps `bzip2::read::BzDecoder` behind the crate's byte-counted reader
/// contract.
pub struct Bzip2Decoder<R> {
    inner: BzDecoder<CountingReader<R>>,
    counter: ByteCounter,
}

impl<R: Read> Bzip2Decoder<R> {
    pub fn new(reader: R) -> Self {
        log::debug!("bzip2: opening decoder stream");
        let counting = CountingReader::new(reader);
        let counter = counting.counter();
        Bzip2Decoder { inner: BzDecoder::new(counting), counter }
    }

    /// Bytes consumed from the compressed input so far.
    pub fn bytes_read(&self) -> u64 {
        self.counter.get()
    }
}

impl<R: Read> Read for Bzip2Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read> Bzip2Decoder<R> {
    pub fn into_inner(self) -> R {
        self.inner.into_inner().into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn bytes_read_starts_at_zero() {
        let dec = Bzip2Decoder::new(Cursor::new(Vec::<u8>::new()));
        assert_eq!(dec.bytes_read(), 0);
    }
}
