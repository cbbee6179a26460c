//! Small `Read` helpers shared by the external codec adapters.

use std::cell::Cell;
use std::io::{self, Read};
use std::rc::Rc;

/// A cheaply-cloneable handle onto a byte count, so the counter can be read
/// back out after its `CountingReader` has been moved into a third-party
/// decoder that takes ownership of its source.
#[derive(Clone, Default)]
pub struct ByteCounter(Rc<Cell<u64>>);

impl ByteCounter {
    pub fn get(&self) -> u64 {
        self.0.get()
    }

    fn add(&self, n: u64) {
        self.0.set(self.0.get() + n);
    }
}

/// Wraps a byte source, counting every byte actually read from it.
pub struct CountingReader<R> {
    inner: R,
    counter: ByteCounter,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        CountingReader { inner, counter: ByteCounter::default() }
    }

    pub fn counter(&self) -> ByteCounter {
        self.counter.clone()
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.add(n as u64);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn counts_bytes_actually_read() {
        let mut r = CountingReader::new(Cursor::new(vec![1u8, 2, 3, 4, 5]));
        let mut buf = [0u8; 3];
        r.read(&mut buf).unwrap();
        assert_eq!(r.counter().get(), 3);
        r.read(&mut buf).unwrap();
        assert_eq!(r.counter().get(), 5);
    }
}
