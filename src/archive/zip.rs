//! ZIP local-file-header scanning, as used to read JAR archives. Only the
//! structural scan is implemented; actual inflate/deflate is left to the
//! application via `flate2`, consistent with this crate's non-goals.

use std::io::{Read, Write};

use super::entry::ArchiveEntry;
use crate::dispatch::Format;
use crate::error::{CodecError, Result};

const LOCAL_FILE_HEADER_SIG: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const CENTRAL_DIR_SIG: [u8; 4] = [0x50, 0x4B, 0x01, 0x02];
const DATA_DESCRIPTOR_SIG: [u8; 4] = [0x50, 0x4B, 0x07, 0x08];

/// The `(0xCAFE, 0 bytes)` extra field JAR uses to mark itself on the
/// archive's first entry.
pub const JAR_MARKER_TAG: u16 = 0xCAFE;

const STREAMED_SIZES_FLAG: u16 = 0x08;

/// The local-file-header fields `ArchiveEntry` doesn't model directly.
#[derive(Debug, Clone, Copy)]
pub struct ZipEntryMeta {
    pub method: u16,
    pub crc32: u32,
    pub compressed_size: u64,
}

fn read_u16(r: &mut impl Read) -> Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_le_bytes(b))
}

fn read_u32(r: &mut impl Read) -> Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

pub struct ZipReader<R> {
    inner: R,
    done: bool,
    pending_first: Option<(ArchiveEntry, ZipEntryMeta, Vec<u8>)>,
}

impl<R: Read> ZipReader<R> {
    pub fn new(inner: R) -> Self {
        ZipReader { inner, done: false, pending_first: None }
    }

    fn read_one(&mut self) -> Result<Option<(ArchiveEntry, ZipEntryMeta, Vec<u8>)>> {
        let mut sig = [0u8; 4];
        let n = {
            let mut total = 0usize;
            loop {
                match self.inner.read(&mut sig[total..])? {
                    0 => break,
                    k => total += k,
                }
            }
            total
        };
        if n == 0 {
            return Ok(None);
        }
        if n != 4 {
            log::error!("zip: local header signature truncated after {n} bytes");
            return Err(CodecError::truncated("zip: local header signature truncated"));
        }
        if sig == CENTRAL_DIR_SIG || sig != LOCAL_FILE_HEADER_SIG {
            // Central directory (or anything else) marks the end of the
            // entry stream for our purposes.
            log::debug!("zip: no further local file headers, ending entry stream");
            return Ok(None);
        }

        let _version = read_u16(&mut self.inner)?;
        let gp_flag = read_u16(&mut self.inner)?;
        let method = read_u16(&mut self.inner)?;
        let _mtime = read_u16(&mut self.inner)?;
        let _mdate = read_u16(&mut self.inner)?;
        let mut crc32 = read_u32(&mut self.inner)?;
        let mut compressed_size = read_u32(&mut self.inner)? as u64;
        let mut uncompressed_size = read_u32(&mut self.inner)? as u64;
        let name_len = read_u16(&mut self.inner)?;
        let extra_len = read_u16(&mut self.inner)?;

        let mut name = vec![0u8; name_len as usize];
        self.inner.read_exact(&mut name)?;

        let mut extras = std::collections::BTreeMap::new();
        let mut remaining_extra = extra_len as usize;
        while remaining_extra > 0 {
            if remaining_extra < 4 {
                return Err(CodecError::format("zip: truncated extra field TLV"));
            }
            let id = read_u16(&mut self.inner)?;
            let len = read_u16(&mut self.inner)? as usize;
            remaining_extra -= 4;
            if len > remaining_extra {
                return Err(CodecError::format("zip: extra field length out of range"));
            }
            let mut data = vec![0u8; len];
            self.inner.read_exact(&mut data)?;
            remaining_extra -= len;
            extras.insert(id, data);
        }

        let payload = if gp_flag & STREAMED_SIZES_FLAG == 0 {
            let mut buf = vec![0u8; compressed_size as usize];
            self.inner.read_exact(&mut buf)?;
            buf
        } else {
            let mut buf = Vec::new();
            let mut window = [0u8; 4];
            let mut filled = 0usize;
            loop {
                let mut byte = [0u8; 1];
                if self.inner.read(&mut byte)? == 0 {
                    log::error!("zip: streamed entry ended without a data descriptor");
                    return Err(CodecError::truncated(
                        "zip: streamed entry ended without a data descriptor".to_string(),
                    ));
                }
                if filled < 4 {
                    window[filled] = byte[0];
                    filled += 1;
                } else {
                    let evicted = window[0];
                    window.copy_within(1..4, 0);
                    window[3] = byte[0];
                    buf.push(evicted);
                }
                if filled == 4 && window == DATA_DESCRIPTOR_SIG {
                    break;
                }
            }
            crc32 = read_u32(&mut self.inner)?;
            compressed_size = read_u32(&mut self.inner)? as u64;
            uncompressed_size = read_u32(&mut self.inner)? as u64;
            buf
        };

        log::debug!(
            "zip: read entry {:?} (method={method}, {} bytes compressed)",
            String::from_utf8_lossy(&name),
            compressed_size
        );
        let mut entry = ArchiveEntry::new(name, uncompressed_size);
        entry.extras = extras;
        let meta = ZipEntryMeta { method, crc32, compressed_size };
        Ok(Some((entry, meta, payload)))
    }

    /// Returns the next entry along with its raw (still-compressed, for
    /// non-stored methods) payload bytes.
    pub fn next_entry(&mut self) -> Result<Option<(ArchiveEntry, ZipEntryMeta, Vec<u8>)>> {
        if let Some(first) = self.pending_first.take() {
            return Ok(Some(first));
        }
        if self.done {
            return Ok(None);
        }
        let result = self.read_one()?;
        if result.is_none() {
            self.done = true;
        }
        Ok(result)
    }
}

/// Peeks the first entry of a ZIP stream to decide whether it's a JAR
/// (carries the `JarMarker` extra) or a plain ZIP, per the rule that JAR is
/// indistinguishable from ZIP by leading signature alone.
pub fn refine_zip_or_jar<R: Read>(reader: R) -> Result<(Format, ZipReader<R>)> {
    let mut zip = ZipReader::new(reader);
    let first = zip.next_entry()?;
    let format = match &first {
        Some((entry, _, _)) if entry.extras.contains_key(&JAR_MARKER_TAG) => Format::Jar,
        _ => Format::Zip,
    };
    zip.pending_first = first;
    zip.done = false;
    Ok((format, zip))
}

/// Minimal stored-method ZIP/JAR writer for building test fixtures.
pub struct ZipWriter<W> {
    inner: W,
}

impl<W: Write> ZipWriter<W> {
    pub fn new(inner: W) -> Self {
        ZipWriter { inner }
    }

    /// Writes one entry using the `stored` (uncompressed) method, computing
    /// its CRC-32 and preserving `extras` byte-for-byte.
    pub fn add_entry(
        &mut self,
        name: &[u8],
        extras: &std::collections::BTreeMap<u16, Vec<u8>>,
        payload: &[u8],
    ) -> Result<()> {
        let crc = crc32(payload);
        let extra_bytes: Vec<u8> = extras
            .iter()
            .flat_map(|(&id, data)| {
                let mut tlv = Vec::with_capacity(4 + data.len());
                tlv.extend_from_slice(&id.to_le_bytes());
                tlv.extend_from_slice(&(data.len() as u16).to_le_bytes());
                tlv.extend_from_slice(data);
                tlv
            })
            .collect();

        self.inner.write_all(&LOCAL_FILE_HEADER_SIG)?;
        self.inner.write_all(&20u16.to_le_bytes())?; // version needed
        self.inner.write_all(&0u16.to_le_bytes())?; // gp flag
        self.inner.write_all(&0u16.to_le_bytes())?; // method: stored
        self.inner.write_all(&0u16.to_le_bytes())?; // mod time
        self.inner.write_all(&0u16.to_le_bytes())?; // mod date
        self.inner.write_all(&crc.to_le_bytes())?;
        self.inner.write_all(&(payload.len() as u32).to_le_bytes())?; // compressed size
        self.inner.write_all(&(payload.len() as u32).to_le_bytes())?; // uncompressed size
        self.inner.write_all(&(name.len() as u16).to_le_bytes())?;
        self.inner.write_all(&(extra_bytes.len() as u16).to_le_bytes())?;
        self.inner.write_all(name)?;
        self.inner.write_all(&extra_bytes)?;
        self.inner.write_all(payload)?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn crc32(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB88320;
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (POLY & mask);
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::Cursor;

    #[test]
    fn crc32_matches_known_vector() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn round_trips_stored_entry() {
        let mut w = ZipWriter::new(Vec::new());
        w.add_entry(b"hello.txt", &BTreeMap::new(), b"hello world").unwrap();
        let bytes = w.into_inner();

        let mut r = ZipReader::new(Cursor::new(bytes));
        let (entry, meta, payload) = r.next_entry().unwrap().unwrap();
        assert_eq!(entry.name, b"hello.txt");
        assert_eq!(entry.size, 11);
        assert_eq!(meta.method, 0);
        assert_eq!(meta.crc32, crc32(b"hello world"));
        assert_eq!(payload, b"hello world");
        assert!(r.next_entry().unwrap().is_none());
    }

    #[test]
    fn jar_marker_on_first_entry_is_detected() {
        let mut extras = BTreeMap::new();
        extras.insert(JAR_MARKER_TAG, Vec::new());
        let mut w = ZipWriter::new(Vec::new());
        w.add_entry(b"META-INF/MANIFEST.MF", &extras, b"Manifest-Version: 1.0\n").unwrap();
        w.add_entry(b"App.class", &BTreeMap::new(), b"\xCA\xFE\xBA\xBE").unwrap();
        let bytes = w.into_inner();

        let (format, mut reader) = refine_zip_or_jar(Cursor::new(bytes)).unwrap();
        assert_eq!(format, Format::Jar);

        let (first, _, _) = reader.next_entry().unwrap().unwrap();
        assert!(first.extras.contains_key(&JAR_MARKER_TAG));
        let (second, _, _) = reader.next_entry().unwrap().unwrap();
        assert!(!second.extras.contains_key(&JAR_MARKER_TAG));
    }

    #[test]
    fn plain_zip_without_marker_is_zip() {
        let mut w = ZipWriter::new(Vec::new());
        w.add_entry(b"readme.txt", &BTreeMap::new(), b"hi").unwrap();
        let bytes = w.into_inner();
        let (format, _) = refine_zip_or_jar(Cursor::new(bytes)).unwrap();
        assert_eq!(format, Format::Zip);
    }
}
