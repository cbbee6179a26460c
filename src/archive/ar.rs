//! The common Unix `ar` archive format, including GNU and BSD long-name
//! extensions.

use std::io::{Read, Write};

use super::entry::ArchiveEntry;
use crate::error::{CodecError, Result};

const GLOBAL_MAGIC: &[u8; 8] = b"!<arch>\n";
const HEADER_LEN: usize = 60;
const TRAILER: &[u8; 2] = b"`\n";

struct RawHeader {
    name: String,
    mtime: u64,
    uid: Option<u32>,
    gid: Option<u32>,
    mode: u32,
    size: u64,
}

fn field_str(raw: &[u8]) -> &str {
    std::str::from_utf8(raw).unwrap_or_default().trim_end()
}

fn parse_header(buf: &[u8; HEADER_LEN]) -> Result<RawHeader> {
    if &buf[58..60] != TRAILER {
        return Err(CodecError::format("ar: malformed header trailer"));
    }
    let parse_u = |raw: &[u8], what: &'static str| -> Result<u64> {
        let s = field_str(raw).trim();
        if s.is_empty() {
            return Ok(0);
        }
        s.parse().map_err(|_| CodecError::format(format!("ar: invalid {what} field")))
    };
    let mode = {
        let s = field_str(&buf[40..48]).trim();
        if s.is_empty() {
            0
        } else {
            u32::from_str_radix(s, 8).map_err(|_| CodecError::format("ar: invalid mode field"))?
        }
    };
    Ok(RawHeader {
        name: field_str(&buf[0..16]).to_string(),
        mtime: parse_u(&buf[16..28], "mtime")?,
        uid: {
            let v = parse_u(&buf[28..34], "uid")?;
            if field_str(&buf[28..34]).trim().is_empty() { None } else { Some(v as u32) }
        },
        gid: {
            let v = parse_u(&buf[34..40], "gid")?;
            if field_str(&buf[34..40]).trim().is_empty() { None } else { Some(v as u32) }
        },
        mode,
        size: parse_u(&buf[48..58], "size")?,
    })
}

enum ResolvedName {
    GnuTable,
    GnuIndirect(usize),
    BsdLong(usize),
    Direct(String),
}

fn resolve_name(raw: &str) -> ResolvedName {
    if raw == "//" {
        return ResolvedName::GnuTable;
    }
    if let Some(rest) = raw.strip_prefix('/') {
        if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(offset) = rest.parse() {
                return ResolvedName::GnuIndirect(offset);
            }
        }
    }
    if let Some(rest) = raw.strip_prefix("#1/") {
        if let Ok(n) = rest.trim().parse::<usize>() {
            return ResolvedName::BsdLong(n);
        }
    }
    ResolvedName::Direct(raw.trim_end_matches('/').to_string())
}

/// Reads entries from an `ar` archive, transparently resolving GNU string
/// tables and BSD `#1/N` long names.
pub struct ArReader<R> {
    inner: R,
    gnu_table: Vec<u8>,
    pos: u64,
    remaining: u64,
    done: bool,
}

impl<R: Read> ArReader<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let mut magic = [0u8; 8];
        inner.read_exact(&mut magic).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                CodecError::truncated("ar: global magic truncated".to_string())
            }
            _ => e.into(),
        })?;
        if &magic != GLOBAL_MAGIC {
            log::error!("ar: missing global magic, got {magic:?}");
            return Err(CodecError::format("ar: missing global magic"));
        }
        log::debug!("ar: global magic matched");
        Ok(ArReader { inner, gnu_table: Vec::new(), pos: 8, remaining: 0, done: false })
    }

    fn read_exact_counted(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn drain_current_entry(&mut self) -> Result<()> {
        let mut sink = [0u8; 4096];
        while self.remaining > 0 {
            let n = self.remaining.min(sink.len() as u64) as usize;
            self.read_exact_counted(&mut sink[..n])?;
            self.remaining -= n as u64;
        }
        if self.pos % 2 != 0 {
            let mut pad = [0u8; 1];
            self.read_exact_counted(&mut pad)?;
        }
        Ok(())
    }

    fn gnu_indirect_name(&self, offset: usize) -> Result<String> {
        let table = &self.gnu_table;
        if offset >= table.len() {
            return Err(CodecError::format("ar: GNU string table offset out of range"));
        }
        let end = table[offset..].iter().position(|&b| b == b'\n').map(|p| offset + p);
        let end = end.unwrap_or(table.len());
        let raw = std::str::from_utf8(&table[offset..end])
            .map_err(|_| CodecError::format("ar: GNU string table entry is not UTF-8"))?;
        Ok(raw.trim_end_matches('/').to_string())
    }

    /// Advances past any unread payload of the previous entry, then reads
    /// the next header. Returns `None` at a clean end of archive.
    pub fn next_entry(&mut self) -> Result<Option<ArchiveEntry>> {
        if self.done {
            return Ok(None);
        }
        self.drain_current_entry()?;

        loop {
            let mut header_buf = [0u8; HEADER_LEN];
            let n = {
                let mut total = 0usize;
                loop {
                    match self.inner.read(&mut header_buf[total..])? {
                        0 => break,
                        k => total += k,
                    }
                }
                total
            };
            if n == 0 {
                self.done = true;
                return Ok(None);
            }
            if n != HEADER_LEN {
                log::error!("ar: entry header truncated after {n} of {HEADER_LEN} bytes");
                return Err(CodecError::truncated("ar: entry header truncated"));
            }
            self.pos += HEADER_LEN as u64;

            let raw = parse_header(&header_buf)?;
            match resolve_name(&raw.name) {
                ResolvedName::GnuTable => {
                    self.remaining = raw.size;
                    let mut table = vec![0u8; raw.size as usize];
                    self.read_exact_counted(&mut table)?;
                    self.remaining = 0;
                    if self.pos % 2 != 0 {
                        let mut pad = [0u8; 1];
                        self.read_exact_counted(&mut pad)?;
                    }
                    self.gnu_table = table;
                    continue;
                }
                ResolvedName::GnuIndirect(offset) => {
                    let name = self.gnu_indirect_name(offset)?;
                    self.remaining = raw.size;
                    let mut entry = ArchiveEntry::new(name.into_bytes(), raw.size);
                    entry.mtime = raw.mtime;
                    entry.uid = raw.uid;
                    entry.gid = raw.gid;
                    entry.mode = Some(raw.mode);
                    return Ok(Some(entry));
                }
                ResolvedName::BsdLong(name_len) => {
                    let mut name_buf = vec![0u8; name_len];
                    self.read_exact_counted(&mut name_buf)?;
                    let payload_size = raw
                        .size
                        .checked_sub(name_len as u64)
                        .ok_or_else(|| CodecError::format("ar: BSD name longer than entry size"))?;
                    self.remaining = payload_size;
                    let mut entry = ArchiveEntry::new(name_buf, payload_size);
                    entry.mtime = raw.mtime;
                    entry.uid = raw.uid;
                    entry.gid = raw.gid;
                    entry.mode = Some(raw.mode);
                    return Ok(Some(entry));
                }
                ResolvedName::Direct(name) => {
                    self.remaining = raw.size;
                    let mut entry = ArchiveEntry::new(name.into_bytes(), raw.size);
                    entry.mtime = raw.mtime;
                    entry.uid = raw.uid;
                    entry.gid = raw.gid;
                    entry.mode = Some(raw.mode);
                    return Ok(Some(entry));
                }
            }
        }
    }

    /// Reads from the currently open entry's payload.
    pub fn read_payload(&mut self, buf: &mut [u8]) -> Result<usize> {
        let want = (buf.len() as u64).min(self.remaining) as usize;
        if want == 0 {
            return Ok(0);
        }
        self.inner.read_exact(&mut buf[..want])?;
        self.pos += want as u64;
        self.remaining -= want as u64;
        Ok(want)
    }
}

/// Long-name encoding strategy for entries whose name exceeds 16 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LongNameMode {
    Gnu,
    Bsd,
}

/// Writes an `ar` archive. GNU long names are buffered and flushed as a
/// single `//` string-table entry right before the first entry that needs
/// one; BSD long names are self-contained per entry.
pub struct ArWriter<W> {
    inner: W,
    mode: LongNameMode,
    pos: u64,
    gnu_table: Vec<u8>,
    pending: Vec<(Vec<u8>, u64, u64, u32, u32, u32, Vec<u8>)>,
    magic_written: bool,
}

impl<W: Write> ArWriter<W> {
    pub fn new(inner: W, mode: LongNameMode) -> Self {
        ArWriter {
            inner,
            mode,
            pos: 0,
            gnu_table: Vec::new(),
            pending: Vec::new(),
            magic_written: false,
        }
    }

    fn ensure_magic(&mut self) -> Result<()> {
        if !self.magic_written {
            self.inner.write_all(GLOBAL_MAGIC)?;
            self.pos += GLOBAL_MAGIC.len() as u64;
            self.magic_written = true;
        }
        Ok(())
    }

    fn write_header(
        &mut self,
        name_field: &str,
        mtime: u64,
        uid: u32,
        gid: u32,
        mode: u32,
        size: u64,
    ) -> Result<()> {
        let mut header = format!(
            "{:<16}{:<12}{:<6}{:<6}{:<8o}{:<10}",
            name_field, mtime, uid, gid, mode, size
        )
        .into_bytes();
        if header.len() != HEADER_LEN - 2 {
            return Err(CodecError::format("ar: name field too long for header"));
        }
        header.extend_from_slice(TRAILER);
        self.inner.write_all(&header)?;
        self.pos += header.len() as u64;
        Ok(())
    }

    fn pad_if_odd(&mut self) -> Result<()> {
        if self.pos % 2 != 0 {
            self.inner.write_all(&[0u8])?;
            self.pos += 1;
        }
        Ok(())
    }

    /// Queues one entry. GNU mode writers hold the name until the table can
    /// be sized; BSD mode writers emit immediately.
    pub fn add_entry(
        &mut self,
        name: &[u8],
        mtime: u64,
        uid: u32,
        gid: u32,
        mode: u32,
        payload: &[u8],
    ) -> Result<()> {
        self.ensure_magic()?;
        // Leave room for the trailing '/' the GNU short-name convention adds.
        let ascii_short = name.len() <= 15 && name.is_ascii();

        match self.mode {
            LongNameMode::Bsd if !ascii_short => {
                let name_field = format!("#1/{}", name.len());
                self.write_header(&name_field, mtime, uid, gid, mode, name.len() as u64 + payload.len() as u64)?;
                self.inner.write_all(name)?;
                self.pos += name.len() as u64;
                self.inner.write_all(payload)?;
                self.pos += payload.len() as u64;
                self.pad_if_odd()?;
            }
            _ if ascii_short => {
                let name_field = format!("{}/", String::from_utf8_lossy(name));
                self.write_header(&name_field, mtime, uid, gid, mode, payload.len() as u64)?;
                self.inner.write_all(payload)?;
                self.pos += payload.len() as u64;
                self.pad_if_odd()?;
            }
            LongNameMode::Gnu => {
                let offset = self.gnu_table.len() as u64;
                self.gnu_table.extend_from_slice(name);
                self.gnu_table.push(b'/');
                self.gnu_table.push(b'\n');
                self.pending.push((
                    format!("/{offset}").into_bytes(),
                    mtime,
                    payload.len() as u64,
                    uid,
                    gid,
                    mode,
                    payload.to_vec(),
                ));
            }
            LongNameMode::Bsd => unreachable!("covered above"),
        }
        Ok(())
    }

    /// Flushes the GNU string table (if any names were queued) and every
    /// pending entry, in order.
    pub fn finish(mut self) -> Result<W> {
        self.ensure_magic()?;
        if !self.gnu_table.is_empty() {
            self.write_header("//", 0, 0, 0, 0, self.gnu_table.len() as u64)?;
            let table = std::mem::take(&mut self.gnu_table);
            self.inner.write_all(&table)?;
            self.pos += table.len() as u64;
            self.pad_if_odd()?;
        }
        let pending = std::mem::take(&mut self.pending);
        for (name_field, mtime, size, uid, gid, mode, payload) in pending {
            let name_field = String::from_utf8(name_field)
                .map_err(|_| CodecError::format("ar: non-UTF8 GNU index field"))?;
            self.write_header(&name_field, mtime, uid, gid, mode, size)?;
            self.inner.write_all(&payload)?;
            self.pos += payload.len() as u64;
            self.pad_if_odd()?;
        }
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_short_names_with_odd_payload_padding() {
        let mut w = ArWriter::new(Vec::new(), LongNameMode::Gnu);
        w.add_entry(b"a.txt", 0, 0, 0, 0o644, b"foo").unwrap();
        w.add_entry(b"bb", 0, 0, 0, 0o644, b"xx").unwrap();
        let bytes = w.finish().unwrap();

        assert!(bytes.starts_with(GLOBAL_MAGIC));

        let mut r = ArReader::new(Cursor::new(bytes)).unwrap();
        let e1 = r.next_entry().unwrap().unwrap();
        assert_eq!(e1.name, b"a.txt");
        assert_eq!(e1.size, 3);
        let mut buf = vec![0u8; 3];
        r.read_payload(&mut buf).unwrap();
        assert_eq!(buf, b"foo");

        let e2 = r.next_entry().unwrap().unwrap();
        assert_eq!(e2.name, b"bb");
        assert_eq!(e2.size, 2);
        let mut buf2 = vec![0u8; 2];
        r.read_payload(&mut buf2).unwrap();
        assert_eq!(buf2, b"xx");

        assert!(r.next_entry().unwrap().is_none());
    }

    #[test]
    fn gnu_long_name_round_trips_via_string_table() {
        let long_name = b"this-name-is-definitely-longer-than-sixteen-bytes.txt";
        let mut w = ArWriter::new(Vec::new(), LongNameMode::Gnu);
        w.add_entry(long_name, 1234, 0, 0, 0o644, b"data").unwrap();
        let bytes = w.finish().unwrap();

        let mut r = ArReader::new(Cursor::new(bytes)).unwrap();
        let entry = r.next_entry().unwrap().unwrap();
        assert_eq!(entry.name, long_name);
        assert_eq!(entry.mtime, 1234);
    }

    #[test]
    fn bsd_long_name_round_trips() {
        let long_name = b"also-a-rather-long-member-name-for-bsd-mode.obj";
        let mut w = ArWriter::new(Vec::new(), LongNameMode::Bsd);
        w.add_entry(long_name, 0, 0, 0, 0o644, b"payload-bytes").unwrap();
        let bytes = w.finish().unwrap();

        let mut r = ArReader::new(Cursor::new(bytes)).unwrap();
        let entry = r.next_entry().unwrap().unwrap();
        assert_eq!(entry.name, long_name);
        assert_eq!(entry.size, b"payload-bytes".len() as u64);
        let mut buf = vec![0u8; entry.size as usize];
        r.read_payload(&mut buf).unwrap();
        assert_eq!(buf, b"payload-bytes");
    }

    #[test]
    fn rejects_missing_global_magic() {
        assert!(ArReader::new(Cursor::new(b"not an archive".to_vec())).is_err());
    }
}
