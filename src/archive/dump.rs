//! BSD `dump(8)` tape-record reader: fixed-size blocks grouped into
//! records, the first record's signature gates the whole stream, and an
//! inode seen twice in one traversal is treated as a cycle rather than
//! silently re-emitted.

use std::collections::HashSet;
use std::io::Read;

use super::entry::ArchiveEntry;
use crate::error::{CodecError, Result};

pub const BLOCK_SIZE: usize = 1024;
const MAGIC: u32 = 0x0006_0897;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordType {
    Tape,
    Inode,
    Bits,
    Addr,
    End,
    ClearInode,
}

impl RecordType {
    fn from_u32(v: u32) -> Result<Self> {
        match v {
            1 => Ok(RecordType::Tape),
            2 => Ok(RecordType::Inode),
            3 => Ok(RecordType::Bits),
            4 => Ok(RecordType::Addr),
            5 => Ok(RecordType::End),
            6 => Ok(RecordType::ClearInode),
            other => Err(CodecError::format(format!("dump: unknown record type {other}"))),
        }
    }
}

struct BlockHeader {
    record_type: RecordType,
    inode: u32,
    reclen: u32,
}

fn parse_header(buf: &[u8; BLOCK_SIZE]) -> Result<BlockHeader> {
    let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    if magic != MAGIC {
        return Err(CodecError::Signature);
    }
    let record_type = RecordType::from_u32(u32::from_le_bytes(buf[4..8].try_into().unwrap()))?;
    let inode = u32::from_le_bytes(buf[8..12].try_into().unwrap());
    let reclen = u32::from_le_bytes(buf[12..16].try_into().unwrap());
    Ok(BlockHeader { record_type, inode, reclen })
}

/// Reads a `BLOCK_SIZE` block, returning `false` only on a clean EOF before
/// any byte of the block was read.
fn read_block(r: &mut impl Read, buf: &mut [u8; BLOCK_SIZE]) -> Result<bool> {
    let mut filled = 0;
    loop {
        match r.read(&mut buf[filled..])? {
            0 if filled == 0 => return Ok(false),
            0 => return Err(CodecError::truncated("dump: block truncated mid-read")),
            n => {
                filled += n;
                if filled == BLOCK_SIZE {
                    return Ok(true);
                }
            }
        }
    }
}

pub struct DumpReader<R> {
    inner: R,
    seen_inodes: HashSet<u32>,
    finished: bool,
}

impl<R: Read> DumpReader<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let mut header = [0u8; BLOCK_SIZE];
        if !read_block(&mut inner, &mut header)? {
            log::error!("dump: stream empty, no first record to match");
            return Err(CodecError::Signature);
        }
        let parsed = parse_header(&header)?;
        if parsed.record_type != RecordType::Tape {
            log::error!("dump: first record is not a tape header");
            return Err(CodecError::Signature);
        }
        log::debug!("dump: tape header matched, beginning traversal");
        Ok(DumpReader { inner, seen_inodes: HashSet::new(), finished: false })
    }

    fn skip_blocks(&mut self, count: u32) -> Result<()> {
        let mut buf = [0u8; BLOCK_SIZE];
        for _ in 0..count {
            if !read_block(&mut self.inner, &mut buf)? {
                return Err(CodecError::truncated("dump: record payload ended early"));
            }
        }
        Ok(())
    }

    /// Returns the next inode's synthesized entry (named `inoN` since tape
    /// records carry no path component) along with its payload bytes.
    pub fn next_entry(&mut self) -> Result<Option<(ArchiveEntry, Vec<u8>)>> {
        if self.finished {
            return Ok(None);
        }
        loop {
            let mut header = [0u8; BLOCK_SIZE];
            if !read_block(&mut self.inner, &mut header)? {
                self.finished = true;
                return Ok(None);
            }
            let parsed = parse_header(&header)?;
            match parsed.record_type {
                RecordType::End => {
                    self.finished = true;
                    return Ok(None);
                }
                RecordType::Tape | RecordType::Bits | RecordType::Addr | RecordType::ClearInode => {
                    self.skip_blocks(parsed.reclen)?;
                    continue;
                }
                RecordType::Inode => {
                    if parsed.reclen == 0 {
                        log::error!("dump: inode {} record declares reclen 0", parsed.inode);
                        return Err(CodecError::format("dump: inode record declares reclen 0"));
                    }
                    if !self.seen_inodes.insert(parsed.inode) {
                        log::error!("dump: inode {} repeated within one traversal", parsed.inode);
                        return Err(CodecError::format(format!(
                            "dump: inode {} repeated within one traversal",
                            parsed.inode
                        )));
                    }
                    log::debug!("dump: reading inode {} ({} blocks)", parsed.inode, parsed.reclen - 1);
                    let mut payload = vec![0u8; (parsed.reclen - 1) as usize * BLOCK_SIZE];
                    for chunk in payload.chunks_mut(BLOCK_SIZE) {
                        let mut block = [0u8; BLOCK_SIZE];
                        if !read_block(&mut self.inner, &mut block)? {
                            return Err(CodecError::truncated("dump: inode payload ended early"));
                        }
                        chunk.copy_from_slice(&block[..chunk.len()]);
                    }
                    let entry = ArchiveEntry::new(
                        format!("ino{}", parsed.inode).into_bytes(),
                        payload.len() as u64,
                    );
                    return Ok(Some((entry, payload)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(record_type: u32, inode: u32, reclen: u32) -> [u8; BLOCK_SIZE] {
        let mut b = [0u8; BLOCK_SIZE];
        b[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        b[4..8].copy_from_slice(&record_type.to_le_bytes());
        b[8..12].copy_from_slice(&inode.to_le_bytes());
        b[12..16].copy_from_slice(&reclen.to_le_bytes());
        b
    }

    fn data_block(fill: u8) -> [u8; BLOCK_SIZE] {
        [fill; BLOCK_SIZE]
    }

    #[test]
    fn reads_one_inode_record_then_end() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&block(1, 0, 1)); // TS_TAPE
        bytes.extend_from_slice(&block(2, 7, 2)); // TS_INODE, 1 payload block
        bytes.extend_from_slice(&data_block(0xAB));
        bytes.extend_from_slice(&block(5, 0, 1)); // TS_END

        let mut reader = DumpReader::new(std::io::Cursor::new(bytes)).unwrap();
        let (entry, payload) = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.name, b"ino7");
        assert_eq!(payload, vec![0xABu8; BLOCK_SIZE]);
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn rejects_bad_signature() {
        let bytes = block(2, 0, 1).to_vec();
        assert!(DumpReader::new(std::io::Cursor::new(bytes)).is_err());
    }

    #[test]
    fn rejects_zero_reclen_inode() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&block(1, 0, 1));
        bytes.extend_from_slice(&block(2, 3, 0));
        let mut reader = DumpReader::new(std::io::Cursor::new(bytes)).unwrap();
        assert!(reader.next_entry().is_err());
    }

    #[test]
    fn rejects_repeated_inode() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&block(1, 0, 1));
        bytes.extend_from_slice(&block(2, 9, 1));
        bytes.extend_from_slice(&block(2, 9, 1));
        let mut reader = DumpReader::new(std::io::Cursor::new(bytes)).unwrap();
        reader.next_entry().unwrap();
        assert!(reader.next_entry().is_err());
    }
}
