//! Binary manifest format.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! count u32
//! count x { kind u8 | path_len u32 | path | size u64 | mtime i64 | suffix_len u32 | suffix | content (files only, `size` bytes) }
//! ```
//!
//! A manifest fills the whole buffer; the receiver knows the buffer is complete
//! only because the peer closed the connection.

use crate::entry::{Entry, EntryKind, Manifest};
use crate::error::{DecodeError, RelocError, Result};
use crate::protocol::{COUNT_SIZE, MIN_ENTRY_SIZE};

fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn write_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn write_str(buf: &mut Vec<u8>, s: &str, what: &str) -> Result<()> {
    let len = u32::try_from(s.len())
        .map_err(|_| RelocError::Encode(format!("{} longer than u32::MAX bytes", what)))?;
    write_u32(buf, len);
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Exact number of bytes `encode` will produce.
pub fn encoded_len(manifest: &Manifest) -> usize {
    COUNT_SIZE
        + manifest
            .iter()
            .map(|e| MIN_ENTRY_SIZE + e.relative_path().len() + e.suffix().len() + e.content().len())
            .sum::<usize>()
}

pub fn encode(manifest: &Manifest) -> Result<Vec<u8>> {
    let count = u32::try_from(manifest.len())
        .map_err(|_| RelocError::Encode(format!("{} entries exceed u32::MAX", manifest.len())))?;
    let mut buf = Vec::with_capacity(encoded_len(manifest));
    write_u32(&mut buf, count);
    for entry in manifest {
        buf.push(entry.kind().tag());
        write_str(&mut buf, entry.relative_path(), "path")?;
        write_u64(&mut buf, entry.size());
        buf.extend_from_slice(&entry.modified_time().unwrap_or(0).to_be_bytes());
        write_str(&mut buf, entry.suffix(), "suffix")?;
        if entry.kind() == EntryKind::File {
            buf.extend_from_slice(entry.content());
        }
    }
    Ok(buf)
}

/// Cursor over the input that never reads past the end.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: u64) -> std::result::Result<&'a [u8], DecodeError> {
        let remaining = self.remaining();
        if n > remaining as u64 {
            return Err(DecodeError::Truncated { needed: n, remaining });
        }
        let n = n as usize;
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> std::result::Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N as u64)?);
        Ok(out)
    }

    fn u8(&mut self) -> std::result::Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    fn u32(&mut self) -> std::result::Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn u64(&mut self) -> std::result::Result<u64, DecodeError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    fn i64(&mut self) -> std::result::Result<i64, DecodeError> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    fn string(&mut self) -> std::result::Result<String, DecodeError> {
        let len = self.u32()?;
        let bytes = self.take(len as u64)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8)
    }
}

fn decode_entry(r: &mut Reader<'_>) -> std::result::Result<Entry, DecodeError> {
    let tag = r.u8()?;
    let kind = EntryKind::from_tag(tag).ok_or(DecodeError::InvalidKind(tag))?;
    let relative_path = r.string()?;
    let size = r.u64()?;
    let mtime = r.i64()?;
    let suffix = r.string()?;
    let content = match kind {
        EntryKind::File => r.take(size)?.to_vec(),
        EntryKind::Directory if size != 0 => return Err(DecodeError::DirectoryWithContent(size)),
        EntryKind::Directory => Vec::new(),
    };
    Ok(Entry::from_parts(kind, relative_path, Some(mtime), suffix, content))
}

/// Decode a complete manifest. Either the whole buffer is consumed and every
/// entry is returned, or nothing is.
pub fn decode(bytes: &[u8]) -> std::result::Result<Manifest, DecodeError> {
    let mut r = Reader::new(bytes);
    let count = r.u32()?;
    if (count as u64).saturating_mul(MIN_ENTRY_SIZE as u64) > r.remaining() as u64 {
        return Err(DecodeError::CountTooLarge {
            count,
            remaining: r.remaining(),
        });
    }
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        entries.push(decode_entry(&mut r)?);
    }
    if r.remaining() != 0 {
        return Err(DecodeError::TrailingBytes(r.remaining()));
    }
    Ok(Manifest::from(entries))
}
