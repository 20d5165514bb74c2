//! Length-prefixed byte framing for records and sparse-index entries.
//!
//! A byte string is framed as a single length byte when it is shorter than
//! 255 bytes, otherwise as the sentinel `0xFF` followed by a little-endian
//! u32 length. All multi-byte integers on disk are little-endian.

use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// Frame header byte marking an extended (u32) length.
const FRAME_EXTENDED: u8 = 0xFF;

/// Number of bytes `frame(bytes)` occupies on disk.
pub fn frame_len(bytes: &[u8]) -> usize {
    if bytes.len() < FRAME_EXTENDED as usize {
        1 + bytes.len()
    } else {
        1 + 4 + bytes.len()
    }
}

/// Writes one framed byte string.
pub fn write_frame<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    if bytes.len() < FRAME_EXTENDED as usize {
        w.write_u8(bytes.len() as u8)?;
    } else {
        w.write_u8(FRAME_EXTENDED)?;
        w.write_u32::<LittleEndian>(bytes.len() as u32)?;
    }
    w.write_all(bytes)
}

/// Reads the body of a frame whose header byte has already been consumed.
fn read_frame_body<R: Read>(r: &mut R, head: u8) -> io::Result<Vec<u8>> {
    let len = if head < FRAME_EXTENDED {
        head as usize
    } else {
        r.read_u32::<LittleEndian>()? as usize
    };
    let mut body = vec![0u8; len];
    r.read_exact(&mut body)?;
    Ok(body)
}

/// Reads one framed byte string. An `UnexpectedEof` from the header byte
/// means the stream ended at a frame boundary.
pub fn read_frame<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let head = r.read_u8()?;
    read_frame_body(r, head)
}

fn truncated(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::Corrupt("record truncated mid-frame".to_string())
    } else {
        err.into()
    }
}

/// A single key-value record with the timestamp assigned at write time.
/// The record with the greatest timestamp wins when a key appears in more
/// than one place.
///
/// On disk: `frame(key) frame(value) u64_le(timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub timestamp: u64,
}

impl Record {
    /// Number of bytes this record occupies on disk.
    pub fn encoded_len(&self) -> usize {
        frame_len(&self.key) + frame_len(&self.value) + 8
    }

    /// Writes the encoded record.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_frame(w, &self.key)?;
        write_frame(w, &self.value)?;
        w.write_u64::<LittleEndian>(self.timestamp)
    }

    /// Reads one record. Returns `Ok(None)` on a clean end-of-stream at a
    /// record boundary; a stream ending inside a record is `Error::Corrupt`.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Option<Record>> {
        let mut head = [0u8; 1];
        if r.read(&mut head).map_err(Error::from)? == 0 {
            return Ok(None);
        }
        let key = read_frame_body(r, head[0]).map_err(truncated)?;
        let value = read_frame(r).map_err(truncated)?;
        let timestamp = r.read_u64::<LittleEndian>().map_err(truncated)?;
        Ok(Some(Record { key, value, timestamp }))
    }
}

/// One sparse-index entry: a segment key and the byte offset at which its
/// record begins.
///
/// On disk: `frame(key) u32_le(offset)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: Vec<u8>,
    pub offset: u32,
}

impl IndexEntry {
    /// Writes the encoded entry.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_frame(w, &self.key)?;
        w.write_u32::<LittleEndian>(self.offset)
    }
}

/// Decodes an entire sparse-index file.
pub fn decode_index(buf: &[u8]) -> Result<Vec<IndexEntry>> {
    let mut cursor = Cursor::new(buf);
    let mut entries = Vec::new();
    while (cursor.position() as usize) < buf.len() {
        let key = read_frame(&mut cursor)
            .map_err(|_| Error::Corrupt("index entry key overruns file".to_string()))?;
        let offset = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::Corrupt("index entry offset overruns file".to_string()))?;
        entries.push(IndexEntry { key, offset });
    }
    Ok(entries)
}
