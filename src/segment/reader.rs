use std::fs::File;
use std::io::{self, BufReader, Seek, SeekFrom};

use crate::codec::Record;
use crate::dir::Directory;
use crate::error::{Error, Result};

use super::index::{Location, SparseIndex};

/// A candidate found for a key in some segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub value: Vec<u8>,
    pub timestamp: u64,
}

/// Looks `key` up across every readable segment in the directory.
///
/// A segment is readable when its index file exists and its unavailable
/// marker is absent. Each segment contributes at most one candidate; the
/// one with the greatest timestamp wins (ties keep the first candidate in
/// enumeration order). The compactor may delete retired files at any
/// moment, so segments that vanish between the directory listing and the
/// read are skipped.
pub fn lookup(dir: &Directory, key: &[u8]) -> Result<Option<Hit>> {
    let mut best: Option<Hit> = None;
    for id in dir.index_ids()? {
        if dir.has_marker(id) {
            continue;
        }
        let index_bytes = match std::fs::read(dir.index_path(id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        let location = SparseIndex::from_bytes(&index_bytes)?.locate(key);
        if location == Location::Skip {
            continue;
        }
        let segment = match File::open(dir.segment_path(id)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        if let Some(candidate) = search(segment, key, location)? {
            match &best {
                Some(current) if candidate.timestamp <= current.timestamp => {}
                _ => best = Some(candidate),
            }
        }
    }
    Ok(best)
}

/// Scans one segment for `key` within the byte range its sparse index
/// allows.
fn search(segment: File, key: &[u8], location: Location) -> Result<Option<Hit>> {
    let mut reader = BufReader::new(segment);
    match location {
        Location::Skip => Ok(None),
        // Exact index hit: the record at the offset is the key's record.
        Location::At(offset) => {
            reader.seek(SeekFrom::Start(offset as u64))?;
            match Record::read_from(&mut reader)? {
                Some(record) => Ok(Some(Hit { value: record.value, timestamp: record.timestamp })),
                None => Err(Error::Corrupt("index offset past segment end".to_string())),
            }
        }
        // Range hit: the key can only live before the record at `hi`.
        Location::Between(lo, hi) => {
            reader.seek(SeekFrom::Start(lo as u64))?;
            let mut pos = lo;
            while pos < hi {
                let Some(record) = Record::read_from(&mut reader)? else {
                    break;
                };
                pos += record.encoded_len() as u32;
                if record.key == key {
                    return Ok(Some(Hit { value: record.value, timestamp: record.timestamp }));
                }
            }
            Ok(None)
        }
        // The index could not bound the key: walk the whole segment.
        Location::Scan => {
            while let Some(record) = Record::read_from(&mut reader)? {
                if record.key == key {
                    return Ok(Some(Hit { value: record.value, timestamp: record.timestamp }));
                }
            }
            Ok(None)
        }
    }
}
