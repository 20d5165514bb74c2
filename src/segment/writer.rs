use std::fs::File;
use std::io::{BufWriter, Write};

use crate::codec::{IndexEntry, Record};
use crate::dir::Directory;
use crate::error::Result;

/// Streams records in ascending key order into a new segment file and its
/// sparse index.
///
/// The segment is created behind its unavailable marker, so readers never
/// observe a half-written file; `finish` seals both files and publishes
/// the segment by removing the marker. The same writer serves memtable
/// flushes (record count known up front) and merge streams (end signalled
/// by `finish`): an index entry goes out for every `stride`-th record, and
/// `finish` adds one for the final record when it was not already covered.
pub struct SegmentWriter {
    dir: Directory,
    id: u64,
    segment: BufWriter<File>,
    index: BufWriter<File>,
    stride: usize,
    count: usize,
    offset: u32,
    pending_last: Option<IndexEntry>,
}

impl SegmentWriter {
    /// Creates the segment, index, and unavailable-marker files.
    pub fn create(dir: &Directory, id: u64, stride: usize) -> Result<Self> {
        dir.create_marker(id)?;
        // create_new: losing an id-allocation race to a concurrent flush
        // surfaces here instead of silently overwriting a segment.
        let segment = File::options()
            .write(true)
            .create_new(true)
            .open(dir.segment_path(id))?;
        let index = File::create(dir.index_path(id))?;
        Ok(Self {
            dir: dir.clone(),
            id,
            segment: BufWriter::new(segment),
            index: BufWriter::new(index),
            stride,
            count: 0,
            offset: 0,
            pending_last: None,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Appends the next record of the sorted stream.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        let entry = IndexEntry { key: record.key.clone(), offset: self.offset };
        if self.count % self.stride == 0 {
            entry.write_to(&mut self.index)?;
            self.pending_last = None;
        } else {
            self.pending_last = Some(entry);
        }
        record.write_to(&mut self.segment)?;
        self.offset += record.encoded_len() as u32;
        self.count += 1;
        Ok(())
    }

    /// Seals both files and publishes the segment by removing its marker.
    /// Returns the number of records written.
    pub fn finish(mut self) -> Result<usize> {
        if let Some(entry) = self.pending_last.take() {
            // the final record always gets an index entry
            entry.write_to(&mut self.index)?;
        }
        self.segment.flush()?;
        self.segment.get_ref().sync_all()?;
        self.index.flush()?;
        self.index.get_ref().sync_all()?;
        self.dir.remove_marker(self.id)?;
        Ok(self.count)
    }
}
