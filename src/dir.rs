//! The store directory layout and the file-naming conventions every
//! component coordinates through.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Segment data files: `<id>.seg`.
pub const SEGMENT_SUFFIX: &str = ".seg";
/// Sparse-index files: `<id>.i`.
pub const INDEX_SUFFIX: &str = ".i";
/// Unavailable markers: `<id>.ua`. A segment with its marker present must
/// not be read.
pub const UNAVAILABLE_SUFFIX: &str = ".ua";
/// The write-ahead transaction log.
pub const TRANSLOG_FILE: &str = "translog";
/// The writer-exclusion lock file.
pub const LOCK_FILE: &str = "write.lock";

/// Hands out paths, segment ids, and unavailable markers for one store
/// directory. The directory listing is the coordination medium between the
/// writer, the compactor, and any read-only readers.
#[derive(Debug, Clone)]
pub struct Directory {
    path: PathBuf,
}

impl Directory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn segment_path(&self, id: u64) -> PathBuf {
        self.path.join(format!("{id}{SEGMENT_SUFFIX}"))
    }

    pub fn index_path(&self, id: u64) -> PathBuf {
        self.path.join(format!("{id}{INDEX_SUFFIX}"))
    }

    pub fn marker_path(&self, id: u64) -> PathBuf {
        self.path.join(format!("{id}{UNAVAILABLE_SUFFIX}"))
    }

    pub fn translog_path(&self) -> PathBuf {
        self.path.join(TRANSLOG_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.path.join(LOCK_FILE)
    }

    /// Lists the ids of all regular files named `<id><suffix>`, ascending.
    /// Files whose stem is not a decimal integer are not ours and are
    /// skipped.
    fn ids_with_suffix(&self, suffix: &str) -> Result<Vec<u64>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(suffix) else { continue };
            if let Ok(id) = stem.parse::<u64>() {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Segment ids present in the directory, ascending.
    pub fn segment_ids(&self) -> Result<Vec<u64>> {
        self.ids_with_suffix(SEGMENT_SUFFIX)
    }

    /// Sparse-index ids present in the directory, ascending.
    pub fn index_ids(&self) -> Result<Vec<u64>> {
        self.ids_with_suffix(INDEX_SUFFIX)
    }

    /// Ids with an unavailable marker present, ascending.
    pub fn marker_ids(&self) -> Result<Vec<u64>> {
        self.ids_with_suffix(UNAVAILABLE_SUFFIX)
    }

    /// Whether any unavailable marker exists in the directory.
    pub fn any_marker(&self) -> Result<bool> {
        Ok(!self.marker_ids()?.is_empty())
    }

    pub fn has_marker(&self, id: u64) -> bool {
        self.marker_path(id).exists()
    }

    pub fn create_marker(&self, id: u64) -> Result<()> {
        fs::File::create(self.marker_path(id))?;
        Ok(())
    }

    pub fn remove_marker(&self, id: u64) -> Result<()> {
        fs::remove_file(self.marker_path(id))?;
        Ok(())
    }

    /// Allocates the next segment id: the smallest non-negative integer not
    /// used by any segment file. Ids freed by compaction get reused.
    pub fn next_segment_id(&self) -> Result<u64> {
        let mut id = 0u64;
        for existing in self.segment_ids()? {
            if existing == id {
                id += 1;
            } else if existing > id {
                break;
            }
        }
        Ok(id)
    }
}
