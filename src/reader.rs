use std::path::PathBuf;

use crate::dir::Directory;
use crate::error::Result;
use crate::segment::reader::lookup;

/// Read-only access to a store directory.
///
/// The reader takes no lock and keeps no state beyond the directory path,
/// so any number can run in parallel with each other and with a live
/// writer. It sees a key once the writer has flushed it to a segment;
/// unflushed writes live only in the writer's memtable. Segments
/// appearing and disappearing under compaction are handled by the lookup
/// protocol: retired segments stay readable through the grace period, and
/// the merged segment is published before its inputs are retired.
#[derive(Debug, Clone)]
pub struct Reader {
    dir: Directory,
}

impl Reader {
    /// Opens a reader on `dir`. The directory does not need to exist yet;
    /// lookups against a missing directory report the IO error.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Directory::new(dir),
        }
    }

    /// Point lookup across every readable segment; the newest timestamp
    /// wins when a key appears in several.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(lookup(&self.dir, key)?.map(|hit| hit.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::Store;
    use std::time::Duration;
    use tempfile::TempDir;

    fn quiet_config(dir: &std::path::Path) -> Config {
        Config::new(dir)
            .compaction_interval(Duration::from_secs(3600))
            .translog_sync_interval(Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_reader_sees_flushed_writes() -> Result<()> {
        let tmp = TempDir::new().expect("temp dir");
        let store = Store::open_with_config(quiet_config(tmp.path()))?;
        let reader = Reader::open(tmp.path());

        store.set(b"k", b"v1")?;
        // unflushed writes are invisible to the reader
        assert_eq!(reader.get(b"k")?, None);

        store.flush()?;
        assert_eq!(reader.get(b"k")?, Some(b"v1".to_vec()));

        // a newer flushed value replaces the old one
        store.set(b"k", b"v2")?;
        store.flush()?;
        assert_eq!(reader.get(b"k")?, Some(b"v2".to_vec()));

        store.close().await
    }

    #[tokio::test]
    async fn test_reader_works_alongside_live_writer() -> Result<()> {
        let tmp = TempDir::new().expect("temp dir");
        let store = Store::open_with_config(quiet_config(tmp.path()))?;
        let reader = Reader::open(tmp.path());

        for i in 0..10u32 {
            store.set(format!("key{i}").as_bytes(), format!("value{i}").as_bytes())?;
        }
        store.flush()?;

        // the writer keeps going; already-flushed keys stay readable
        for i in 10..20u32 {
            store.set(format!("key{i}").as_bytes(), format!("value{i}").as_bytes())?;
            let flushed = reader.get(b"key3")?;
            assert_eq!(flushed, Some(b"value3".to_vec()));
        }

        store.close().await
    }

    #[tokio::test]
    async fn test_reader_without_writer() -> Result<()> {
        let tmp = TempDir::new().expect("temp dir");
        {
            let store = Store::open_with_config(quiet_config(tmp.path()))?;
            store.set(b"persisted", b"yes")?;
            store.close().await?;
        }

        // no live writer, no lock participation
        let reader = Reader::open(tmp.path());
        assert_eq!(reader.get(b"persisted")?, Some(b"yes".to_vec()));
        assert_eq!(reader.get(b"missing")?, None);
        Ok(())
    }
}
