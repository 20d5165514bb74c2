use std::fs::{File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::codec::Record;
use crate::error::{Error, Result};

/// Append-only write-ahead log for the current memtable epoch.
///
/// Every record accepted by the store is appended here before it enters
/// the memtable. In strict mode each append is fsynced before returning;
/// otherwise the periodic sync task makes appends durable within its
/// interval. The log is truncated whenever the memtable is flushed to a
/// segment, so its contents always mirror the live memtable.
#[derive(Debug)]
pub struct Translog {
    file: File,
    path: PathBuf,
    strict: bool,
}

impl Translog {
    /// Creates the log file, truncating any previous content.
    pub fn create(path: impl Into<PathBuf>, strict: bool) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self { file, path, strict })
    }

    /// Appends one record. Durable on return in strict mode.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        let mut buf = Vec::with_capacity(record.encoded_len());
        record.write_to(&mut buf)?;
        self.file.write_all(&buf)?;
        if self.strict {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Forces everything appended so far onto disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Truncates the log to zero length for the next memtable epoch.
    pub fn reset(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        if self.strict {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Closes the log and deletes its file.
    pub fn close_and_remove(self) -> Result<()> {
        drop(self.file);
        std::fs::remove_file(&self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Replays the log at `path`, invoking `consumer` for each record in
/// append order. A record torn by a crash mid-append terminates replay
/// without error; everything before it is delivered.
pub fn replay(path: &Path, mut consumer: impl FnMut(Record)) -> Result<()> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    loop {
        match Record::read_from(&mut reader) {
            Ok(Some(record)) => consumer(record),
            Ok(None) => return Ok(()),
            Err(Error::Corrupt(reason)) => {
                tracing::warn!(%reason, "translog ends in a torn record, dropping it");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn record(key: &str, value: &str, timestamp: u64) -> Record {
        Record {
            key: key.as_bytes().to_vec(),
            value: value.as_bytes().to_vec(),
            timestamp,
        }
    }

    #[test]
    fn test_append_and_replay() {
        let tmp = TempDir::new().expect("temp dir");
        let path = tmp.path().join("translog");

        let mut log = Translog::create(&path, true).expect("create translog");
        log.append(&record("k1", "v1", 1)).expect("append");
        log.append(&record("k2", "v2", 2)).expect("append");
        log.append(&record("k1", "v3", 3)).expect("append");
        drop(log);

        let mut seen = Vec::new();
        replay(&path, |r| seen.push(r)).expect("replay");
        assert_eq!(
            seen,
            vec![record("k1", "v1", 1), record("k2", "v2", 2), record("k1", "v3", 3)]
        );
    }

    #[test]
    fn test_replay_tolerates_torn_tail() {
        let tmp = TempDir::new().expect("temp dir");
        let path = tmp.path().join("translog");

        let mut log = Translog::create(&path, false).expect("create translog");
        log.append(&record("whole", "record", 1)).expect("append");
        drop(log);

        // Simulate a crash mid-append: a second record cut short.
        let mut torn = Vec::new();
        record("torn", "never finished", 2)
            .write_to(&mut torn)
            .unwrap();
        torn.truncate(torn.len() / 2);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&torn).unwrap();
        drop(file);

        let mut seen = Vec::new();
        replay(&path, |r| seen.push(r)).expect("replay");
        assert_eq!(seen, vec![record("whole", "record", 1)]);
    }

    #[test]
    fn test_replay_empty_log() {
        let tmp = TempDir::new().expect("temp dir");
        let path = tmp.path().join("translog");
        Translog::create(&path, false).expect("create translog");

        let mut count = 0;
        replay(&path, |_| count += 1).expect("replay");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_reset_truncates() {
        let tmp = TempDir::new().expect("temp dir");
        let path = tmp.path().join("translog");

        let mut log = Translog::create(&path, true).expect("create translog");
        log.append(&record("k", "v", 1)).expect("append");
        assert!(fs::metadata(&path).unwrap().len() > 0);

        log.reset().expect("reset");
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);

        // The log is usable again after reset.
        log.append(&record("k2", "v2", 2)).expect("append");
        drop(log);
        let mut seen = Vec::new();
        replay(&path, |r| seen.push(r)).expect("replay");
        assert_eq!(seen, vec![record("k2", "v2", 2)]);
    }

    #[test]
    fn test_close_and_remove_deletes_file() {
        let tmp = TempDir::new().expect("temp dir");
        let path = tmp.path().join("translog");

        let log = Translog::create(&path, false).expect("create translog");
        assert!(path.exists());
        log.close_and_remove().expect("close");
        assert!(!path.exists());
    }
}
