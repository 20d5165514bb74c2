use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::codec::Record;
use crate::compaction;
use crate::config::Config;
use crate::dir::Directory;
use crate::error::{Error, Result};
use crate::flock::WriteLock;
use crate::memtable::Memtable;
use crate::scheduler::Scheduler;
use crate::segment::reader::lookup;
use crate::segment::writer::SegmentWriter;
use crate::tasks::{CompactionTask, TranslogSyncTask};
use crate::translog::{self, Translog};

/// State shared between the store façade and its background tasks.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) dir: Directory,
    pub(crate) memtable: RwLock<Memtable>,
    pub(crate) translog: Mutex<Option<Translog>>,
    closed: AtomicBool,
    writes: AtomicU64,
}

impl Shared {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// The single-writer store façade.
///
/// Writes go through the translog into the memtable; once the memtable
/// passes the flush threshold it becomes an immutable sorted segment with
/// a sparse index. Lookups consult the memtable first, then every
/// readable segment, newest timestamp winning. Two background tasks run
/// until [`close`](Store::close): the periodic translog syncer (unless
/// strict sync is on) and the compactor.
pub struct Store {
    shared: Arc<Shared>,
    scheduler: Mutex<Option<Scheduler>>,
    lock: Mutex<Option<WriteLock>>,
}

impl Store {
    /// Opens the store in `dir` with default configuration.
    pub fn open(dir: impl Into<PathBuf>, strict_sync: bool) -> Result<Self> {
        Self::open_with_config(Config::new(dir).strict_sync(strict_sync))
    }

    /// Opens a store, recovering any translog a previous run left behind.
    /// Must be called inside a tokio runtime: the background tasks are
    /// spawned onto it.
    pub fn open_with_config(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.dir)?;
        let dir = Directory::new(&config.dir);
        let lock = WriteLock::acquire(dir.lock_path())?;

        // Crash leftovers: segments still behind their unavailable marker.
        let swept = compaction::sweep_stale(&dir)?;
        if swept > 0 {
            tracing::warn!(segments = swept, "swept stale segments from a previous run");
        }

        let translog_path = dir.translog_path();
        if translog_path.exists() {
            recover(&dir, &config, &translog_path)?;
        }
        let translog = Translog::create(&translog_path, config.strict_sync)?;

        let shared = Arc::new(Shared {
            dir,
            memtable: RwLock::new(Memtable::new()),
            translog: Mutex::new(Some(translog)),
            closed: AtomicBool::new(false),
            writes: AtomicU64::new(0),
            config,
        });

        let mut scheduler = Scheduler::new();
        if !shared.config.strict_sync {
            scheduler.register(Arc::new(TranslogSyncTask::new(Arc::clone(&shared))));
        }
        scheduler.register(Arc::new(CompactionTask::new(Arc::clone(&shared))));

        tracing::info!(
            dir = %shared.config.dir.display(),
            strict_sync = shared.config.strict_sync,
            "opened store"
        );
        Ok(Self {
            shared,
            scheduler: Mutex::new(Some(scheduler)),
            lock: Mutex::new(Some(lock)),
        })
    }

    /// Writes a key-value pair. The record is durable on return under
    /// strict sync, and within the sync interval otherwise.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.shared.is_closed() {
            return Err(Error::Closed);
        }
        if key.is_empty() {
            return Err(Error::InvalidInput("keys must be non-empty".to_string()));
        }

        let record = Record {
            key: key.to_vec(),
            value: value.to_vec(),
            timestamp: now_nanos(),
        };
        {
            let mut translog = self.shared.translog.lock()?;
            match translog.as_mut() {
                Some(log) => log.append(&record)?,
                None => return Err(Error::Closed),
            }
        }
        self.shared
            .memtable
            .read()?
            .insert(record.key, record.value, record.timestamp);

        let writes = self.shared.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % self.shared.config.size_check_interval == 0 {
            let size = self.shared.memtable.read()?.approx_size();
            if size > self.shared.config.flush_threshold {
                self.flush_inner()?;
            }
        }
        Ok(())
    }

    /// Point lookup. The memtable always dominates: it holds the most
    /// recent write for any key it contains.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.shared.is_closed() {
            return Err(Error::Closed);
        }
        if let Some(value) = self.shared.memtable.read()?.get(key) {
            return Ok(Some(value.data));
        }
        Ok(lookup(&self.shared.dir, key)?.map(|hit| hit.value))
    }

    /// Persists the memtable as a new segment and starts a fresh epoch
    /// with an empty memtable and a truncated translog. A no-op segment-
    /// wise when the memtable is empty.
    pub fn flush(&self) -> Result<()> {
        if self.shared.is_closed() {
            return Err(Error::Closed);
        }
        self.flush_inner()
    }

    fn flush_inner(&self) -> Result<()> {
        let count = {
            let memtable = self.shared.memtable.read()?;
            write_segment(&self.shared.dir, &self.shared.config, &memtable)?
        };
        {
            let mut memtable = self.shared.memtable.write()?;
            *memtable = Memtable::new();
        }
        {
            let mut translog = self.shared.translog.lock()?;
            if let Some(log) = translog.as_mut() {
                log.reset()?;
            }
        }
        if count > 0 {
            tracing::info!(records = count, "flushed memtable to segment");
        }
        Ok(())
    }

    /// Closes the store: background tasks stop at their next tick, the
    /// memtable is flushed, and the translog and write lock are removed.
    /// Every operation afterwards returns `Error::Closed`.
    pub async fn close(&self) -> Result<()> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::Closed);
        }
        let scheduler = self.scheduler.lock()?.take();
        if let Some(scheduler) = scheduler {
            scheduler.shutdown().await?;
        }

        self.flush_inner()?;
        {
            let mut translog = self.shared.translog.lock()?;
            if let Some(log) = translog.take() {
                log.close_and_remove()?;
            }
        }
        let lock = self.lock.lock()?.take();
        if let Some(lock) = lock {
            lock.release_and_remove()?;
        }
        tracing::info!(dir = %self.shared.config.dir.display(), "closed store");
        Ok(())
    }
}

/// Replays a translog left by a previous run into a throwaway memtable
/// and persists it as a segment, then deletes the log. Records replay in
/// append order, so the last write for a key is the one that sticks.
fn recover(dir: &Directory, config: &Config, translog_path: &Path) -> Result<()> {
    let recovered = Memtable::new();
    translog::replay(translog_path, |record| {
        recovered.insert(record.key, record.value, record.timestamp);
    })?;
    if !recovered.is_empty() {
        let count = write_segment(dir, config, &recovered)?;
        tracing::info!(records = count, "recovered translog into a new segment");
    }
    std::fs::remove_file(translog_path)?;
    Ok(())
}

/// Writes the memtable's records, in key order, as a new published
/// segment. Empty memtables produce nothing. Returns the record count.
fn write_segment(dir: &Directory, config: &Config, memtable: &Memtable) -> Result<usize> {
    if memtable.is_empty() {
        return Ok(0);
    }
    let id = dir.next_segment_id()?;
    let mut writer = SegmentWriter::create(dir, id, config.index_stride)?;
    for (key, value) in memtable.iter() {
        writer.append(&Record {
            key,
            value: value.data,
            timestamp: value.timestamp,
        })?;
    }
    writer.finish()
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
