use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a siltdb store.
///
/// The defaults are the store's tuning constants; tests and embedders can
/// override any of them through the builder setters.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the translog, segments, indexes, and lock file.
    pub dir: PathBuf,

    /// When true, every translog append is fsynced before `set` returns.
    /// Otherwise the periodic sync task makes appends durable within
    /// `translog_sync_interval`.
    pub strict_sync: bool,

    /// Memtable size that triggers a flush to a segment (default: 3 MiB).
    pub flush_threshold: usize,

    /// How many writes go by between memtable size checks (default: 3000).
    pub size_check_interval: u64,

    /// Records per sparse-index entry in a segment (default: 1000).
    pub index_stride: usize,

    /// Segment count above which the compactor merges two (default: 5).
    pub compaction_threshold: usize,

    /// How often the compactor looks for work (default: 5s).
    pub compaction_interval: Duration,

    /// How long retired segments stay on disk for in-flight readers
    /// (default: 5s).
    pub grace_period: Duration,

    /// Translog sync cadence when not in strict mode (default: 1s).
    pub translog_sync_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./siltdb"),
            strict_sync: false,
            flush_threshold: 3 * 1024 * 1024,
            size_check_interval: 3000,
            index_stride: 1000,
            compaction_threshold: 5,
            compaction_interval: Duration::from_secs(5),
            grace_period: Duration::from_secs(5),
            translog_sync_interval: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Create a new config for the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Set the translog durability mode.
    pub fn strict_sync(mut self, strict: bool) -> Self {
        self.strict_sync = strict;
        self
    }

    /// Set the memtable flush threshold in bytes.
    pub fn flush_threshold(mut self, bytes: usize) -> Self {
        self.flush_threshold = bytes;
        self
    }

    /// Set how many writes go by between memtable size checks.
    pub fn size_check_interval(mut self, writes: u64) -> Self {
        self.size_check_interval = writes;
        self
    }

    /// Set the sparse-index stride.
    pub fn index_stride(mut self, records: usize) -> Self {
        self.index_stride = records;
        self
    }

    /// Set the segment count that triggers compaction.
    pub fn compaction_threshold(mut self, segments: usize) -> Self {
        self.compaction_threshold = segments;
        self
    }

    /// Set the compaction check interval.
    pub fn compaction_interval(mut self, interval: Duration) -> Self {
        self.compaction_interval = interval;
        self
    }

    /// Set the post-retirement grace period.
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Set the periodic translog sync interval.
    pub fn translog_sync_interval(mut self, interval: Duration) -> Self {
        self.translog_sync_interval = interval;
        self
    }
}
