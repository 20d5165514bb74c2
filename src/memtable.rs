use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_skiplist::SkipMap;

/// A value held in the memtable together with its write timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub data: Vec<u8>,
    pub timestamp: u64,
}

/// The live in-memory table: an ordered map from key to the most recent
/// write observed in the current epoch.
///
/// Backed by a skip list, so point operations are O(log n), iteration is
/// in ascending key order, and lookups never block the writer. The
/// approximate size (key bytes + value bytes + 8 per record) is maintained
/// incrementally for the flush-threshold check.
#[derive(Debug)]
pub struct Memtable {
    data: SkipMap<Vec<u8>, Value>,
    size: AtomicUsize,
}

impl Memtable {
    pub fn new() -> Self {
        Self {
            data: SkipMap::new(),
            size: AtomicUsize::new(0),
        }
    }

    /// Inserts or replaces the record for `key`.
    pub fn insert(&self, key: Vec<u8>, data: Vec<u8>, timestamp: u64) {
        let mut delta = key.len() as isize + data.len() as isize + 8;
        if let Some(prev) = self.data.get(&key) {
            delta -= (prev.key().len() + prev.value().data.len() + 8) as isize;
        }
        self.data.insert(key, Value { data, timestamp });
        if delta >= 0 {
            self.size.fetch_add(delta as usize, Ordering::Relaxed);
        } else {
            self.size.fetch_sub(delta.unsigned_abs(), Ordering::Relaxed);
        }
    }

    /// Returns the record for `key`, if any.
    pub fn get(&self, key: &[u8]) -> Option<Value> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Approximate memory footprint: sum of key and value lengths plus 8
    /// bytes of timestamp per record.
    pub fn approx_size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Iterates all records in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (Vec<u8>, Value)> + '_ {
        self.data
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
    }
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}
