//! Cache Statistics
//!
//! Lock-free counters describing how the cache is being used.

use std::sync::atomic::{AtomicU64, Ordering};

/// Kind of single-value lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Snapshot,
    Field,
}

/// Cache statistics collector
#[derive(Debug, Default)]
pub struct CacheStats {
    snapshot_hits: AtomicU64,
    snapshot_misses: AtomicU64,
    field_hits: AtomicU64,
    field_misses: AtomicU64,
    decode_errors: AtomicU64,
    rebuilds: AtomicU64,
    skipped_fields: AtomicU64,
    timeouts: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, lookup: Lookup) {
        match lookup {
            Lookup::Snapshot => self.snapshot_hits.fetch_add(1, Ordering::Relaxed),
            Lookup::Field => self.field_hits.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_miss(&self, lookup: Lookup) {
        match lookup {
            Lookup::Snapshot => self.snapshot_misses.fetch_add(1, Ordering::Relaxed),
            Lookup::Field => self.field_misses.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rebuild(&self) {
        self.rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_fields(&self, count: usize) {
        self.skipped_fields
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            snapshot_hits: self.snapshot_hits.load(Ordering::Relaxed),
            snapshot_misses: self.snapshot_misses.load(Ordering::Relaxed),
            field_hits: self.field_hits.load(Ordering::Relaxed),
            field_misses: self.field_misses.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
            skipped_fields: self.skipped_fields.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Counter values at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub snapshot_hits: u64,
    pub snapshot_misses: u64,
    pub field_hits: u64,
    pub field_misses: u64,
    pub decode_errors: u64,
    pub rebuilds: u64,
    pub skipped_fields: u64,
    pub timeouts: u64,
}

impl StatsSnapshot {
    /// Hits over all single-value lookups (0.0 when there were none)
    pub fn hit_ratio(&self) -> f64 {
        let hits = (self.snapshot_hits + self.field_hits) as f64;
        let total = hits + (self.snapshot_misses + self.field_misses) as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }
}
