//! Cache Statistics
//!
//! Lock-free counters per region and the snapshots exported to logs and
//! Prometheus.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::RegionName;

/// Per-region counters
#[derive(Debug, Default)]
pub struct RegionCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    rejected_loads: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
    expirations: AtomicU64,
}

impl RegionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// A read-through populate lost a race with a write and was dropped
    pub fn record_rejected_load(&self) {
        self.rejected_loads.fetch_add(1, Ordering::Relaxed);
    }

    /// Capacity-driven removals
    pub fn record_evictions(&self, n: u64) {
        self.evictions.fetch_add(n, Ordering::Relaxed);
    }

    /// Explicit evictions requested by the coordinator
    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_expirations(&self, n: u64) {
        self.expirations.fetch_add(n, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get point-in-time snapshot
    pub fn snapshot(&self, region: RegionName, entries: usize, capacity: usize) -> RegionStats {
        RegionStats {
            region,
            entries,
            capacity,
            hits: self.hits(),
            misses: self.misses(),
            inserts: self.inserts.load(Ordering::Relaxed),
            rejected_loads: self.rejected_loads.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time statistics for one region
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionStats {
    pub region: RegionName,
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub rejected_loads: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub expirations: u64,
}

impl RegionStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
