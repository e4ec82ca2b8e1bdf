//! Lock-free coordinator counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by both coordinators.
#[derive(Debug, Default)]
pub struct CoordinatorStats {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    corrupt_entries: AtomicU64,
    cache_read_failures: AtomicU64,
    cache_write_failures: AtomicU64,
    repopulations: AtomicU64,
    store_fallbacks: AtomicU64,
    ingested: AtomicU64,
}

macro_rules! counter {
    ($($record:ident => $field:ident),* $(,)?) => {
        impl CoordinatorStats {
            $(
                pub fn $record(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*
        }
    };
}

counter! {
    record_hit => cache_hits,
    record_miss => cache_misses,
    record_corrupt_entry => corrupt_entries,
    record_cache_read_failure => cache_read_failures,
    record_cache_write_failure => cache_write_failures,
    record_repopulation => repopulations,
    record_store_fallback => store_fallbacks,
    record_ingest => ingested,
}

impl CoordinatorStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            corrupt_entries: self.corrupt_entries.load(Ordering::Relaxed),
            cache_read_failures: self.cache_read_failures.load(Ordering::Relaxed),
            cache_write_failures: self.cache_write_failures.load(Ordering::Relaxed),
            repopulations: self.repopulations.load(Ordering::Relaxed),
            store_fallbacks: self.store_fallbacks.load(Ordering::Relaxed),
            ingested: self.ingested.load(Ordering::Relaxed),
        }
    }
}

/// Statistics about coordinator behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Reads answered from the cache.
    pub cache_hits: u64,
    /// Reads that found no usable cache entry.
    pub cache_misses: u64,
    /// Cache entries that failed to decode.
    pub corrupt_entries: u64,
    /// Cache reads that failed or timed out.
    pub cache_read_failures: u64,
    /// Cache writes that failed or timed out.
    pub cache_write_failures: u64,
    /// Successful cache writes after a durable fallback.
    pub repopulations: u64,
    /// Reads that consulted the durable store.
    pub store_fallbacks: u64,
    /// Records durably written.
    pub ingested: u64,
}

impl StatsSnapshot {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}
