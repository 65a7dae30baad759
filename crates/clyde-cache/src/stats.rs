//! Cache hit/miss counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, shared across threads.
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Object-tier hits.
    pub object_hits: AtomicU64,
    /// Object-tier misses.
    pub object_misses: AtomicU64,
    /// Artifact-tier hits.
    pub artifact_hits: AtomicU64,
    /// Artifact-tier misses.
    pub artifact_misses: AtomicU64,
    /// Successful writes across both tiers.
    pub writes: AtomicU64,
    /// Corrupt entries purged on read.
    pub corrupt_purged: AtomicU64,
}

impl CacheStats {
    pub(crate) fn record_lookup(&self, tier_hits: &AtomicU64, tier_misses: &AtomicU64, hit: bool) {
        if hit {
            tier_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            tier_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            object_hits: self.object_hits.load(Ordering::Relaxed),
            object_misses: self.object_misses.load(Ordering::Relaxed),
            artifact_hits: self.artifact_hits.load(Ordering::Relaxed),
            artifact_misses: self.artifact_misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            corrupt_purged: self.corrupt_purged.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of the counters at one moment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    /// Object-tier hits.
    pub object_hits: u64,
    /// Object-tier misses.
    pub object_misses: u64,
    /// Artifact-tier hits.
    pub artifact_hits: u64,
    /// Artifact-tier misses.
    pub artifact_misses: u64,
    /// Successful writes across both tiers.
    pub writes: u64,
    /// Corrupt entries purged on read.
    pub corrupt_purged: u64,
}
