//! Statistics for the mount cache.
//!
//! All counters are lock-free atomics so recording never contends with the
//! manager's critical section.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one manager instance.
#[derive(Debug, Default)]
pub struct ManagerStats {
    /// Lookups answered from the cache.
    pub hits: AtomicU64,
    /// Lookups that required a mount.
    pub misses: AtomicU64,
    /// Successful mounts.
    pub mounts: AtomicU64,
    /// Evictions, including explicit rotation.
    pub evictions: AtomicU64,
}

impl ManagerStats {
    /// Create zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cache hit.
    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache miss.
    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful mount.
    #[inline]
    pub fn record_mount(&self) {
        self.mounts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an eviction.
    #[inline]
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            mounts: self.mounts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// A consistent-enough view of [`ManagerStats`] for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that required a mount.
    pub misses: u64,
    /// Successful mounts.
    pub mounts: u64,
    /// Evictions, including explicit rotation.
    pub evictions: u64,
}

impl StatsSnapshot {
    /// Fraction of lookups answered from the cache, 0.0 when idle.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            {
                self.hits as f64 / total as f64
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = ManagerStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_mount();
        stats.record_eviction();

        let snap = stats.snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.mounts, 1);
        assert_eq!(snap.evictions, 1);
    }

    #[test]
    fn test_hit_rate() {
        let stats = ManagerStats::new();
        assert_eq!(stats.snapshot().hit_rate(), 0.0);
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        let rate = stats.snapshot().hit_rate();
        assert!((rate - 0.75).abs() < f64::EPSILON);
    }
}
