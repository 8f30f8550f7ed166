//! Chunk manager counters.
//!
//! Counters are `AtomicU64` with `Ordering::Relaxed`; [`ChunkManagerMetrics::snapshot`]
//! copies them into a serializable struct.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct ChunkManagerMetrics {
    chunks_added_total: AtomicU64,
    chunks_switched_total: AtomicU64,
    chunks_cached_total: AtomicU64,
    chunks_uncached_total: AtomicU64,
    caching_passes_total: AtomicU64,
    caching_requests_total: AtomicU64,
    caching_workers_started_total: AtomicU64,
}

/// Point-in-time copy of [`ChunkManagerMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ChunkManagerMetricsSnapshot {
    pub chunks_added_total: u64,
    pub chunks_switched_total: u64,
    /// Chunks loaded into memory (transitions only, redundant calls excluded).
    pub chunks_cached_total: u64,
    pub chunks_uncached_total: u64,
    /// Background caching passes executed.
    pub caching_passes_total: u64,
    /// Caching requests raised by add/switch; bursts share one pass.
    pub caching_requests_total: u64,
    pub caching_workers_started_total: u64,
}

impl ChunkManagerMetrics {
    pub(crate) fn record_added(&self) {
        self.chunks_added_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_switched(&self) {
        self.chunks_switched_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cached(&self) {
        self.chunks_cached_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_uncached(&self) {
        self.chunks_uncached_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_caching_pass(&self) {
        self.caching_passes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_caching_request(&self) {
        self.caching_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_worker_started(&self) {
        self.caching_workers_started_total.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> ChunkManagerMetricsSnapshot {
        ChunkManagerMetricsSnapshot {
            chunks_added_total: self.chunks_added_total.load(Ordering::Relaxed),
            chunks_switched_total: self.chunks_switched_total.load(Ordering::Relaxed),
            chunks_cached_total: self.chunks_cached_total.load(Ordering::Relaxed),
            chunks_uncached_total: self.chunks_uncached_total.load(Ordering::Relaxed),
            caching_passes_total: self.caching_passes_total.load(Ordering::Relaxed),
            caching_requests_total: self.caching_requests_total.load(Ordering::Relaxed),
            caching_workers_started_total: self
                .caching_workers_started_total
                .load(Ordering::Relaxed),
        }
    }
}
