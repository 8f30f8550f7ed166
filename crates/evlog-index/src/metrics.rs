//! Index writer counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters shared between an [`IndexWriter`](crate::IndexWriter) and
/// whoever exports them.
#[derive(Debug, Default)]
pub struct IndexWriterMetrics {
    cached_trans_info: AtomicU64,
    not_cached_trans_info: AtomicU64,
    commit_checks: AtomicU64,
    pre_commits: AtomicU64,
    fatal_errors: AtomicU64,
}

/// Point-in-time copy of [`IndexWriterMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexWriterMetricsSnapshot {
    pub cached_trans_info: u64,
    pub not_cached_trans_info: u64,
    pub commit_checks_total: u64,
    pub pre_commits_total: u64,
    pub fatal_errors_total: u64,
}

impl IndexWriterMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_trans_info_hit(&self) {
        self.cached_trans_info.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_trans_info_miss(&self) {
        self.not_cached_trans_info.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit_check(&self) {
        self.commit_checks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_pre_commit(&self) {
        self.pre_commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fatal(&self) {
        self.fatal_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Transaction-info lookups answered from cache.
    #[must_use]
    pub fn cached_trans_info(&self) -> u64 {
        self.cached_trans_info.load(Ordering::Relaxed)
    }

    /// Transaction-info lookups that had to scan the log.
    #[must_use]
    pub fn not_cached_trans_info(&self) -> u64 {
        self.not_cached_trans_info.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> IndexWriterMetricsSnapshot {
        IndexWriterMetricsSnapshot {
            cached_trans_info: self.cached_trans_info(),
            not_cached_trans_info: self.not_cached_trans_info(),
            commit_checks_total: self.commit_checks.load(Ordering::Relaxed),
            pre_commits_total: self.pre_commits.load(Ordering::Relaxed),
            fatal_errors_total: self.fatal_errors.load(Ordering::Relaxed),
        }
    }
}
