//! Index writer cache sizing.

use evlog_error::{EvlogError, Result};
use serde::{Deserialize, Serialize};

/// Capacities of the caches kept by [`IndexWriter`](crate::IndexWriter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexWriterConfig {
    /// Unpinned entries kept in the transaction-info cache.
    pub transaction_info_cache_capacity: usize,
    /// Unpinned entries kept in the stream-version cache.
    pub stream_info_cache_capacity: usize,
    /// Estimated bytes of committed-event dedup entries.
    pub committed_events_mem_limit: usize,
    /// Committed-event dedup entries.
    pub committed_events_max_count: usize,
}

impl IndexWriterConfig {
    pub const DEFAULT_TRANSACTION_INFO_CAPACITY: usize = 50_000;
    pub const DEFAULT_STREAM_INFO_CAPACITY: usize = 100_000;
    pub const DEFAULT_COMMITTED_EVENTS_MEM_LIMIT: usize = 8 * 1024 * 1024;

    #[must_use]
    pub const fn with_transaction_info_cache_capacity(mut self, capacity: usize) -> Self {
        self.transaction_info_cache_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn with_stream_info_cache_capacity(mut self, capacity: usize) -> Self {
        self.stream_info_cache_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn with_committed_events_limits(mut self, mem_limit: usize, max_count: usize) -> Self {
        self.committed_events_mem_limit = mem_limit;
        self.committed_events_max_count = max_count;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.committed_events_mem_limit == 0 {
            return Err(EvlogError::InvalidConfig(
                "committed_events_mem_limit must be > 0".to_owned(),
            ));
        }
        if self.committed_events_max_count == 0 {
            return Err(EvlogError::InvalidConfig(
                "committed_events_max_count must be > 0".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for IndexWriterConfig {
    fn default() -> Self {
        Self {
            transaction_info_cache_capacity: Self::DEFAULT_TRANSACTION_INFO_CAPACITY,
            stream_info_cache_capacity: Self::DEFAULT_STREAM_INFO_CAPACITY,
            committed_events_mem_limit: Self::DEFAULT_COMMITTED_EVENTS_MEM_LIMIT,
            committed_events_max_count: usize::MAX,
        }
    }
}
