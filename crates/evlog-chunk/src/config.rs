//! Chunk database configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use evlog_error::{EvlogError, Result};

use crate::format::{CHUNK_FOOTER_SIZE, CHUNK_HEADER_SIZE};
use crate::naming::{FileNamingStrategy, VersionedPatternFileNamingStrategy};

/// Default data capacity of one chunk (256 MiB).
pub const DEFAULT_CHUNK_SIZE: u32 = 256 * 1024 * 1024;

/// Settings shared by the chunk manager and the chunks it creates.
#[derive(Debug, Clone)]
pub struct ChunkDbConfig {
    path: PathBuf,
    chunk_size: u32,
    max_chunks_cache_size: u64,
    switch_wait_timeout: Duration,
    file_naming_strategy: Arc<dyn FileNamingStrategy>,
}

impl ChunkDbConfig {
    /// Configuration for a database in `path` with default settings: 256 MiB
    /// chunks, a cache budget of two full chunks, no wait for readers when
    /// switching, and `chunk-` versioned file names.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let naming = VersionedPatternFileNamingStrategy::new(
            path.clone(),
            VersionedPatternFileNamingStrategy::DEFAULT_PREFIX,
        );
        Self {
            path,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunks_cache_size: 2 * full_chunk_footprint(DEFAULT_CHUNK_SIZE),
            switch_wait_timeout: Duration::ZERO,
            file_naming_strategy: Arc::new(naming),
        }
    }

    /// Set the chunk data capacity. The cache budget is left unchanged.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the memory budget for cached chunks, in bytes. Zero disables
    /// caching.
    #[must_use]
    pub fn with_max_chunks_cache_size(mut self, bytes: u64) -> Self {
        self.max_chunks_cache_size = bytes;
        self
    }

    /// Set how long a chunk switch waits for readers of the switched chunk.
    #[must_use]
    pub fn with_switch_wait_timeout(mut self, timeout: Duration) -> Self {
        self.switch_wait_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_file_naming_strategy(mut self, strategy: Arc<dyn FileNamingStrategy>) -> Self {
        self.file_naming_strategy = strategy;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    #[must_use]
    pub const fn max_chunks_cache_size(&self) -> u64 {
        self.max_chunks_cache_size
    }

    #[must_use]
    pub const fn switch_wait_timeout(&self) -> Duration {
        self.switch_wait_timeout
    }

    #[must_use]
    pub fn file_naming_strategy(&self) -> &Arc<dyn FileNamingStrategy> {
        &self.file_naming_strategy
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(EvlogError::InvalidConfig(
                "chunk_size must be > 0".to_owned(),
            ));
        }
        if self.path.as_os_str().is_empty() {
            return Err(EvlogError::InvalidConfig(
                "database path must not be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Bytes a chunk of `chunk_size` occupies when fully allocated.
#[must_use]
pub const fn full_chunk_footprint(chunk_size: u32) -> u64 {
    chunk_size as u64 + CHUNK_HEADER_SIZE as u64 + CHUNK_FOOTER_SIZE as u64
}
