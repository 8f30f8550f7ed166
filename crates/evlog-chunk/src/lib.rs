//! Chunked append-only log storage.
//!
//! The log is a sequence of chunk files. [`ChunkManager`] owns them, maps
//! chunk numbers and log positions to chunks, swaps in scavenged or
//! replicated replacements, and keeps the newest chunks resident in memory
//! within a byte budget.

pub mod chunk;
pub mod config;
pub mod format;
pub mod manager;
pub mod metrics;
pub mod naming;

pub use chunk::{AppendOutcome, Chunk, ChunkReader};
pub use config::{ChunkDbConfig, DEFAULT_CHUNK_SIZE, full_chunk_footprint};
pub use format::{CHUNK_FOOTER_SIZE, CHUNK_HEADER_SIZE, ChunkFooter, ChunkHeader};
pub use manager::{ChunkManager, MAX_CHUNKS_COUNT};
pub use metrics::{ChunkManagerMetrics, ChunkManagerMetricsSnapshot};
pub use naming::{FileNamingStrategy, VersionedPatternFileNamingStrategy};
