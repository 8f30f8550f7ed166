//! Write-path commit validation.
//!
//! [`IndexWriter`] decides whether a proposed write is admissible
//! (optimistic concurrency plus idempotent-replay detection) and keeps the
//! caches that let it answer before the durable index has caught up with the
//! log. It reads the log through [`ReaderPool`] leases and the durable index
//! through [`IndexReader`].

pub mod config;
pub mod durable;
pub mod memory;
pub mod metrics;
pub mod reader;
pub mod writer;

pub use config::IndexWriterConfig;
pub use durable::IndexReader;
pub use memory::{InMemoryIndex, InMemoryLog, InMemoryLogReader};
pub use metrics::{IndexWriterMetrics, IndexWriterMetricsSnapshot};
pub use reader::{ReaderLease, ReaderPool, SeqReadResult, TransactionFileReader};
pub use writer::{FatalHook, IndexWriter};
