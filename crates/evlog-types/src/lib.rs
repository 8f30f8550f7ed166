//! Core value types shared by the chunk store and the index writer.

pub mod commit;
pub mod metadata;
pub mod record;
pub mod streams;
pub mod version;

pub use commit::{CommitCheckResult, CommitDecision, TransactionInfo};
pub use metadata::{StreamMetadata, TRUNCATE_BEFORE_KEY, rewrite_truncate_before};
pub use record::{CommitLogRecord, EventId, LogRecord, LogRecordType, PrepareFlags, PrepareLogRecord};
pub use streams::{is_metastream, metastream_of, original_stream_of};
pub use version::{EventNumber, ExpectedVersion};
