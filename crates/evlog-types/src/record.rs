//! Log records consumed by the index writer.
//!
//! Only the fields the commit path needs are modelled; the byte-level record
//! codec belongs to the log reader implementation.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client-supplied identifier of a single event, used for idempotency.
pub type EventId = Uuid;

bitflags! {
    /// Per-prepare flag set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PrepareFlags: u16 {
        /// The prepare carries event data.
        const DATA = 0x0001;
        /// First prepare of a transaction.
        const TRANSACTION_BEGIN = 0x0002;
        /// Last prepare of a transaction.
        const TRANSACTION_END = 0x0004;
        /// The prepare hard-deletes its stream.
        const STREAM_DELETE = 0x0008;
        /// The prepare was written together with its commit.
        const IS_COMMITTED = 0x0020;
        /// Event payload is JSON.
        const IS_JSON = 0x0100;
    }
}

impl PrepareFlags {
    /// Flags that make a prepare meaningful for idempotency and numbering.
    pub const RELEVANT: Self = Self::DATA.union(Self::STREAM_DELETE);

    /// Whether a prepare with these flags takes part in idempotency checks.
    #[inline]
    #[must_use]
    pub const fn is_relevant(self) -> bool {
        self.intersects(Self::RELEVANT)
    }
}

/// Discriminant of [`LogRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogRecordType {
    Prepare,
    Commit,
}

/// A prepare record: one proposed event of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareLogRecord {
    /// Position of this record in the log.
    pub log_position: i64,
    /// Position of the first prepare of the owning transaction.
    pub transaction_position: i64,
    /// Index of this prepare within its transaction.
    pub transaction_offset: i32,
    pub event_stream_id: String,
    pub expected_version: i64,
    pub flags: PrepareFlags,
    pub event_id: EventId,
    /// Raw event payload.
    pub data: Vec<u8>,
}

impl PrepareLogRecord {
    /// Whether this prepare carries data or a stream delete.
    #[inline]
    #[must_use]
    pub const fn is_relevant(&self) -> bool {
        self.flags.is_relevant()
    }
}

/// A commit record finalizing a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitLogRecord {
    pub log_position: i64,
    /// Position of the first prepare of the committed transaction.
    pub transaction_position: i64,
    /// Event number assigned to the transaction's first event.
    pub first_event_number: i64,
}

/// Tagged log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRecord {
    Prepare(PrepareLogRecord),
    Commit(CommitLogRecord),
}

impl LogRecord {
    #[must_use]
    pub const fn log_position(&self) -> i64 {
        match self {
            Self::Prepare(prepare) => prepare.log_position,
            Self::Commit(commit) => commit.log_position,
        }
    }

    #[must_use]
    pub const fn record_type(&self) -> LogRecordType {
        match self {
            Self::Prepare(_) => LogRecordType::Prepare,
            Self::Commit(_) => LogRecordType::Commit,
        }
    }

    #[must_use]
    pub const fn as_prepare(&self) -> Option<&PrepareLogRecord> {
        match self {
            Self::Prepare(prepare) => Some(prepare),
            Self::Commit(_) => None,
        }
    }

    #[must_use]
    pub fn into_prepare(self) -> Option<PrepareLogRecord> {
        match self {
            Self::Prepare(prepare) => Some(prepare),
            Self::Commit(_) => None,
        }
    }
}

impl From<PrepareLogRecord> for LogRecord {
    fn from(prepare: PrepareLogRecord) -> Self {
        Self::Prepare(prepare)
    }
}

impl From<CommitLogRecord> for LogRecord {
    fn from(commit: CommitLogRecord) -> Self {
        Self::Commit(commit)
    }
}
