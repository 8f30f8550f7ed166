//! Commit validation results and transaction bookkeeping.

use serde::{Deserialize, Serialize};

/// Outcome of an optimistic-concurrency / idempotency check.
///
/// None of these is an error: the commit pipeline branches on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommitDecision {
    /// The write may proceed.
    Ok,
    /// The writer's expected version does not match the stream.
    WrongExpectedVersion,
    /// Every event of the write is already committed.
    Idempotent,
    /// Only part of the write matches previously committed events.
    CorruptedIdempotency,
    /// The stream is hard-deleted.
    Deleted,
    /// The transaction's first prepare could not be read.
    InvalidTransaction,
}

/// Result of [`CommitDecision`] evaluation for one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitCheckResult {
    pub decision: CommitDecision,
    pub event_stream_id: String,
    pub current_version: i64,
    /// First event number of an idempotent replay, `-1` otherwise.
    pub start_event_number: i64,
    /// Last event number of an idempotent replay, `-1` otherwise.
    pub end_event_number: i64,
    pub is_soft_deleted: bool,
}

impl CommitCheckResult {
    /// A result carrying no event range.
    #[must_use]
    pub fn new(
        decision: CommitDecision,
        event_stream_id: impl Into<String>,
        current_version: i64,
        is_soft_deleted: bool,
    ) -> Self {
        Self {
            decision,
            event_stream_id: event_stream_id.into(),
            current_version,
            start_event_number: -1,
            end_event_number: -1,
            is_soft_deleted,
        }
    }

    /// An idempotent replay spanning `[start, end]`.
    #[must_use]
    pub fn idempotent(
        event_stream_id: impl Into<String>,
        current_version: i64,
        start: i64,
        end: i64,
        is_soft_deleted: bool,
    ) -> Self {
        Self {
            decision: CommitDecision::Idempotent,
            event_stream_id: event_stream_id.into(),
            current_version,
            start_event_number: start,
            end_event_number: end,
            is_soft_deleted,
        }
    }

    /// Result for a transaction whose first prepare is unreadable.
    #[must_use]
    pub fn invalid_transaction() -> Self {
        Self::new(CommitDecision::InvalidTransaction, String::new(), -1, false)
    }
}

/// Position of a prepare within its transaction, plus the transaction's stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub transaction_offset: i32,
    pub event_stream_id: String,
}

impl TransactionInfo {
    #[must_use]
    pub fn new(transaction_offset: i32, event_stream_id: impl Into<String>) -> Self {
        Self {
            transaction_offset,
            event_stream_id: event_stream_id.into(),
        }
    }

    /// The "not found" value.
    #[must_use]
    pub const fn absent() -> Self {
        Self {
            transaction_offset: i32::MIN,
            event_stream_id: String::new(),
        }
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.transaction_offset == i32::MIN && self.event_stream_id.is_empty()
    }
}
