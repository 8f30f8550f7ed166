//! Error types shared by the evlog crates.
//!
//! Three families live in one enum:
//! - caller-input failures (`OutOfRange`, `InvalidArgument`, ...), surfaced
//!   immediately and never retried internally;
//! - transient failures (`Io`, `ChunkSwitchTimeout`), which the caller may
//!   retry as a whole operation;
//! - fatal failures (`InvariantViolation`, `DatabaseCorrupt`,
//!   `MetadataCorrupt`), meaning the log or the pre-flush caches are
//!   inconsistent. See [`EvlogError::is_fatal`].
//!
//! Rejected commits (wrong expected version, idempotent replays, ...) are not
//! errors at all; they are ordinary `CommitDecision` values.

use std::path::PathBuf;
use std::time::Duration;

/// Errors produced by the chunk store and the index writer.
#[derive(Debug, thiserror::Error)]
pub enum EvlogError {
    /// Underlying file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A numeric argument or lookup key was outside its valid range.
    #[error("{what} out of range: {value}")]
    OutOfRange { what: String, value: String },

    /// An argument violated a documented precondition.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration rejected at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A chunk was expected to be sealed but still accepts appends.
    #[error("chunk is not completed: {}", .path.display())]
    ChunkNotCompleted { path: PathBuf },

    /// The chunk range does not continue the current chunk sequence.
    #[error(
        "chunk #{start}-{end} does not line up with the {chunks_count} registered chunks"
    )]
    ChunkRangeMismatch {
        start: usize,
        end: usize,
        chunks_count: usize,
    },

    /// A reader or writer tried to use a chunk after it was disposed.
    #[error("chunk is disposed: {}", .path.display())]
    ChunkDisposed { path: PathBuf },

    /// A sealed chunk is read-only.
    #[error("chunk is read-only: {}", .path.display())]
    ChunkReadOnly { path: PathBuf },

    /// Readers did not release a chunk being switched within the allowed wait.
    #[error(
        "chunk #{start}-{end} ({}) is still used by readers after {waited:?}",
        .path.display()
    )]
    ChunkSwitchTimeout {
        start: usize,
        end: usize,
        path: PathBuf,
        waited: Duration,
    },

    /// An internal consistency invariant was broken.
    #[error("invariant violation: {detail}")]
    InvariantViolation { detail: String },

    /// On-disk or in-log data is malformed.
    #[error("database corrupt: {detail}")]
    DatabaseCorrupt { detail: String },

    /// Stream metadata could not be parsed or re-serialized.
    #[error("metadata of stream '{stream}' is corrupt: {detail}")]
    MetadataCorrupt { stream: String, detail: String },

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EvlogError {
    /// Create an internal error from a displayable value.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal(detail.into())
    }

    /// Create a corruption error.
    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::DatabaseCorrupt {
            detail: detail.into(),
        }
    }

    /// Create an invariant-violation error.
    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::InvariantViolation {
            detail: detail.into(),
        }
    }

    /// Create an out-of-range error.
    pub fn out_of_range(what: impl Into<String>, value: impl ToString) -> Self {
        Self::OutOfRange {
            what: what.into(),
            value: value.to_string(),
        }
    }

    /// Whether this error signals an inconsistent log or cache.
    ///
    /// Fatal errors must halt the surrounding operation; they are never
    /// mapped to a commit decision.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvariantViolation { .. }
                | Self::DatabaseCorrupt { .. }
                | Self::MetadataCorrupt { .. }
        )
    }

    /// Whether retrying the whole operation later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ChunkSwitchTimeout { .. })
    }
}

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, EvlogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(EvlogError::invariant("x").is_fatal());
        assert!(EvlogError::corrupt("x").is_fatal());
        assert!(
            EvlogError::MetadataCorrupt {
                stream: "s".to_owned(),
                detail: "bad json".to_owned(),
            }
            .is_fatal()
        );
        assert!(!EvlogError::out_of_range("chunk number", 7).is_fatal());
        assert!(!EvlogError::InvalidArgument("x".to_owned()).is_fatal());
    }

    #[test]
    fn transient_classification() {
        let timeout = EvlogError::ChunkSwitchTimeout {
            start: 0,
            end: 2,
            path: PathBuf::from("chunk-000000.000001"),
            waited: Duration::from_millis(5),
        };
        assert!(timeout.is_transient());
        assert!(!timeout.is_fatal());

        let io = EvlogError::from(std::io::Error::other("disk gone"));
        assert!(io.is_transient());
    }

    #[test]
    fn display_includes_context() {
        let err = EvlogError::ChunkRangeMismatch {
            start: 3,
            end: 4,
            chunks_count: 2,
        };
        let rendered = err.to_string();
        assert!(rendered.contains("#3-4"), "{rendered}");
        assert!(rendered.contains('2'), "{rendered}");

        let err = EvlogError::out_of_range("log position", 1_024);
        assert_eq!(err.to_string(), "log position out of range: 1024");
    }
}
