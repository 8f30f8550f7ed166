//! Read interface of the durable stream index.

use evlog_error::Result;
use evlog_types::{PrepareLogRecord, StreamMetadata};

/// Read side of the persistent index the writer falls back to when its own
/// caches miss.
pub trait IndexReader: Send + Sync {
    /// Last event number of `stream_id`: [`EventNumber::NO_EVENTS`] for an
    /// unknown stream, [`EventNumber::DELETED_STREAM`] for a hard-deleted one.
    ///
    /// [`EventNumber::NO_EVENTS`]: evlog_types::EventNumber::NO_EVENTS
    /// [`EventNumber::DELETED_STREAM`]: evlog_types::EventNumber::DELETED_STREAM
    fn last_event_number(&self, stream_id: &str) -> Result<i64>;

    /// Parsed metadata of `stream_id`, [`StreamMetadata::EMPTY`] when none
    /// has been written.
    fn stream_metadata(&self, stream_id: &str) -> Result<StreamMetadata>;

    /// The prepare indexed as `event_number` of `stream_id`.
    fn read_prepare(&self, stream_id: &str, event_number: i64)
    -> Result<Option<PrepareLogRecord>>;
}
