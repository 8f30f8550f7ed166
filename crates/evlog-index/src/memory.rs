//! In-memory log and index.
//!
//! Both implement the same seams as the on-disk components, so the writer can
//! be driven without chunk files: embedders use them for tooling and replay
//! dry-runs, tests use them everywhere.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use evlog_error::Result;
use evlog_types::{
    EventNumber, LogRecord, PrepareLogRecord, StreamMetadata, metastream_of,
};
use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::durable::IndexReader;
use crate::reader::{ReaderPool, SeqReadResult, TransactionFileReader};

type RecordMap = BTreeMap<i64, LogRecord>;

/// Log held in a position-ordered map. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLog {
    records: Arc<RwLock<RecordMap>>,
}

impl InMemoryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record` at its own log position, replacing whatever was there.
    pub fn append(&self, record: impl Into<LogRecord>) {
        let record = record.into();
        self.records.write().insert(record.log_position(), record);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// A reader positioned at the start of the log.
    #[must_use]
    pub fn reader(&self) -> InMemoryLogReader {
        InMemoryLogReader {
            records: Arc::clone(&self.records),
            cursor: 0,
        }
    }

    /// A pool opening readers over this log.
    #[must_use]
    pub fn reader_pool(&self, max_idle: usize) -> ReaderPool {
        let log = self.clone();
        ReaderPool::new(max_idle, move || {
            Ok(Box::new(log.reader()) as Box<dyn TransactionFileReader>)
        })
    }
}

/// Cursor over an [`InMemoryLog`].
#[derive(Debug)]
pub struct InMemoryLogReader {
    records: Arc<RwLock<RecordMap>>,
    cursor: i64,
}

/// Position just past the record at `position`: the next record's start, or
/// one byte further at the end of the log.
fn post_position(records: &RecordMap, position: i64) -> i64 {
    records
        .range((Bound::Excluded(position), Bound::Unbounded))
        .next()
        .map_or(position + 1, |(next, _)| *next)
}

impl TransactionFileReader for InMemoryLogReader {
    fn reposition(&mut self, position: i64) -> Result<()> {
        self.cursor = position;
        Ok(())
    }

    fn try_read_next(&mut self) -> Result<Option<SeqReadResult>> {
        let records = self.records.read();
        let Some((&position, record)) = records.range(self.cursor..).next() else {
            return Ok(None);
        };
        let post = post_position(&records, position);
        self.cursor = post;
        Ok(Some(SeqReadResult {
            record: record.clone(),
            record_pre_position: position,
            record_post_position: post,
        }))
    }

    fn try_read_prev(&mut self) -> Result<Option<SeqReadResult>> {
        let records = self.records.read();
        let Some((&position, record)) = records.range(..self.cursor).next_back() else {
            return Ok(None);
        };
        self.cursor = position;
        Ok(Some(SeqReadResult {
            record: record.clone(),
            record_pre_position: position,
            record_post_position: post_position(&records, position),
        }))
    }

    fn try_read_at(&mut self, position: i64) -> Result<Option<LogRecord>> {
        Ok(self.records.read().get(&position).cloned())
    }
}

#[derive(Debug)]
struct IndexedStream {
    last_event_number: i64,
    events: BTreeMap<i64, PrepareLogRecord>,
}

/// Durable-index stand-in keyed by stream and event number.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    streams: RwLock<HashMap<String, IndexedStream>>,
}

impl InMemoryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `prepare` as event `event_number` of its stream.
    pub fn index_event(&self, prepare: PrepareLogRecord, event_number: i64) {
        let mut streams = self.streams.write();
        let stream = streams
            .entry(prepare.event_stream_id.clone())
            .or_insert_with(|| IndexedStream {
                last_event_number: EventNumber::NO_EVENTS,
                events: BTreeMap::new(),
            });
        if stream.last_event_number != EventNumber::DELETED_STREAM {
            stream.last_event_number = stream.last_event_number.max(event_number);
        }
        stream.events.insert(event_number, prepare);
    }

    /// Mark `stream_id` hard-deleted.
    pub fn delete_stream(&self, stream_id: &str) {
        let mut streams = self.streams.write();
        let stream = streams
            .entry(stream_id.to_owned())
            .or_insert_with(|| IndexedStream {
                last_event_number: EventNumber::NO_EVENTS,
                events: BTreeMap::new(),
            });
        stream.last_event_number = EventNumber::DELETED_STREAM;
    }
}

impl IndexReader for InMemoryIndex {
    fn last_event_number(&self, stream_id: &str) -> Result<i64> {
        Ok(self
            .streams
            .read()
            .get(stream_id)
            .map_or(EventNumber::NO_EVENTS, |stream| stream.last_event_number))
    }

    fn stream_metadata(&self, stream_id: &str) -> Result<StreamMetadata> {
        let metastream = metastream_of(stream_id);
        let streams = self.streams.read();
        let Some(latest) = streams
            .get(&metastream)
            .and_then(|stream| stream.events.values().next_back())
        else {
            return Ok(StreamMetadata::EMPTY);
        };
        Ok(StreamMetadata::from_json_bytes(&latest.data).unwrap_or(StreamMetadata::EMPTY))
    }

    fn read_prepare(
        &self,
        stream_id: &str,
        event_number: i64,
    ) -> Result<Option<PrepareLogRecord>> {
        Ok(self
            .streams
            .read()
            .get(stream_id)
            .and_then(|stream| stream.events.get(&event_number))
            .cloned())
    }
}
