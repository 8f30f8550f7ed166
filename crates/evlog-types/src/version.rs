//! Event-number and expected-version sentinels.
//!
//! Event numbers are plain `i64` values so that the optimistic-concurrency
//! comparisons (`expected < current`, `expected > current`) stay numeric: the
//! "no stream" sentinel sorts before event 0 and the "deleted" sentinel sorts
//! after every real event.

/// Well-known event numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventNumber;

impl EventNumber {
    /// Last event number of a hard-deleted (tombstoned) stream.
    pub const DELETED_STREAM: i64 = i64::MAX;
    /// Last event number of a stream with no events.
    pub const NO_EVENTS: i64 = -1;
}

/// Well-known expected versions a writer may submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedVersion;

impl ExpectedVersion {
    /// Skip the concurrency check; only idempotency is verified.
    pub const ANY: i64 = -2;
    /// The stream must not exist yet.
    pub const NO_STREAM: i64 = -1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_ordering() {
        assert!(ExpectedVersion::ANY < ExpectedVersion::NO_STREAM);
        assert_eq!(ExpectedVersion::NO_STREAM, EventNumber::NO_EVENTS);
        assert!(EventNumber::DELETED_STREAM > 1_000_000_000);
    }
}
