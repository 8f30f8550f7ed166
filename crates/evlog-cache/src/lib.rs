//! Caches used by the index writer to answer commit checks before the
//! durable index has caught up with the log.
//!
//! - [`StickyLruCache`]: LRU eviction plus a per-entry pin count
//!   ("stickiness"). Pinned entries are never evicted.
//! - [`BoundedCache`]: insertion-ordered cache bounded by entry count and by
//!   a caller-supplied byte estimate.

pub mod bounded;
pub mod sticky;

pub use bounded::BoundedCache;
pub use sticky::StickyLruCache;
