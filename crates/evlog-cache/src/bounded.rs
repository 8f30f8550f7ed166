//! Insertion-ordered cache bounded by entry count and estimated bytes.
//!
//! The oldest records are dropped first once either bound is exceeded. Sizes
//! come from a caller-supplied estimator evaluated once per insert.

use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;

use evlog_error::{EvlogError, Result};
use hashbrown::HashMap;

type SizeEstimator<V> = Box<dyn Fn(&V) -> usize + Send + Sync>;

struct Slot<V> {
    value: V,
    size: usize,
}

/// Cache bounded by a byte-size estimate rather than only by entry count.
pub struct BoundedCache<K: Hash + Eq + Clone, V> {
    max_count: usize,
    max_size_bytes: usize,
    estimate: SizeEstimator<V>,
    records: HashMap<K, Slot<V>>,
    order: VecDeque<K>,
    current_size: usize,
}

impl<K: Hash + Eq + Clone, V> BoundedCache<K, V> {
    /// Create a cache holding at most `max_count` records whose estimated
    /// sizes sum to at most `max_size_bytes`.
    pub fn new(
        max_count: usize,
        max_size_bytes: usize,
        estimate: impl Fn(&V) -> usize + Send + Sync + 'static,
    ) -> Result<Self> {
        if max_count == 0 {
            return Err(EvlogError::InvalidConfig(
                "bounded cache max_count must be > 0".to_owned(),
            ));
        }
        if max_size_bytes == 0 {
            return Err(EvlogError::InvalidConfig(
                "bounded cache max_size_bytes must be > 0".to_owned(),
            ));
        }
        Ok(Self {
            max_count,
            max_size_bytes,
            estimate: Box::new(estimate),
            records: HashMap::new(),
            order: VecDeque::new(),
            current_size: 0,
        })
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of the estimated sizes of the cached records.
    #[inline]
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.current_size
    }

    /// Insert a record.
    ///
    /// Returns `Ok(false)` when `key` is already cached and
    /// `error_on_duplicate` is unset; the existing record is kept unchanged.
    pub fn put_record(&mut self, key: K, value: V, error_on_duplicate: bool) -> Result<bool> {
        if self.records.contains_key(&key) {
            if error_on_duplicate {
                return Err(EvlogError::InvalidArgument(
                    "record with the same key is already cached".to_owned(),
                ));
            }
            return Ok(false);
        }

        let size = (self.estimate)(&value);
        self.current_size = self.current_size.saturating_add(size);
        self.order.push_back(key.clone());
        let _ = self.records.insert(key, Slot { value, size });
        self.trim();
        Ok(true)
    }

    pub fn try_get_record(&self, key: &K) -> Option<&V> {
        self.records.get(key).map(|slot| &slot.value)
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.records.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.order.clear();
        self.current_size = 0;
    }

    fn trim(&mut self) {
        while self.records.len() > self.max_count || self.current_size > self.max_size_bytes {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(slot) = self.records.remove(&oldest) {
                self.current_size -= slot.size;
            }
        }
    }
}

impl<K: Hash + Eq + Clone, V> fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedCache")
            .field("len", &self.records.len())
            .field("size_bytes", &self.current_size)
            .field("max_count", &self.max_count)
            .field("max_size_bytes", &self.max_size_bytes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by_len() -> impl Fn(&String) -> usize + Send + Sync + 'static {
        |value: &String| value.len()
    }

    #[test]
    fn rejects_zero_bounds() {
        assert!(BoundedCache::<u32, String>::new(0, 10, by_len()).is_err());
        assert!(BoundedCache::<u32, String>::new(10, 0, by_len()).is_err());
    }

    #[test]
    fn drops_oldest_when_bytes_exceeded() {
        let mut cache = BoundedCache::new(usize::MAX, 10, by_len()).expect("cache");
        assert!(cache.put_record(1_u32, "aaaa".to_owned(), false).expect("put"));
        assert!(cache.put_record(2_u32, "bbbb".to_owned(), false).expect("put"));
        assert!(cache.put_record(3_u32, "cccc".to_owned(), false).expect("put"));

        assert!(cache.try_get_record(&1).is_none(), "oldest record dropped");
        assert_eq!(cache.try_get_record(&3).map(String::as_str), Some("cccc"));
        assert_eq!(cache.size_bytes(), 8);
    }

    #[test]
    fn drops_oldest_when_count_exceeded() {
        let mut cache = BoundedCache::new(2, usize::MAX, by_len()).expect("cache");
        for key in 0_u32..5 {
            cache.put_record(key, key.to_string(), false).expect("put");
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&3));
        assert!(cache.contains(&4));
    }

    #[test]
    fn duplicates_are_ignored_or_rejected() {
        let mut cache = BoundedCache::new(8, 1_024, by_len()).expect("cache");
        assert!(cache.put_record(1_u32, "first".to_owned(), false).expect("put"));
        assert!(!cache.put_record(1_u32, "second".to_owned(), false).expect("dup ignored"));
        assert_eq!(cache.try_get_record(&1).map(String::as_str), Some("first"));
        assert_eq!(cache.len(), 1);

        let err = cache
            .put_record(1_u32, "third".to_owned(), true)
            .expect_err("dup rejected");
        assert!(!err.is_fatal());
    }

    #[test]
    fn oversized_record_is_not_retained() {
        let mut cache = BoundedCache::new(8, 4, by_len()).expect("cache");
        cache.put_record(1_u32, "toolarge".to_owned(), false).expect("put");
        assert!(cache.is_empty());
        assert_eq!(cache.size_bytes(), 0);
    }

    #[test]
    fn clear_resets_size() {
        let mut cache = BoundedCache::new(8, 1_024, by_len()).expect("cache");
        cache.put_record(1_u32, "abc".to_owned(), false).expect("put");
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.size_bytes(), 0);
        assert!(cache.put_record(1_u32, "abc".to_owned(), false).expect("put again"));
    }
}
