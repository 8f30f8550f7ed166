//! LRU cache whose entries can be pinned ("made sticky").
//!
//! Entries live in one of two places:
//! - `recent`: stickiness zero, ordered by recency, evictable;
//! - `pinned`: stickiness > 0, never evicted.
//!
//! An entry moves to `pinned` on its first stickiness increment and back to
//! the most-recent end of `recent` when its count returns to zero. Capacity
//! bounds the total entry count, but only `recent` entries are trimmed, so a
//! cache with capacity 0 holds exactly its pinned entries.

use std::borrow::Borrow;
use std::hash::Hash;

use evlog_error::{EvlogError, Result};
use hashbrown::HashMap;
use lru::LruCache;

#[derive(Debug)]
struct PinnedEntry<V> {
    value: V,
    stickiness: u32,
}

/// Sticky LRU cache.
#[derive(Debug)]
pub struct StickyLruCache<K: Hash + Eq, V> {
    capacity: usize,
    recent: LruCache<K, V>,
    pinned: HashMap<K, PinnedEntry<V>>,
    evictions: u64,
}

impl<K: Hash + Eq, V> StickyLruCache<K, V> {
    /// Create a cache holding at most `capacity` entries in total. Only
    /// unpinned entries are trimmed, so pinned entries alone may exceed it.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            recent: LruCache::unbounded(),
            pinned: HashMap::new(),
            evictions: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.recent.len() + self.pinned.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of pinned entries.
    #[inline]
    #[must_use]
    pub fn pinned_len(&self) -> usize {
        self.pinned.len()
    }

    /// Number of entries dropped by LRU trimming since creation.
    #[inline]
    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Look up `key`, marking it most recently used.
    pub fn try_get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Some(entry) = self.pinned.get(key) {
            return Some(&entry.value);
        }
        self.recent.get(key)
    }

    /// Look up `key` without touching recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Some(entry) = self.pinned.get(key) {
            return Some(&entry.value);
        }
        self.recent.peek(key)
    }

    /// Current stickiness of `key`, `None` when absent.
    pub fn stickiness<Q>(&self, key: &Q) -> Option<u32>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Some(entry) = self.pinned.get(key) {
            return Some(entry.stickiness);
        }
        self.recent.contains(key).then_some(0)
    }

    /// Insert or overwrite `key`, adding `stickiness` to its pin count.
    pub fn put(&mut self, key: K, value: V, stickiness: u32) {
        if let Some(entry) = self.pinned.get_mut(&key) {
            entry.value = value;
            entry.stickiness = entry.stickiness.saturating_add(stickiness);
            return;
        }

        if stickiness == 0 {
            // `put` on an existing key refreshes it to most recent.
            let _ = self.recent.put(key, value);
            self.trim();
            return;
        }

        let _ = self.recent.pop(&key);
        let _ = self.pinned.insert(key, PinnedEntry { value, stickiness });
        self.trim();
    }

    /// Release one pin on `key`.
    ///
    /// Fails with an invariant violation when the entry is missing or not
    /// pinned: every unstick must pair with an earlier sticky `put`.
    pub fn unstick<Q>(&mut self, key: &Q) -> Result<()>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(entry) = self.pinned.get_mut(key) else {
            let detail = if self.recent.contains(key) {
                "unstick of an entry with zero stickiness"
            } else {
                "unstick of a missing entry"
            };
            return Err(EvlogError::invariant(detail));
        };

        entry.stickiness -= 1;
        if entry.stickiness == 0 {
            if let Some((key, entry)) = self.pinned.remove_entry(key) {
                let _ = self.recent.put(key, entry.value);
                self.trim();
            }
        }
        Ok(())
    }

    /// Drop every entry, pinned or not.
    pub fn clear(&mut self) {
        self.recent.clear();
        self.pinned.clear();
    }

    fn trim(&mut self) {
        while self.len() > self.capacity {
            if self.recent.pop_lru().is_none() {
                break;
            }
            self.evictions += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn evicts_least_recent_unpinned() {
        let mut cache = StickyLruCache::new(2);
        cache.put("a", 1, 0);
        cache.put("b", 2, 0);
        assert_eq!(cache.try_get("a"), Some(&1));
        cache.put("c", 3, 0);

        assert_eq!(cache.peek("b"), None, "b was least recently used");
        assert_eq!(cache.peek("a"), Some(&1));
        assert_eq!(cache.peek("c"), Some(&3));
        assert_eq!(cache.evictions(), 1);
    }

    #[test]
    fn pinned_entries_survive_pressure() {
        let mut cache = StickyLruCache::new(1);
        cache.put("pinned", 10, 1);
        cache.put("x", 1, 0);
        cache.put("y", 2, 0);

        assert_eq!(cache.peek("pinned"), Some(&10));
        assert_eq!(cache.peek("x"), None);
        assert_eq!(cache.peek("y"), None, "capacity already used by the pinned entry");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn pinned_entries_may_exceed_capacity() {
        let mut cache = StickyLruCache::new(1);
        cache.put("a", 1, 1);
        cache.put("b", 2, 1);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.evictions(), 0);

        cache.unstick("a").expect("pinned once");
        assert_eq!(cache.peek("a"), None, "over capacity once unpinned");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_capacity_keeps_only_pinned() {
        let mut cache = StickyLruCache::new(0);
        cache.put("flushed", b"{}".to_vec(), 0);
        assert!(cache.is_empty());

        cache.put("pending", b"{}".to_vec(), 1);
        assert_eq!(cache.len(), 1);
        cache.unstick("pending").expect("pinned once");
        assert!(cache.is_empty(), "released entry is trimmed immediately");
    }

    #[test]
    fn stickiness_accumulates_and_overwrites_value() {
        let mut cache = StickyLruCache::new(10);
        cache.put("s1".to_owned(), 5_i64, 1);
        cache.put("s1".to_owned(), 6_i64, 1);
        assert_eq!(cache.stickiness("s1"), Some(2));
        assert_eq!(cache.try_get("s1"), Some(&6));

        cache.unstick("s1").expect("first release");
        assert_eq!(cache.stickiness("s1"), Some(1));
        cache.unstick("s1").expect("second release");
        assert_eq!(cache.stickiness("s1"), Some(0));
        assert_eq!(cache.try_get("s1"), Some(&6), "value kept after last release");
    }

    #[test]
    fn sticky_put_promotes_unpinned_entry() {
        let mut cache = StickyLruCache::new(10);
        cache.put(7_i64, "t", 0);
        cache.put(7_i64, "t2", 1);
        assert_eq!(cache.stickiness(&7), Some(1));
        assert_eq!(cache.pinned_len(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn unstick_missing_or_unpinned_is_invariant_violation() {
        let mut cache: StickyLruCache<String, i64> = StickyLruCache::new(4);
        let err = cache.unstick("nope").expect_err("missing entry");
        assert!(err.is_fatal(), "{err}");

        cache.put("s".to_owned(), 1, 0);
        let err = cache.unstick("s").expect_err("zero stickiness");
        assert!(err.is_fatal(), "{err}");
        assert!(err.to_string().contains("zero stickiness"), "{err}");
    }

    #[test]
    fn clear_drops_pinned_entries() {
        let mut cache = StickyLruCache::new(4);
        cache.put(1_u8, 1_u8, 3);
        cache.put(2_u8, 2_u8, 0);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stickiness(&1), None);
    }

    proptest! {
        #[test]
        fn prop_pinned_never_evicted(
            capacity in 0usize..8,
            ops in proptest::collection::vec((0u8..32, any::<bool>()), 1..200),
        ) {
            let mut cache = StickyLruCache::new(capacity);
            let mut pinned = std::collections::HashSet::new();
            for (key, pin) in ops {
                cache.put(key, u32::from(key), u32::from(pin));
                if pin {
                    pinned.insert(key);
                }
                prop_assert!(cache.len() <= capacity.max(pinned.len()));
            }
            for key in pinned {
                prop_assert_eq!(cache.peek(&key), Some(&u32::from(key)));
            }
        }
    }
}
