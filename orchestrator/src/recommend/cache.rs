//! Bounded TTL cache with an injected clock.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, Duration, Utc};

use crate::clock::SharedClock;

struct Entry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
}

/// Map whose entries expire `ttl` after insertion. When full, the oldest
/// entry is evicted to make room.
pub struct TtlCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    ttl: Duration,
    capacity: usize,
    clock: SharedClock,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, capacity: usize, clock: SharedClock) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            capacity: capacity.max(1),
            clock,
        }
    }

    /// Live value for `key`; an expired entry is removed.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            Some(entry) if now - entry.inserted_at < self.ttl => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn insert(&mut self, key: K, value: V) {
        let now = self.clock.now();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.purge_expired();
            if self.entries.len() >= self.capacity {
                self.evict_oldest();
            }
        }
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn purge_expired(&mut self) {
        let now = self.clock.now();
        let ttl = self.ttl;
        self.entries.retain(|_, e| now - e.inserted_at < ttl);
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.inserted_at)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    #[test]
    fn test_entries_expire() {
        let clock = Arc::new(ManualClock::starting_now());
        let mut cache = TtlCache::new(Duration::minutes(5), 10, clock.clone());
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));

        clock.advance(Duration::minutes(4));
        assert_eq!(cache.get(&"a"), Some(1));

        clock.advance(Duration::minutes(1));
        assert_eq!(cache.get(&"a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let clock = Arc::new(ManualClock::starting_now());
        let mut cache = TtlCache::new(Duration::minutes(5), 2, clock.clone());
        cache.insert("a", 1);
        clock.advance(Duration::seconds(1));
        cache.insert("b", 2);
        clock.advance(Duration::seconds(1));
        cache.insert("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let clock = Arc::new(ManualClock::starting_now());
        let mut cache = TtlCache::new(Duration::minutes(5), 2, clock);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), Some(10));
        assert_eq!(cache.get(&"b"), Some(2));
    }
}
