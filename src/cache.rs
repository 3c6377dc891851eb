//! # Cache — Generic Eviction-Policy Cache Substrate
//!
//! A single LRU-with-optional-TTL cache, shared by [`crate::registry`]'s
//! index lookups and [`crate::checksum`]'s factor-signature → derived-prime
//! map. Other eviction policies (LFU, FIFO) are not offered: LRU+TTL is
//! sufficient for every property this crate's modules need, and offering
//! more would be unused surface.
//!
//! Eviction order is tracked with a `VecDeque` of keys rather than an
//! intrusive linked list — capacities here are small (thousands of
//! entries at most) so the O(n) re-positioning on touch is not worth the
//! complexity of a proper LRU linked-hashmap.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Hit/miss/eviction counters for a single cache instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// A bounded LRU cache with an optional time-to-live on entries.
pub struct LruCache<K, V> {
    capacity: usize,
    ttl: Option<Duration>,
    map: HashMap<K, Entry<V>>,
    order: VecDeque<K>,
    stats: CacheStats,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        LruCache {
            capacity: capacity.max(1),
            ttl: None,
            map: HashMap::new(),
            order: VecDeque::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn with_ttl(capacity: usize, ttl: Duration) -> Self {
        let mut cache = Self::new(capacity);
        cache.ttl = Some(ttl);
        cache
    }

    /// Returns the cached value for `key`, or `None` on a miss or expiry.
    /// A hit moves `key` to most-recently-used position.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let expired = match self.map.get(key) {
            Some(entry) => self
                .ttl
                .is_some_and(|ttl| entry.inserted_at.elapsed() > ttl),
            None => {
                self.stats.misses += 1;
                return None;
            }
        };

        if expired {
            self.map.remove(key);
            self.order.retain(|k| k != key);
            self.stats.misses += 1;
            return None;
        }

        self.touch(key);
        self.stats.hits += 1;
        self.map.get(key).map(|e| e.value.clone())
    }

    /// Inserts or updates `key`, evicting the least-recently-used entry
    /// if the cache is at capacity.
    pub fn put(&mut self, key: K, value: V) {
        if self.map.contains_key(&key) {
            self.touch(&key);
        } else {
            if self.map.len() >= self.capacity {
                if let Some(lru_key) = self.order.pop_front() {
                    self.map.remove(&lru_key);
                    self.stats.evictions += 1;
                }
            }
            self.order.push_back(key.clone());
        }
        self.map.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn miss_then_hit() {
        let mut cache: LruCache<String, u32> = LruCache::new(4);
        assert_eq!(cache.get(&"a".to_string()), None);
        cache.put("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache: LruCache<i32, i32> = LruCache::new(2);
        cache.put(1, 10);
        cache.put(2, 20);
        cache.get(&1); // 1 becomes MRU, 2 becomes LRU
        cache.put(3, 30); // evicts 2
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some(10));
        assert_eq!(cache.get(&3), Some(30));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn ttl_expiry() {
        let mut cache: LruCache<&str, i32> = LruCache::with_ttl(4, Duration::from_millis(10));
        cache.put("k", 1);
        assert_eq!(cache.get(&"k"), Some(1));
        sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&"k"), None);
    }

    #[test]
    fn clear_empties_cache() {
        let mut cache: LruCache<i32, i32> = LruCache::new(4);
        cache.put(1, 1);
        cache.put(2, 2);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn cache_stats_round_trip_through_json() {
        let stats = CacheStats {
            hits: 4,
            misses: 2,
            evictions: 1,
        };
        let json = serde_json::to_string(&stats).unwrap();
        let back: CacheStats = serde_json::from_str(&json).unwrap();
        assert_eq!(stats, back);
    }
}
