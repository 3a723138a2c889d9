//! Bounded in-process cache tier
//!
//! Keyed by the composite lookup key. All operations take a short
//! `parking_lot` lock and never suspend, so the tier can be probed from
//! async code without yielding.

use crate::cache::{
    entry::L1Entry,
    types::{CacheKey, L1Stats, Metadata},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// How the in-process tier picks a victim when full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionStrategy {
    /// Least recently used
    #[default]
    Lru,

    /// Least frequently used, ties broken by least recent use
    Lfu,

    /// Age-based: entries older than the tier TTL are absent
    Ttl,
}

impl fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionStrategy::Lru => write!(f, "lru"),
            EvictionStrategy::Lfu => write!(f, "lfu"),
            EvictionStrategy::Ttl => write!(f, "ttl"),
        }
    }
}

impl FromStr for EvictionStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionStrategy::Lru),
            "lfu" => Ok(EvictionStrategy::Lfu),
            "ttl" => Ok(EvictionStrategy::Ttl),
            other => Err(format!("unknown eviction strategy: {}", other)),
        }
    }
}

/// Bounded map from composite key to cached response
pub struct L1Cache {
    strategy: EvictionStrategy,
    max_size: usize,
    ttl: Duration,
    state: Mutex<L1State>,
}

struct L1State {
    /// Main storage: key -> entry
    entries: HashMap<CacheKey, L1Entry>,

    /// Front is the next victim. Recency order for LRU/LFU, insertion order
    /// for TTL.
    queue: VecDeque<CacheKey>,

    stats: L1Stats,
}

impl L1State {
    fn remove(&mut self, key: &str) -> Option<L1Entry> {
        let entry = self.entries.remove(key)?;
        self.queue.retain(|k| k != key);
        Some(entry)
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.queue.iter().position(|k| k == key) {
            if let Some(k) = self.queue.remove(pos) {
                self.queue.push_back(k);
            }
        }
    }
}

impl L1Cache {
    /// Create an empty tier
    pub fn new(max_size: usize, ttl: Duration, strategy: EvictionStrategy) -> Self {
        info!(
            "Initializing L1 cache (max_size: {}, strategy: {}, ttl: {:?})",
            max_size, strategy, ttl
        );

        Self {
            strategy,
            max_size: max_size.max(1),
            ttl,
            state: Mutex::new(L1State {
                entries: HashMap::with_capacity(max_size.min(4096)),
                queue: VecDeque::with_capacity(max_size.min(4096)),
                stats: L1Stats::default(),
            }),
        }
    }

    /// Eviction strategy in effect
    pub fn strategy(&self) -> EvictionStrategy {
        self.strategy
    }

    /// Look up a key. Missing or expired keys return `None`.
    pub fn get(&self, key: &str) -> Option<L1Entry> {
        let mut state = self.state.lock();

        let Some(expired) = state.entries.get(key).map(|e| self.is_expired(e)) else {
            state.stats.misses += 1;
            return None;
        };

        if expired {
            debug!("L1 entry expired: {}", key);
            state.remove(key);
            state.stats.expirations += 1;
            state.stats.misses += 1;
            return None;
        }

        let entry = match state.entries.get_mut(key) {
            Some(entry) => {
                entry.mark_accessed();
                entry.clone()
            }
            None => return None,
        };

        if self.strategy != EvictionStrategy::Ttl {
            state.touch(key);
        }
        state.stats.hits += 1;

        Some(entry)
    }

    /// Insert or replace an entry, evicting exactly one victim on overflow
    pub fn set(&self, key: impl Into<CacheKey>, response: impl Into<String>, metadata: Metadata) {
        let key = key.into();
        let mut state = self.state.lock();

        if let Some(access_count) = state.entries.get(&key).map(|e| e.access_count) {
            let mut entry = L1Entry::new(response, metadata);
            entry.access_count = access_count;
            state.entries.insert(key.clone(), entry);
            // Replacement restarts the age clock, so it moves to the back
            // under every strategy.
            state.touch(&key);
            debug!("Updated L1 entry: {}", key);
            return;
        }

        if state.entries.len() >= self.max_size {
            self.evict_one(&mut state);
        }

        state.entries.insert(key.clone(), L1Entry::new(response, metadata));
        state.queue.push_back(key);
    }

    /// Remove one key. Returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.state.lock().remove(key).is_some()
    }

    /// Drop every entry, returning how many were held
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.entries.len();
        state.entries.clear();
        state.queue.clear();
        debug!("Cleared {} L1 entries", count);
        count
    }

    /// Number of entries currently held (expired TTL entries included until
    /// they are touched or evicted)
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Check if the tier is empty
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Statistics snapshot
    pub fn stats(&self) -> L1Stats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.entries = state.entries.len();
        stats
    }

    fn is_expired(&self, entry: &L1Entry) -> bool {
        self.strategy == EvictionStrategy::Ttl && entry.age() > self.ttl
    }

    fn evict_one(&self, state: &mut L1State) {
        let victim = match self.strategy {
            EvictionStrategy::Lru | EvictionStrategy::Ttl => state.queue.front().cloned(),
            EvictionStrategy::Lfu => {
                // First minimum in queue order is the least recent among ties
                let mut best: Option<(&CacheKey, u64)> = None;
                for key in &state.queue {
                    let count = state.entries.get(key).map(|e| e.access_count).unwrap_or(0);
                    match best {
                        Some((_, min)) if count >= min => {}
                        _ => best = Some((key, count)),
                    }
                }
                best.map(|(k, _)| k.clone())
            }
        };

        let Some(victim) = victim else {
            return;
        };

        if let Some(entry) = state.remove(&victim) {
            if self.is_expired(&entry) {
                state.stats.expirations += 1;
            } else {
                state.stats.evictions += 1;
            }
            debug!("Evicted L1 entry ({}): {}", self.strategy, victim);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lru(max: usize) -> L1Cache {
        L1Cache::new(max, Duration::from_secs(60), EvictionStrategy::Lru)
    }

    #[test]
    fn test_basic_set_and_get() {
        let cache = lru(10);
        cache.set("key1", "value1", Metadata::new());

        let entry = cache.get("key1").unwrap();
        assert_eq!(entry.response, "value1");
        assert_eq!(entry.access_count, 1);

        assert!(cache.get("nonexistent").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = lru(3);
        cache.set("key1", "value1", Metadata::new());
        cache.set("key2", "value2", Metadata::new());
        cache.set("key3", "value3", Metadata::new());

        // key1 becomes most recent, key2 is now the victim
        cache.get("key1");
        cache.set("key4", "value4", Metadata::new());

        assert!(cache.get("key2").is_none());
        assert!(cache.get("key1").is_some());
        assert!(cache.get("key3").is_some());
        assert!(cache.get("key4").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_lfu_eviction() {
        let cache = L1Cache::new(3, Duration::from_secs(60), EvictionStrategy::Lfu);
        cache.set("a", "1", Metadata::new());
        cache.set("b", "2", Metadata::new());
        cache.set("c", "3", Metadata::new());

        cache.get("a");
        cache.get("a");
        cache.get("c");

        cache.set("d", "4", Metadata::new());

        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_lfu_tie_evicts_least_recent() {
        let cache = L1Cache::new(2, Duration::from_secs(60), EvictionStrategy::Lfu);
        cache.set("a", "1", Metadata::new());
        cache.set("b", "2", Metadata::new());
        cache.get("a");
        cache.get("b");

        cache.set("c", "3", Metadata::new());

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn test_ttl_expiration() {
        let cache = L1Cache::new(10, Duration::from_millis(30), EvictionStrategy::Ttl);
        cache.set("key1", "value1", Metadata::new());
        assert!(cache.get("key1").is_some());

        std::thread::sleep(Duration::from_millis(60));

        assert!(cache.get("key1").is_none());
        assert_eq!(cache.stats().expirations, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_ttl_overflow_evicts_oldest_insert() {
        let cache = L1Cache::new(2, Duration::from_secs(60), EvictionStrategy::Ttl);
        cache.set("a", "1", Metadata::new());
        cache.set("b", "2", Metadata::new());
        // Access does not protect an entry under the ttl strategy
        cache.get("a");
        cache.set("c", "3", Metadata::new());

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_one_eviction_per_overflow() {
        let cache = lru(5);
        for i in 0..20 {
            cache.set(format!("key{}", i), "v", Metadata::new());
            assert!(cache.len() <= 5);
        }
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.stats().evictions, 15);
    }

    #[test]
    fn test_replace_does_not_evict() {
        let cache = lru(2);
        cache.set("a", "1", Metadata::new());
        cache.set("b", "2", Metadata::new());
        cache.set("a", "updated", Metadata::new());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap().response, "updated");
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = lru(10);
        cache.set("a", "1", Metadata::new());
        cache.set("b", "2", Metadata::new());

        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.clear(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("LFU".parse::<EvictionStrategy>().unwrap(), EvictionStrategy::Lfu);
        assert!("fifo".parse::<EvictionStrategy>().is_err());
        assert_eq!(EvictionStrategy::Ttl.to_string(), "ttl");
    }
}
