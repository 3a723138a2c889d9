//! In-process backing store with brute-force cosine search

use super::{ScoredEntry, SetStore, VectorQuery, VectorStore};
use crate::cache::entry::CacheEntry;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::debug;

struct StoredEntry {
    entry: CacheEntry,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// Vector and set store held in process memory.
///
/// Keys are derived from the prompt and filter fields, so writing the same
/// prompt under the same partition overwrites the previous entry. Expired
/// entries are dropped lazily on access.
pub struct MemoryStore {
    namespace: String,
    entries: RwLock<HashMap<String, StoredEntry>>,
    sets: RwLock<HashMap<String, HashSet<String>>>,
}

/// Cosine distance (`1 - cos`). Zero vectors are maximally distant.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 1.0;
    }

    let cosine_sim = dot / (mag_a * mag_b);
    1.0 - cosine_sim.clamp(-1.0, 1.0)
}

impl MemoryStore {
    /// Create an empty store whose keys are prefixed with `namespace`
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entries: RwLock::new(HashMap::new()),
            sets: RwLock::new(HashMap::new()),
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch an entry by key
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = Instant::now();
        self.entries
            .read()
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.entry.clone())
    }

    fn key_for(&self, entry: &CacheEntry) -> String {
        let mut hasher = Sha256::new();
        hasher.update(entry.prompt.as_bytes());
        for (field, value) in &entry.filter_tags {
            hasher.update([0x1f]);
            hasher.update(field.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.as_bytes());
        }
        let digest = hex::encode(hasher.finalize());
        format!("{}:{}", self.namespace, &digest[..16])
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn put(&self, entry: CacheEntry, expires_in: Option<Duration>) -> Result<String> {
        let key = self.key_for(&entry);
        // Retention beyond what `Instant` can represent means no expiry
        let expires_at = expires_in.and_then(|ttl| Instant::now().checked_add(ttl));

        self.entries
            .write()
            .insert(key.clone(), StoredEntry { entry, expires_at });

        debug!("Stored entry {} (expires in {:?})", key, expires_in);
        Ok(key)
    }

    async fn query(&self, query: &VectorQuery) -> Result<Vec<ScoredEntry>> {
        if query.vector.is_empty() {
            return Err(CacheError::Validation(
                "query vector must not be empty".to_string(),
            ));
        }

        let now = Instant::now();
        let mut entries = self.entries.write();
        entries.retain(|_, stored| !stored.is_expired(now));

        let mut results: Vec<ScoredEntry> = entries
            .iter()
            .filter(|(_, stored)| stored.entry.embedding.len() == query.vector.len())
            .filter(|(_, stored)| query.filter.matches(&stored.entry.filter_tags))
            .filter_map(|(key, stored)| {
                let distance = cosine_distance(&query.vector, &stored.entry.embedding);
                (distance <= query.distance_threshold).then(|| ScoredEntry {
                    key: key.clone(),
                    distance,
                    entry: stored.entry.clone(),
                })
            })
            .collect();
        drop(entries);

        results.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(query.limit);

        for result in &mut results {
            result.entry.project_metadata(&query.return_fields);
        }

        Ok(results)
    }

    async fn delete(&self, keys: &[String]) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let removed = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|stored| !stored.is_expired(now))
            .count();
        Ok(removed)
    }

    async fn clear(&self) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let live = entries.values().filter(|e| !e.is_expired(now)).count();
        entries.clear();
        Ok(live)
    }
}

#[async_trait]
impl SetStore for MemoryStore {
    async fn sadd(&self, set: &str, members: &[String]) -> Result<usize> {
        let mut sets = self.sets.write();
        let target = sets.entry(set.to_string()).or_default();
        Ok(members
            .iter()
            .filter(|m| target.insert((*m).clone()))
            .count())
    }

    async fn smembers(&self, set: &str) -> Result<HashSet<String>> {
        Ok(self.sets.read().get(set).cloned().unwrap_or_default())
    }

    async fn sunion(&self, sets: &[String]) -> Result<HashSet<String>> {
        let guard = self.sets.read();
        Ok(sets
            .iter()
            .filter_map(|name| guard.get(name))
            .flat_map(|members| members.iter().cloned())
            .collect())
    }

    async fn sinter(&self, sets: &[String]) -> Result<HashSet<String>> {
        let guard = self.sets.read();
        let mut iter = sets.iter();

        let Some(first) = iter.next() else {
            return Ok(HashSet::new());
        };
        let mut result = guard.get(first).cloned().unwrap_or_default();

        for name in iter {
            match guard.get(name) {
                Some(members) => result.retain(|m| members.contains(m)),
                None => return Ok(HashSet::new()),
            }
        }

        Ok(result)
    }

    async fn delete_sets(&self, sets: &[String]) -> Result<usize> {
        let mut guard = self.sets.write();
        Ok(sets.iter().filter(|name| guard.remove(*name).is_some()).count())
    }
}
