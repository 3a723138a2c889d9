//! Cache entry types for both tiers

use crate::cache::types::{Filters, Metadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Metadata key holding the RFC 3339 write timestamp
pub const META_CACHED_AT: &str = "cached_at";
/// Metadata key holding the cache format version
pub const META_CACHE_VERSION: &str = "cache_version";
/// Metadata key holding the context digest
pub const META_CONTEXT_HASH: &str = "context_hash";
/// Metadata key holding the full serialized request context
pub const META_CONTEXT: &str = "context";
/// Caller-supplied generation latency in milliseconds, reported as latency
/// saved on every hit
pub const META_LATENCY_MS: &str = "latency_ms";

/// An entry as persisted in the backing store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Original prompt text
    pub prompt: String,

    /// Cached response text
    pub response: String,

    /// Embedding of the prompt
    pub embedding: Vec<f32>,

    /// Free-form annotations plus orchestrator-managed fields
    pub metadata: Metadata,

    /// Partition the entry belongs to (the user id)
    pub partition_key: Option<String>,

    /// Tag-valued fields the store can filter on
    pub filter_tags: Filters,

    /// Creation time, immutable once written
    pub stored_at: DateTime<Utc>,

    /// Per-entry TTL override
    pub ttl: Option<Duration>,
}

impl CacheEntry {
    /// Create a new entry stamped with the current time
    pub fn new(prompt: impl Into<String>, response: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            prompt: prompt.into(),
            response: response.into(),
            embedding,
            metadata: Metadata::new(),
            partition_key: None,
            filter_tags: Filters::new(),
            stored_at: Utc::now(),
            ttl: None,
        }
    }

    /// Override the creation time (used when importing or backfilling)
    pub fn with_stored_at(mut self, stored_at: DateTime<Utc>) -> Self {
        self.stored_at = stored_at;
        self
    }

    /// Set the partition key. Also exposed as the `user_id` filter tag.
    pub fn with_partition(mut self, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        self.filter_tags.insert("user_id".to_string(), user_id.clone());
        self.partition_key = Some(user_id);
        self
    }

    /// Add a filterable tag field
    pub fn with_filter_tag(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter_tags.insert(field.into(), value.into());
        self
    }

    /// Merge metadata into the entry
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata.extend(metadata);
        self
    }

    /// Set a per-entry TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Age of the entry. Clock skew that puts `stored_at` in the future
    /// yields zero.
    pub fn age(&self) -> Duration {
        (Utc::now() - self.stored_at)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }

    /// Cache format version the entry was written under, if recorded
    pub fn cache_version(&self) -> Option<&str> {
        self.metadata.get(META_CACHE_VERSION).and_then(|v| v.as_str())
    }

    /// Check a filter field value
    pub fn has_filter_tag(&self, field: &str, value: &str) -> bool {
        self.filter_tags.get(field).map(|v| v == value).unwrap_or(false)
    }

    /// Keep only the requested metadata fields plus the orchestrator-managed ones
    pub fn project_metadata(&mut self, fields: &[String]) {
        if fields.is_empty() {
            return;
        }
        self.metadata.retain(|k, _| {
            fields.iter().any(|f| f == k)
                || matches!(
                    k.as_str(),
                    META_CACHED_AT | META_CACHE_VERSION | META_CONTEXT_HASH
                )
        });
    }
}

/// An entry held by the in-process tier
#[derive(Debug, Clone)]
pub struct L1Entry {
    /// Cached response text
    pub response: String,

    /// Copy of the backing entry's metadata
    pub metadata: Metadata,

    /// When the entry entered L1
    pub cached_at: DateTime<Utc>,

    /// Number of hits served (frequency-based eviction)
    pub access_count: u64,

    /// Monotonic insertion instant, used for age-based expiry
    pub(crate) inserted: Instant,
}

impl L1Entry {
    /// Create a new L1 entry
    pub fn new(response: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            response: response.into(),
            metadata,
            cached_at: Utc::now(),
            access_count: 0,
            inserted: Instant::now(),
        }
    }

    /// Time since insertion
    pub fn age(&self) -> Duration {
        self.inserted.elapsed()
    }

    /// Mark the entry as accessed
    pub fn mark_accessed(&mut self) {
        self.access_count += 1;
    }
}
