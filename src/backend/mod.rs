//! Collaborator interfaces
//!
//! The cache talks to its similarity store, tag sets, embedding model,
//! reranker and refresh callback only through these traits.
//! [`MemoryStore`] is an in-process implementation of both store traits.

mod memory;

pub use memory::MemoryStore;

use crate::cache::entry::CacheEntry;
use crate::cache::types::{Context, Filters};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;

/// Conjunction of `field == value` clauses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    clauses: Vec<(String, String)>,
}

impl TagFilter {
    /// Empty filter, matches everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality clause
    pub fn and(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    pub fn clauses(&self) -> &[(String, String)] {
        &self.clauses
    }

    /// Evaluate the filter against an entry's tag fields
    pub fn matches(&self, tags: &Filters) -> bool {
        self.clauses
            .iter()
            .all(|(field, value)| tags.get(field) == Some(value))
    }
}

/// Bounded-distance nearest-neighbour query
#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub vector: Vec<f32>,

    /// Inclusive upper bound on distance
    pub distance_threshold: f32,

    pub filter: TagFilter,

    /// Maximum number of results
    pub limit: usize,

    /// Metadata fields to return. Empty returns all.
    pub return_fields: Vec<String>,
}

/// One query result
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    /// Store-assigned key
    pub key: String,

    /// Distance to the query vector, lower is closer
    pub distance: f32,

    pub entry: CacheEntry,
}

/// Similarity-search-capable key/value store
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Write an entry, returning its store key. `expires_in` bounds how long
    /// the store keeps it.
    async fn put(&self, entry: CacheEntry, expires_in: Option<Duration>) -> Result<String>;

    /// Results ordered by ascending distance, all within the threshold
    async fn query(&self, query: &VectorQuery) -> Result<Vec<ScoredEntry>>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> Result<usize>;

    /// Delete every entry, returning how many existed
    async fn clear(&self) -> Result<usize>;
}

/// Set-valued storage used by the tag index
#[async_trait]
pub trait SetStore: Send + Sync {
    /// Add members, returning how many were new
    async fn sadd(&self, set: &str, members: &[String]) -> Result<usize>;

    async fn smembers(&self, set: &str) -> Result<HashSet<String>>;

    async fn sunion(&self, sets: &[String]) -> Result<HashSet<String>>;

    async fn sinter(&self, sets: &[String]) -> Result<HashSet<String>>;

    /// Delete whole sets, returning how many existed
    async fn delete_sets(&self, sets: &[String]) -> Result<usize>;
}

/// Text embedding provider
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Reranker output: position in the input documents plus relevance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedDocument {
    pub index: usize,
    pub score: f32,
}

/// Cross-encoder style reranker
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Documents reordered by relevance to `query`, most relevant first
    async fn rank(&self, query: &str, documents: &[String]) -> Result<Vec<RankedDocument>>;
}

/// Regenerates a response for a stale entry
#[async_trait]
pub trait Refresher: Send + Sync {
    async fn refresh(
        &self,
        prompt: &str,
        user_id: Option<&str>,
        context: Option<&Context>,
    ) -> Result<String>;
}
