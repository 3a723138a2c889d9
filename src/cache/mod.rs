//! # Multi-Tier Semantic Cache
//!
//! Caches expensive, non-deterministic generations (LLM completions) keyed
//! by the semantic similarity of their prompts.
//!
//! ## Features
//!
//! - **Two tiers**: a bounded in-process cache (LRU, LFU or TTL eviction) in
//!   front of a similarity-search backing store
//! - **Context isolation**: entries partitioned by user and by a digest of
//!   selected request-context fields
//! - **Stale-while-revalidate**: expired-but-recent entries served while a
//!   single background refresh runs per key
//! - **Tag invalidation**: bulk removal of entries by tag
//! - **Retries**: bounded exponential backoff around store and embedding calls
//! - **Metrics**: per-tier counters and latency windows, JSON snapshot and
//!   text exposition
//!
//! ## Example
//!
//! ```rust
//! use ouroboros_semcache::backend::Embedder;
//! use ouroboros_semcache::cache::{CacheConfig, CacheQuery, SemanticCache, StoreRequest};
//! use std::sync::Arc;
//!
//! struct CharEmbedder;
//!
//! #[async_trait::async_trait]
//! impl Embedder for CharEmbedder {
//!     async fn embed(&self, text: &str) -> ouroboros_semcache::Result<Vec<f32>> {
//!         Ok(vec![text.len() as f32, text.chars().filter(|c| c.is_uppercase()).count() as f32])
//!     }
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cache = SemanticCache::in_memory(CacheConfig::default(), Arc::new(CharEmbedder))?;
//!
//! cache
//!     .store(&StoreRequest::new("What is Rust?", "A systems language").tag("faq"))
//!     .await?;
//!
//! if let Some(response) = cache.check(&CacheQuery::new("What is Rust?")).await {
//!     println!("Cache hit: {}", response);
//! }
//!
//! cache.invalidate_by_tag("faq").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod entry;
pub mod l1;
pub mod manager;
pub mod metrics;
pub mod request;
pub mod retry;
pub mod staleness;
pub mod tags;
pub mod types;

pub use config::{
    CacheConfig, CacheConfigBuilder, L1CacheConfig, LoggingConfig, ObservabilityConfig,
    RetryConfig, StalenessConfig,
};
pub use entry::{CacheEntry, L1Entry};
pub use l1::{EvictionStrategy, L1Cache};
pub use manager::{SemanticCache, SemanticCacheBuilder};
pub use metrics::{MetricsRecorder, MetricsSnapshot, StalenessSnapshot, TierSnapshot};
pub use request::{CacheQuery, StoreRequest};
pub use retry::RetryPolicy;
pub use staleness::{Freshness, RefreshRegistry, StalenessPolicy};
pub use tags::TagIndex;
pub use types::{CacheKey, CacheTier, Context, Filters, L1Stats, Metadata, MissReason};
