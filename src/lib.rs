//! # Ouroboros Semantic Cache (ouroboros-semcache)
//!
//! A multi-tier semantic cache for LLM responses.
//!
//! ## Features
//!
//! - In-process L1 tier with LRU, LFU or TTL eviction
//! - Similarity-search L2 tier behind the [`backend::VectorStore`] trait,
//!   with an in-memory implementation included
//! - Per-user and per-context partitioning
//! - Stale-while-revalidate with single-flight background refresh
//! - Tag-based bulk invalidation
//! - Retries with exponential backoff, failing fast on non-transient errors
//! - Metrics snapshot and text exposition
//!
//! ## Quick Start
//!
//! ```no_run
//! use ouroboros_semcache::backend::Embedder;
//! use ouroboros_semcache::{CacheConfig, CacheQuery, SemanticCache, StoreRequest};
//! use std::sync::Arc;
//!
//! struct MyEmbedder;
//!
//! #[async_trait::async_trait]
//! impl Embedder for MyEmbedder {
//!     async fn embed(&self, text: &str) -> ouroboros_semcache::Result<Vec<f32>> {
//!         // Call your embedding model here
//!         Ok(vec![text.len() as f32, 1.0])
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CacheConfig::from_env()?;
//!     ouroboros_semcache::logging::init_logging(&config.logging)?;
//!
//!     let cache = SemanticCache::in_memory(config, Arc::new(MyEmbedder))?;
//!
//!     let query = CacheQuery::new("How do I reset my password?").user("alice");
//!     let response = match cache.check(&query).await {
//!         Some(hit) => hit,
//!         None => {
//!             let generated = "Use the account settings page.".to_string();
//!             cache
//!                 .store(&StoreRequest::new(&query.prompt, &generated).user("alice"))
//!                 .await?;
//!             generated
//!         }
//!     };
//!
//!     println!("{}", response);
//!     println!("{}", cache.metrics_prometheus());
//!     Ok(())
//! }
//! ```
//!
//! ## Stale-While-Revalidate
//!
//! ```no_run
//! use ouroboros_semcache::backend::{Embedder, Refresher};
//! use ouroboros_semcache::{CacheConfig, Context, SemanticCache, StalenessConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct Regenerate;
//!
//! #[async_trait::async_trait]
//! impl Refresher for Regenerate {
//!     async fn refresh(
//!         &self,
//!         prompt: &str,
//!         _user_id: Option<&str>,
//!         _context: Option<&Context>,
//!     ) -> ouroboros_semcache::Result<String> {
//!         Ok(format!("fresh answer to {}", prompt))
//!     }
//! }
//!
//! # async fn example(embedder: Arc<dyn Embedder>) -> anyhow::Result<()> {
//! let config = CacheConfig::builder()
//!     .ttl(Some(Duration::from_secs(300)))
//!     .staleness(StalenessConfig {
//!         enable_stale_while_revalidate: true,
//!         stale_tolerance: Duration::from_secs(60),
//!         max_stale_age: None,
//!     })
//!     .build();
//!
//! let cache = SemanticCache::builder(config)
//!     .memory_store()
//!     .embedder(embedder)
//!     .refresher(Arc::new(Regenerate))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cache;
pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use cache::{
    CacheConfig, CacheConfigBuilder, CacheEntry, CacheKey, CacheQuery, CacheTier, Context,
    EvictionStrategy, Filters, Freshness, L1CacheConfig, L1Stats, LoggingConfig, Metadata,
    MetricsRecorder, MetricsSnapshot, MissReason, ObservabilityConfig, RetryConfig,
    SemanticCache, SemanticCacheBuilder, StalenessConfig, StoreRequest,
};
pub use error::{CacheError, Result};
