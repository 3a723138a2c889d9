//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use ouroboros_semcache::backend::{
    Embedder, MemoryStore, RankedDocument, Refresher, Reranker, ScoredEntry, VectorQuery,
    VectorStore,
};
use ouroboros_semcache::{CacheConfig, CacheEntry, CacheError, Context, Result, RetryConfig};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

pub const DIMS: usize = 16;

/// Embedder with explicit vectors for known prompts. Unknown prompts get a
/// fresh one-hot vector, so they are orthogonal to everything else.
pub struct StaticEmbedder {
    vectors: Mutex<HashMap<String, Vec<f32>>>,
    failing: HashSet<String>,
    next_axis: AtomicUsize,
    pub calls: AtomicUsize,
}

impl StaticEmbedder {
    pub fn new() -> Self {
        Self {
            vectors: Mutex::new(HashMap::new()),
            failing: HashSet::new(),
            next_axis: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(self, prompt: &str, vector: Vec<f32>) -> Self {
        self.vectors.lock().insert(prompt.to_string(), vector);
        self
    }

    /// Make every embedding of `prompt` fail
    pub fn failing_on(mut self, prompt: &str) -> Self {
        self.failing.insert(prompt.to_string());
        self
    }
}

#[async_trait]
impl Embedder for StaticEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(text) {
            return Err(CacheError::EmbeddingError(format!("cannot embed '{}'", text)));
        }
        let mut vectors = self.vectors.lock();
        if let Some(v) = vectors.get(text) {
            return Ok(v.clone());
        }
        let axis = self.next_axis.fetch_add(1, Ordering::SeqCst) % DIMS;
        let mut v = vec![0.0; DIMS];
        v[axis] = 1.0;
        vectors.insert(text.to_string(), v.clone());
        Ok(v)
    }
}

/// Embedder that always fails with a retryable error
pub struct BrokenEmbedder;

#[async_trait]
impl Embedder for BrokenEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(CacheError::EmbeddingError("model unavailable".to_string()))
    }
}

/// Wraps a [`MemoryStore`], failing the first `failures` writes and queries
pub struct FlakyStore {
    pub inner: MemoryStore,
    remaining_failures: AtomicUsize,
    pub attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: MemoryStore::new("flaky"),
            remaining_failures: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        }
    }

    fn maybe_fail(&self) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(CacheError::ConnectionError("connection reset".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl VectorStore for FlakyStore {
    async fn put(&self, entry: CacheEntry, expires_in: Option<Duration>) -> Result<String> {
        self.maybe_fail()?;
        self.inner.put(entry, expires_in).await
    }

    async fn query(&self, query: &VectorQuery) -> Result<Vec<ScoredEntry>> {
        self.maybe_fail()?;
        self.inner.query(query).await
    }

    async fn delete(&self, keys: &[String]) -> Result<usize> {
        self.inner.delete(keys).await
    }

    async fn clear(&self) -> Result<usize> {
        self.inner.clear().await
    }
}

/// Wraps a [`MemoryStore`]; the first `delete` pauses after signalling
/// `entered` until `release` is notified
pub struct GatedStore {
    pub inner: MemoryStore,
    pub entered: Notify,
    pub release: Notify,
    armed: AtomicBool,
}

impl GatedStore {
    pub fn new(namespace: &str) -> Self {
        Self {
            inner: MemoryStore::new(namespace),
            entered: Notify::new(),
            release: Notify::new(),
            armed: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl VectorStore for GatedStore {
    async fn put(&self, entry: CacheEntry, expires_in: Option<Duration>) -> Result<String> {
        self.inner.put(entry, expires_in).await
    }

    async fn query(&self, query: &VectorQuery) -> Result<Vec<ScoredEntry>> {
        self.inner.query(query).await
    }

    async fn delete(&self, keys: &[String]) -> Result<usize> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.delete(keys).await
    }

    async fn clear(&self) -> Result<usize> {
        self.inner.clear().await
    }
}

/// Refresher that counts calls and takes a while to answer
pub struct CountingRefresher {
    pub calls: AtomicUsize,
    pub delay: Duration,
    pub response: String,
}

impl CountingRefresher {
    pub fn new(response: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(100),
            response: response.to_string(),
        }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Refresher for CountingRefresher {
    async fn refresh(
        &self,
        _prompt: &str,
        _user_id: Option<&str>,
        _context: Option<&Context>,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.response.clone())
    }
}

/// Refresher whose callback always fails
pub struct FailingRefresher;

#[async_trait]
impl Refresher for FailingRefresher {
    async fn refresh(
        &self,
        _prompt: &str,
        _user_id: Option<&str>,
        _context: Option<&Context>,
    ) -> Result<String> {
        Err(CacheError::Other("generation failed".to_string()))
    }
}

/// Reranker that ranks documents in reverse input order
pub struct ReverseReranker;

#[async_trait]
impl Reranker for ReverseReranker {
    async fn rank(&self, _query: &str, documents: &[String]) -> Result<Vec<RankedDocument>> {
        Ok((0..documents.len())
            .rev()
            .enumerate()
            .map(|(position, index)| RankedDocument {
                index,
                score: 1.0 - position as f32 * 0.1,
            })
            .collect())
    }
}

/// Reranker that always fails
pub struct BrokenReranker;

#[async_trait]
impl Reranker for BrokenReranker {
    async fn rank(&self, _query: &str, _documents: &[String]) -> Result<Vec<RankedDocument>> {
        Err(CacheError::RerankerError("reranker offline".to_string()))
    }
}

/// Config with fast retries and no retention jitter
pub fn test_config() -> CacheConfig {
    CacheConfig::builder()
        .name("test")
        .ttl_jitter(0.0)
        .retry(RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        })
        .build()
}

pub fn context(pairs: &[(&str, &str)]) -> Context {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect()
}
