//! The semantic cache orchestrator
//!
//! [`SemanticCache`] composes the in-process tier, the backing similarity
//! store and the tag index, and applies the staleness, version and retry
//! policies on every lookup and write.
//!
//! Reads never fail: any collaborator error degrades to a miss, counted under
//! `errors` and logged with its reason. Writes either succeed with a store
//! key or return the error.

use crate::backend::{
    Embedder, MemoryStore, Refresher, Reranker, ScoredEntry, SetStore, VectorQuery, VectorStore,
};
use crate::cache::{
    config::CacheConfig,
    context::{validate_field_name, LookupKey, CONTEXT_HASH_FIELD, USER_FIELD},
    entry::{
        CacheEntry, META_CACHED_AT, META_CACHE_VERSION, META_CONTEXT, META_CONTEXT_HASH,
        META_LATENCY_MS,
    },
    l1::L1Cache,
    metrics::{MetricsRecorder, MetricsSnapshot},
    request::{CacheQuery, StoreRequest},
    retry::RetryPolicy,
    staleness::{Freshness, RefreshRegistry, StalenessPolicy},
    tags::TagIndex,
    types::{CacheTier, Context, Filters, L1Stats, Metadata, MissReason},
};
use crate::error::{CacheError, Result};
use chrono::Utc;
use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, field::Empty, info, info_span, instrument, warn, Instrument, Span};

/// Settings adjustable after construction
#[derive(Debug, Clone, Copy)]
struct RuntimeSettings {
    distance_threshold: f32,
    ttl: Option<Duration>,
}

struct Inner {
    config: CacheConfig,
    settings: RwLock<RuntimeSettings>,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
    refresher: Option<Arc<dyn Refresher>>,
    l1: Option<L1Cache>,
    tags: Option<TagIndex>,
    staleness: StalenessPolicy,
    retry: RetryPolicy,
    metrics: Arc<MetricsRecorder>,
    refreshes: RefreshRegistry,
}

/// Outcome of the backing-store leg of a lookup
enum Resolution {
    Hit {
        response: String,
        generation_latency: Option<Duration>,
    },
    Miss(MissReason),
}

/// Multi-tier semantic cache.
///
/// Cheap to clone; clones share tiers, metrics and the refresh registry.
#[derive(Clone)]
pub struct SemanticCache {
    inner: Arc<Inner>,
}

/// Builder for [`SemanticCache`]
pub struct SemanticCacheBuilder {
    config: CacheConfig,
    store: Option<Arc<dyn VectorStore>>,
    sets: Option<Arc<dyn SetStore>>,
    embedder: Option<Arc<dyn Embedder>>,
    reranker: Option<Arc<dyn Reranker>>,
    refresher: Option<Arc<dyn Refresher>>,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl SemanticCacheBuilder {
    /// Similarity store for entries
    pub fn store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set store for the tag index
    pub fn sets(mut self, sets: Arc<dyn SetStore>) -> Self {
        self.sets = Some(sets);
        self
    }

    /// Use one in-process [`MemoryStore`], namespaced by the cache name, for
    /// both entries and tags
    pub fn memory_store(self) -> Self {
        let store = Arc::new(MemoryStore::new(self.config.name.clone()));
        self.store(store.clone()).sets(store)
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Callback used to regenerate stale entries in the background
    pub fn refresher(mut self, refresher: Arc<dyn Refresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Share a metrics recorder instead of creating one
    pub fn metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate the configuration and assemble the cache
    pub fn build(self) -> Result<SemanticCache> {
        let config = self.config;
        config.validate()?;

        let store = self
            .store
            .ok_or_else(|| CacheError::ConfigError("a vector store is required".to_string()))?;
        let embedder = self
            .embedder
            .ok_or_else(|| CacheError::ConfigError("an embedder is required".to_string()))?;

        let tags = if config.enable_tags {
            let sets = self.sets.ok_or_else(|| {
                CacheError::ConfigError("tags are enabled but no set store is configured".to_string())
            })?;
            Some(TagIndex::new(config.name.clone(), sets, store.clone()))
        } else {
            None
        };

        let l1 = config.l1.enabled.then(|| {
            L1Cache::new(
                config.l1.max_size,
                config.l1.ttl,
                config.l1.eviction_strategy,
            )
        });

        let metrics = self.metrics.unwrap_or_else(|| {
            Arc::new(MetricsRecorder::new(
                config.observability.enable_detailed_metrics,
            ))
        });

        info!(
            "Initializing semantic cache '{}' (threshold: {}, ttl: {:?}, l1: {}, tags: {}, reranker: {}, refresher: {})",
            config.name,
            config.distance_threshold,
            config.ttl,
            config.l1.enabled,
            config.enable_tags,
            self.reranker.is_some(),
            self.refresher.is_some()
        );

        let inner = Inner {
            settings: RwLock::new(RuntimeSettings {
                distance_threshold: config.distance_threshold,
                ttl: config.ttl,
            }),
            staleness: StalenessPolicy::new(&config.staleness),
            retry: RetryPolicy::new(&config.retry),
            store,
            embedder,
            reranker: self.reranker,
            refresher: self.refresher,
            l1,
            tags,
            metrics,
            refreshes: RefreshRegistry::new(),
            config,
        };

        Ok(SemanticCache {
            inner: Arc::new(inner),
        })
    }
}

fn preview(text: &str) -> String {
    const PREVIEW_CHARS: usize = 50;
    if text.chars().count() <= PREVIEW_CHARS {
        text.to_string()
    } else {
        let mut short: String = text.chars().take(PREVIEW_CHARS).collect();
        short.push_str("...");
        short
    }
}

/// Generation latency the caller recorded on the entry, if any
fn generation_latency(metadata: &Metadata) -> Option<Duration> {
    metadata
        .get(META_LATENCY_MS)
        .and_then(|v| v.as_f64())
        .filter(|ms| ms.is_finite() && *ms >= 0.0)
        .and_then(|ms| Duration::try_from_secs_f64(ms / 1000.0).ok())
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl SemanticCache {
    /// Start building a cache with the given configuration
    pub fn builder(config: CacheConfig) -> SemanticCacheBuilder {
        SemanticCacheBuilder {
            config,
            store: None,
            sets: None,
            embedder: None,
            reranker: None,
            refresher: None,
            metrics: None,
        }
    }

    /// Cache backed by an in-process [`MemoryStore`]
    pub fn in_memory(config: CacheConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Self::builder(config).memory_store().embedder(embedder).build()
    }

    /// Configuration the cache was built with
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    fn settings(&self) -> RuntimeSettings {
        *self.inner.settings.read()
    }

    fn derive_key(
        &self,
        prompt: &str,
        user_id: Option<&str>,
        context: Option<&Context>,
        filters: &Filters,
    ) -> Result<LookupKey> {
        let lookup = LookupKey::derive(
            prompt,
            user_id,
            context,
            self.inner.config.enable_context_hashing,
            &self.inner.config.context_fields,
        )?;
        Ok(lookup.scoped(filters))
    }

    /// Look up a response for a semantically similar prompt.
    ///
    /// Returns `None` on a miss, including misses caused by collaborator
    /// failures, stale entries or version mismatches.
    #[instrument(
        name = "cache.check",
        skip_all,
        fields(cache_hit = Empty, cache_layer = Empty, l1_latency_ms = Empty, l2_latency_ms = Empty, error = Empty)
    )]
    pub async fn check(&self, query: &CacheQuery) -> Option<String> {
        let start = Instant::now();
        self.inner.metrics.record_query();

        let lookup = match self.derive_key(
            &query.prompt,
            query.user_id.as_deref(),
            query.context.as_ref(),
            &query.filters,
        ) {
            Ok(lookup) => lookup,
            Err(e) => {
                self.record_degraded(&query.prompt, &e);
                return None;
            }
        };

        if let Some(response) = self.probe_l1(&lookup, start) {
            return Some(response);
        }

        self.resolve_l2(query, &lookup, start).await
    }

    /// L1 probe with hit/miss accounting
    fn probe_l1(&self, lookup: &LookupKey, start: Instant) -> Option<String> {
        let l1 = self.inner.l1.as_ref()?;

        match l1.get(&lookup.key) {
            Some(entry) => {
                let metrics = &self.inner.metrics;
                let elapsed = start.elapsed();
                metrics.record_tier_hit(CacheTier::L1, elapsed);
                metrics.record_hit(Some(generation_latency(&entry.metadata).unwrap_or(elapsed)));

                let span = Span::current();
                span.record("cache_hit", true);
                span.record("cache_layer", "l1");
                span.record("l1_latency_ms", millis(elapsed));
                if let Some(label) = &lookup.context_label {
                    metrics.record_context_hit(label);
                }
                debug!("Cache HIT (l1): {}", preview(&lookup.key));
                Some(entry.response)
            }
            None => {
                self.inner.metrics.record_tier_miss(CacheTier::L1);
                None
            }
        }
    }

    /// Backing-store leg, with accounting. Errors degrade to a miss.
    async fn resolve_l2(&self, query: &CacheQuery, lookup: &LookupKey, start: Instant) -> Option<String> {
        let metrics = &self.inner.metrics;

        match self.lookup_l2(query, lookup).await {
            Ok(Resolution::Hit {
                response,
                generation_latency: saved,
            }) => {
                let elapsed = start.elapsed();
                metrics.record_tier_hit(CacheTier::L2, elapsed);
                metrics.record_hit(Some(saved.unwrap_or(elapsed)));

                let span = Span::current();
                span.record("cache_hit", true);
                span.record("cache_layer", "l2");
                span.record("l2_latency_ms", millis(elapsed));
                if let Some(label) = &lookup.context_label {
                    metrics.record_context_hit(label);
                }
                debug!("Cache HIT (l2): '{}'", preview(&query.prompt));
                Some(response)
            }
            Ok(Resolution::Miss(reason)) => {
                Span::current().record("cache_hit", false);
                metrics.record_tier_miss(CacheTier::L2);
                metrics.record_miss();
                debug!("Cache MISS ({}): '{}'", reason, preview(&query.prompt));
                None
            }
            Err(e) => {
                metrics.record_tier_miss(CacheTier::L2);
                self.record_degraded(&query.prompt, &e);
                None
            }
        }
    }

    fn record_degraded(&self, prompt: &str, e: &CacheError) {
        let reason = MissReason::Error {
            kind: e.kind().to_string(),
        };
        self.inner.metrics.record_error();
        self.inner.metrics.record_miss();

        let span = Span::current();
        span.record("cache_hit", false);
        span.record("error", e.kind());
        warn!("Cache MISS ({}): '{}': {}", reason, preview(prompt), e);
    }

    async fn lookup_l2(&self, query: &CacheQuery, lookup: &LookupKey) -> Result<Resolution> {
        let inner = &*self.inner;
        let settings = self.settings();

        let vector_query = VectorQuery {
            vector: Vec::new(),
            distance_threshold: settings.distance_threshold,
            filter: lookup.filter(query.user_id.as_deref(), &query.filters)?,
            limit: query
                .num_results
                .unwrap_or(inner.config.default_num_results)
                .max(1),
            // Full metadata is kept for refresh write-back; the projection
            // applies only to what is served
            return_fields: Vec::new(),
        };

        let prompt = query.prompt.as_str();
        let template = &vector_query;
        let mut results = inner
            .retry
            .execute("check", move || async move {
                let vector = inner.embedder.embed(prompt).await?;
                let q = VectorQuery {
                    vector,
                    ..template.clone()
                };
                inner.store.query(&q).await
            })
            .await?;

        let Some(top) = results.first() else {
            return Ok(Resolution::Miss(MissReason::NoMatch));
        };
        if top.distance > settings.distance_threshold {
            return Ok(Resolution::Miss(MissReason::BeyondThreshold));
        }

        if let Some(reranker) = &inner.reranker {
            results = self.rerank(reranker.as_ref(), prompt, results).await?;
            inner.metrics.record_rerank();
        }

        let Some(best) = results.into_iter().next() else {
            return Ok(Resolution::Miss(MissReason::NoMatch));
        };

        let ttl = best.entry.ttl.or(settings.ttl);
        let age = best.entry.age();
        let freshness = inner.staleness.classify(age, ttl);

        if freshness == Freshness::StaleRefuse {
            inner.metrics.record_stale_refused();
            debug!(
                "Refusing entry {} (age: {:?}, ttl: {:?})",
                best.key, age, ttl
            );
            return Ok(Resolution::Miss(MissReason::StaleRefused));
        }

        if inner.config.enable_version_checking {
            if let Some(stored) = best.entry.cache_version() {
                if stored != inner.config.cache_version {
                    inner.metrics.record_version_mismatch();
                    return Ok(Resolution::Miss(MissReason::VersionMismatch {
                        stored: stored.to_string(),
                        current: inner.config.cache_version.clone(),
                    }));
                }
            }
        }

        if freshness == Freshness::StaleServe {
            inner.metrics.record_stale_served(age);
            info!(
                "Serving stale entry {} (age: {:?}), refreshing in background",
                best.key, age
            );
            self.spawn_refresh(query, lookup, &best.entry);
        }

        let latency = generation_latency(&best.entry.metadata);
        let mut served = best.entry;
        served.project_metadata(&query.return_fields);

        if let Some(l1) = &inner.l1 {
            l1.set(lookup.key.clone(), served.response.clone(), served.metadata);
        }

        Ok(Resolution::Hit {
            response: served.response,
            generation_latency: latency,
        })
    }

    /// Reorder candidates by reranker relevance, keeping at most
    /// `rerank_limit`
    async fn rerank(
        &self,
        reranker: &dyn Reranker,
        prompt: &str,
        results: Vec<ScoredEntry>,
    ) -> Result<Vec<ScoredEntry>> {
        let documents: Vec<String> = results.iter().map(|r| r.entry.prompt.clone()).collect();
        let ranked = reranker.rank(prompt, &documents).await?;

        if ranked.is_empty() {
            return Ok(results);
        }

        let mut slots: Vec<Option<ScoredEntry>> = results.into_iter().map(Some).collect();
        let reordered: Vec<ScoredEntry> = ranked
            .iter()
            .filter_map(|doc| slots.get_mut(doc.index).and_then(Option::take))
            .take(self.inner.config.rerank_limit)
            .collect();

        debug!("Reranked {} candidates", reordered.len());
        Ok(reordered)
    }

    /// Start a background refresh for a stale entry unless one is running
    fn spawn_refresh(&self, query: &CacheQuery, lookup: &LookupKey, stale: &CacheEntry) {
        let Some(refresher) = self.inner.refresher.clone() else {
            debug!("No refresher configured, stale entry left as is");
            return;
        };
        let Some(guard) = self.inner.refreshes.try_begin(&lookup.key) else {
            debug!("Refresh already in flight for {}", preview(&lookup.key));
            return;
        };

        self.inner.metrics.record_refresh_started();

        // Carry over the caller's annotations and filters so the refreshed
        // entry lands under the same store key and keeps its tags.
        let mut request = StoreRequest::new(query.prompt.clone(), String::new());
        request.user_id = query.user_id.clone();
        request.context = query.context.clone();
        request.ttl = stale.ttl;
        request.metadata = stale
            .metadata
            .iter()
            .filter(|(k, _)| {
                !matches!(
                    k.as_str(),
                    META_CACHED_AT | META_CACHE_VERSION | META_CONTEXT_HASH | META_CONTEXT
                )
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        request.filters = stale
            .filter_tags
            .iter()
            .filter(|(k, _)| k.as_str() != USER_FIELD && k.as_str() != CONTEXT_HASH_FIELD)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let cache = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let refreshed = refresher
                .refresh(
                    &request.prompt,
                    request.user_id.as_deref(),
                    request.context.as_ref(),
                )
                .await;

            let outcome = match refreshed {
                Ok(response) => {
                    request.response = response;
                    cache.store(&request).await
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(key) => info!("Background refresh completed (key: {})", key),
                Err(e) => {
                    cache.inner.metrics.record_refresh_failed();
                    error!(
                        "Background refresh failed for '{}': {}",
                        preview(&request.prompt),
                        e
                    );
                }
            }
        });
    }

    /// Store a response. Returns the backing store's key for the entry.
    #[instrument(
        name = "cache.store",
        skip_all,
        fields(tag_count = request.tags.len(), cache_layer = Empty, error = Empty)
    )]
    pub async fn store(&self, request: &StoreRequest) -> Result<String> {
        let inner = &*self.inner;

        if request.tags.len() > inner.config.max_tags_per_entry {
            return Err(CacheError::Validation(format!(
                "{} tags supplied, at most {} allowed per entry",
                request.tags.len(),
                inner.config.max_tags_per_entry
            )));
        }
        for field in request.filters.keys() {
            validate_field_name(field)?;
        }

        let lookup = self.derive_key(
            &request.prompt,
            request.user_id.as_deref(),
            request.context.as_ref(),
            &request.filters,
        )?;
        let settings = self.settings();

        let mut metadata = request.metadata.clone();
        metadata.insert(META_CACHED_AT.to_string(), json!(Utc::now().to_rfc3339()));
        metadata.insert(
            META_CACHE_VERSION.to_string(),
            json!(inner.config.cache_version),
        );
        if let Some(digest) = &lookup.digest {
            metadata.insert(META_CONTEXT_HASH.to_string(), json!(digest));
        }
        if let Some(context) = &request.context {
            metadata.insert(META_CONTEXT.to_string(), serde_json::to_value(context)?);
        }

        let mut entry = CacheEntry::new(request.prompt.clone(), request.response.clone(), Vec::new())
            .with_metadata(metadata);
        for (field, value) in &request.filters {
            entry = entry.with_filter_tag(field.clone(), value.clone());
        }
        if let Some(user) = &request.user_id {
            entry = entry.with_partition(user.clone());
        }
        if let Some(digest) = &lookup.digest {
            entry = entry.with_filter_tag(CONTEXT_HASH_FIELD, digest.clone());
        }
        if let Some(ttl) = request.ttl {
            entry = entry.with_ttl(ttl);
        }

        let expires_in = inner
            .config
            .retention_with_jitter(request.ttl.or(settings.ttl));

        let entry_ref = &entry;
        let result = inner
            .retry
            .execute("store", move || async move {
                let embedding = inner.embedder.embed(&entry_ref.prompt).await?;
                let mut to_store = entry_ref.clone();
                to_store.embedding = embedding;
                inner.store.put(to_store, expires_in).await
            })
            .await;

        let key = match result {
            Ok(key) => key,
            Err(e) => {
                inner.metrics.record_error();
                Span::current().record("error", e.kind());
                error!("Error storing '{}' in cache: {}", preview(&request.prompt), e);
                return Err(e);
            }
        };

        if let Some(l1) = &inner.l1 {
            l1.set(lookup.key, entry.response, entry.metadata);
            Span::current().record("cache_layer", "l1+l2");
        } else {
            Span::current().record("cache_layer", "l2");
        }

        if !request.tags.is_empty() {
            match &inner.tags {
                Some(index) => {
                    let key_ref = key.as_str();
                    let tags = request.tags.as_slice();
                    inner
                        .retry
                        .execute("add_tags", move || index.add_tags(key_ref, tags))
                        .await
                        .map_err(|e| {
                            inner.metrics.record_error();
                            e
                        })?;
                }
                None => warn!("Tags supplied but the tag index is disabled; ignoring {:?}", request.tags),
            }
        }

        info!("Stored in cache: '{}' (key: {})", preview(&request.prompt), key);
        Ok(key)
    }

    /// Look up several prompts at once.
    ///
    /// `user_ids` and `contexts`, when given, must match `prompts` in length.
    /// Results keep input order and match what [`SemanticCache::check`] would
    /// return for each slot.
    pub async fn batch_check(
        &self,
        prompts: &[String],
        user_ids: Option<&[Option<String>]>,
        contexts: Option<&[Option<Context>]>,
    ) -> Result<Vec<Option<String>>> {
        if let Some(users) = user_ids {
            if users.len() != prompts.len() {
                return Err(CacheError::Validation(format!(
                    "user_ids has {} entries but prompts has {}",
                    users.len(),
                    prompts.len()
                )));
            }
        }
        if let Some(ctxs) = contexts {
            if ctxs.len() != prompts.len() {
                return Err(CacheError::Validation(format!(
                    "contexts has {} entries but prompts has {}",
                    ctxs.len(),
                    prompts.len()
                )));
            }
        }

        let queries: Vec<CacheQuery> = prompts
            .iter()
            .enumerate()
            .map(|(i, prompt)| CacheQuery {
                prompt: prompt.clone(),
                user_id: user_ids.and_then(|u| u[i].clone()),
                context: contexts.and_then(|c| c[i].clone()),
                ..Default::default()
            })
            .collect();

        Ok(self.batch_check_queries(&queries).await)
    }

    /// Look up several fully specified queries at once, preserving order
    #[instrument(
        name = "cache.batch_check",
        skip_all,
        fields(batch_size = queries.len(), hits = Empty)
    )]
    pub async fn batch_check_queries(&self, queries: &[CacheQuery]) -> Vec<Option<String>> {
        let start = Instant::now();
        let mut results: Vec<Option<String>> = vec![None; queries.len()];
        let mut pending: Vec<(usize, LookupKey)> = Vec::new();

        // L1 probes never suspend, so they run inline first
        for (i, query) in queries.iter().enumerate() {
            self.inner.metrics.record_query();

            match self.derive_key(
                &query.prompt,
                query.user_id.as_deref(),
                query.context.as_ref(),
                &query.filters,
            ) {
                Ok(lookup) => match self.probe_l1(&lookup, start) {
                    Some(response) => results[i] = Some(response),
                    None => pending.push((i, lookup)),
                },
                Err(e) => self.record_degraded(&query.prompt, &e),
            }
        }

        let l1_hits = queries.len() - pending.len();
        let lookups = pending.iter().map(|(i, lookup)| {
            let slot = info_span!(
                "cache.batch_slot",
                index = *i,
                cache_hit = Empty,
                cache_layer = Empty,
                l2_latency_ms = Empty,
                error = Empty
            );
            async move { (*i, self.resolve_l2(&queries[*i], lookup, start).await) }
                .instrument(slot)
        });

        for (i, response) in join_all(lookups).await {
            results[i] = response;
        }

        let hits = results.iter().filter(|r| r.is_some()).count();
        Span::current().record("hits", hits);
        debug!(
            "Batch check: {} queries, {} answered from l1, {} hits total",
            queries.len(),
            l1_hits,
            hits
        );
        results
    }

    /// Remove every entry carrying `tag`. Clears the whole in-process tier.
    pub async fn invalidate_by_tag(&self, tag: &str) -> Result<usize> {
        let Some(index) = &self.inner.tags else {
            warn!("Tag index not enabled, cannot invalidate by tag '{}'", tag);
            return Ok(0);
        };

        self.clear_l1();
        let count = self
            .inner
            .retry
            .execute("invalidate_by_tag", move || index.invalidate_by_tag(tag))
            .await?;
        // A concurrent check may have refilled L1 from entries just deleted
        self.clear_l1();
        self.inner.metrics.record_tag_invalidation(tag, count);
        Ok(count)
    }

    /// Remove entries carrying any or all of `tags`. Clears the whole
    /// in-process tier.
    pub async fn invalidate_by_tags(&self, tags: &[String], match_all: bool) -> Result<usize> {
        let Some(index) = &self.inner.tags else {
            warn!("Tag index not enabled, cannot invalidate by tags {:?}", tags);
            return Ok(0);
        };

        self.clear_l1();
        let count = self
            .inner
            .retry
            .execute("invalidate_by_tags", move || {
                index.invalidate_by_tags(tags, match_all)
            })
            .await?;
        self.clear_l1();
        for tag in tags {
            self.inner.metrics.record_tag_invalidation(tag, count);
        }
        Ok(count)
    }

    fn clear_l1(&self) {
        if let Some(l1) = &self.inner.l1 {
            l1.clear();
        }
    }

    /// Remove every entry from both tiers
    pub async fn clear(&self) -> Result<usize> {
        self.clear_l1();

        let store = &self.inner.store;
        let removed = self
            .inner
            .retry
            .execute("clear", move || store.clear())
            .await?;
        info!("Cache cleared ({} entries)", removed);
        Ok(removed)
    }

    /// Change the distance threshold (0.0 - 1.0)
    pub fn set_threshold(&self, threshold: f32) -> Result<()> {
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(CacheError::Validation(format!(
                "threshold must be between 0.0 and 1.0, got {}",
                threshold
            )));
        }
        self.inner.settings.write().distance_threshold = threshold;
        info!("Threshold updated to {}", threshold);
        Ok(())
    }

    /// Change the default TTL for new and existing entries without an override
    pub fn set_ttl(&self, ttl: Option<Duration>) {
        self.inner.settings.write().ttl = ttl;
        info!("TTL updated to {:?}", ttl);
    }

    /// Current distance threshold
    pub fn distance_threshold(&self) -> f32 {
        self.settings().distance_threshold
    }

    /// Current default TTL
    pub fn ttl(&self) -> Option<Duration> {
        self.settings().ttl
    }

    /// Structured metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Metrics in text exposition format
    pub fn metrics_prometheus(&self) -> String {
        self.inner
            .metrics
            .to_prometheus(&self.inner.config.observability.metrics_prefix)
    }

    pub fn reset_metrics(&self) {
        self.inner.metrics.reset();
        info!("Metrics reset");
    }

    /// The recorder this cache writes to
    pub fn metrics_recorder(&self) -> Arc<MetricsRecorder> {
        Arc::clone(&self.inner.metrics)
    }

    /// Resolves once no background refresh is running
    pub async fn wait_for_refreshes(&self) {
        self.inner.refreshes.wait_idle().await;
    }

    /// Number of background refreshes running
    pub fn refreshes_in_flight(&self) -> usize {
        self.inner.refreshes.in_flight()
    }

    /// In-process tier occupancy (0 when the tier is disabled)
    pub fn l1_len(&self) -> usize {
        self.inner.l1.as_ref().map(L1Cache::len).unwrap_or(0)
    }

    /// In-process tier statistics, if the tier is enabled
    pub fn l1_stats(&self) -> Option<L1Stats> {
        self.inner.l1.as_ref().map(L1Cache::stats)
    }
}
