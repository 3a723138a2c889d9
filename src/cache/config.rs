//! Configuration for the semantic cache

use crate::cache::l1::EvictionStrategy;
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the in-process tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L1CacheConfig {
    /// Whether the in-process tier is used at all
    pub enabled: bool,

    /// Maximum number of entries held
    pub max_size: usize,

    /// Entry lifetime under the `Ttl` strategy
    pub ttl: Duration,

    /// Eviction strategy, fixed for the cache's lifetime
    pub eviction_strategy: EvictionStrategy,
}

impl Default for L1CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 1000,
            ttl: Duration::from_secs(300),
            eviction_strategy: EvictionStrategy::Lru,
        }
    }
}

/// Stale-while-revalidate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StalenessConfig {
    /// Serve expired-but-recent entries while refreshing them in the background
    pub enable_stale_while_revalidate: bool,

    /// How long past its TTL an entry may still be served
    pub stale_tolerance: Duration,

    /// Absolute age ceiling. When unset, `ttl + stale_tolerance` applies.
    pub max_stale_age: Option<Duration>,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            enable_stale_while_revalidate: false,
            // 5 minutes
            stale_tolerance: Duration::from_secs(300),
            max_stale_age: None,
        }
    }
}

/// Retry settings for backing-store and collaborator calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Multiplier applied to the delay after each retry
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

/// Metrics exposition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Prefix for exposition-format metric names
    pub metrics_prefix: String,

    /// Track per-context hits and per-tag invalidations
    pub enable_detailed_metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_prefix: "semantic_cache".to_string(),
            enable_detailed_metrics: true,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level directive when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration for the semantic cache
///
/// Every option is enumerated and defaulted here; [`CacheConfig::validate`]
/// runs when the cache is constructed so a bad value fails fast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Namespace for store keys and tag sets
    pub name: String,

    /// Maximum vector distance for a semantic match (0.0 - 1.0, inclusive).
    /// Lower is stricter.
    pub distance_threshold: f32,

    /// Default entry TTL. `None` disables expiry.
    pub ttl: Option<Duration>,

    /// Jitter factor (0.0 - 1.0) applied to backing-store retention
    pub ttl_jitter: f64,

    /// Partition entries by a digest of selected context fields
    pub enable_context_hashing: bool,

    /// Context fields that take part in the digest. Empty means all fields.
    pub context_fields: Vec<String>,

    /// Enable the tag index
    pub enable_tags: bool,

    /// Upper bound on tags attached to one entry
    pub max_tags_per_entry: usize,

    /// Nearest neighbours requested per lookup when the caller does not say
    pub default_num_results: usize,

    /// Maximum results kept after reranking
    pub rerank_limit: usize,

    /// Current cache format version
    pub cache_version: String,

    /// Treat entries written under another version as misses
    pub enable_version_checking: bool,

    /// In-process tier
    pub l1: L1CacheConfig,

    /// Staleness mitigation
    pub staleness: StalenessConfig,

    /// Retry behaviour
    pub retry: RetryConfig,

    /// Metrics exposition
    pub observability: ObservabilityConfig,

    /// Log output
    pub logging: LoggingConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "semantic_cache".to_string(),
            distance_threshold: 0.2,
            // 1 hour
            ttl: Some(Duration::from_secs(3600)),
            ttl_jitter: 0.10,
            enable_context_hashing: true,
            context_fields: vec![
                "conversation_id".to_string(),
                "user_persona".to_string(),
                "session_id".to_string(),
            ],
            enable_tags: true,
            max_tags_per_entry: 10,
            default_num_results: 5,
            rerank_limit: 3,
            cache_version: "v1".to_string(),
            enable_version_checking: false,
            l1: L1CacheConfig::default(),
            staleness: StalenessConfig::default(),
            retry: RetryConfig::default(),
            observability: ObservabilityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CacheError::ConfigError("name must not be empty".to_string()));
        }

        if !self.distance_threshold.is_finite()
            || self.distance_threshold < 0.0
            || self.distance_threshold > 1.0
        {
            return Err(CacheError::ConfigError(format!(
                "distance_threshold must be between 0.0 and 1.0, got {}",
                self.distance_threshold
            )));
        }

        if self.ttl_jitter < 0.0 || self.ttl_jitter > 1.0 {
            return Err(CacheError::ConfigError(
                "ttl_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.max_tags_per_entry == 0 {
            return Err(CacheError::ConfigError(
                "max_tags_per_entry must be greater than 0".to_string(),
            ));
        }

        if self.default_num_results == 0 {
            return Err(CacheError::ConfigError(
                "default_num_results must be greater than 0".to_string(),
            ));
        }

        if self.rerank_limit == 0 {
            return Err(CacheError::ConfigError(
                "rerank_limit must be greater than 0".to_string(),
            ));
        }

        if self.cache_version.trim().is_empty() {
            return Err(CacheError::ConfigError(
                "cache_version must not be empty".to_string(),
            ));
        }

        if self.l1.enabled && self.l1.max_size == 0 {
            return Err(CacheError::ConfigError(
                "l1.max_size must be greater than 0".to_string(),
            ));
        }

        if self.l1.enabled
            && self.l1.eviction_strategy == EvictionStrategy::Ttl
            && self.l1.ttl.is_zero()
        {
            return Err(CacheError::ConfigError(
                "l1.ttl must be greater than 0 for the ttl strategy".to_string(),
            ));
        }

        if let (Some(ttl), Some(max_stale)) = (self.ttl, self.staleness.max_stale_age) {
            if max_stale < ttl {
                return Err(CacheError::ConfigError(format!(
                    "staleness.max_stale_age ({:?}) must not be shorter than ttl ({:?})",
                    max_stale, ttl
                )));
            }
        }

        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(CacheError::ConfigError(
                "retry.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(CacheError::ConfigError(format!(
                "logging.level must be one of {:?}",
                VALID_LOG_LEVELS
            )));
        }

        Ok(())
    }

    /// Backing-store retention for an entry: how long it can still be useful,
    /// with jitter applied so entries written together do not expire together.
    ///
    /// `ttl` is the entry's effective TTL. Returns `None` when it never expires.
    pub fn retention_with_jitter(&self, ttl: Option<Duration>) -> Option<Duration> {
        let ttl = ttl?;
        let horizon = if self.staleness.enable_stale_while_revalidate {
            self.staleness
                .max_stale_age
                .unwrap_or(ttl.saturating_add(self.staleness.stale_tolerance))
                .max(ttl)
        } else {
            ttl
        };

        if self.ttl_jitter == 0.0 {
            return Some(horizon);
        }

        // Jitter only ever extends retention; staleness is judged on age, so
        // an entry kept a little longer is still classified correctly.
        let base_secs = horizon.as_secs_f64();
        let jitter = rand::random::<f64>() * base_secs * self.ttl_jitter;
        Some(Duration::try_from_secs_f64(base_secs + jitter).unwrap_or(horizon))
    }

    /// Load configuration from the environment (and a `.env` file if present).
    ///
    /// Recognised variables: `SEMANTIC_CACHE_NAME`, `SEMANTIC_CACHE_TTL`
    /// (seconds, `0` disables expiry), `SEMANTIC_CACHE_DISTANCE_THRESHOLD`,
    /// `SEMANTIC_CACHE_LOG_LEVEL`, `SEMANTIC_CACHE_CACHE_VERSION`.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let mut config = Self::default();

        if let Ok(name) = std::env::var("SEMANTIC_CACHE_NAME") {
            config.name = name;
        }

        if let Ok(ttl) = std::env::var("SEMANTIC_CACHE_TTL") {
            let secs: u64 = ttl.parse().map_err(|_| {
                CacheError::ConfigError(format!("SEMANTIC_CACHE_TTL is not a number: {}", ttl))
            })?;
            config.ttl = if secs == 0 {
                None
            } else {
                Some(Duration::from_secs(secs))
            };
        }

        if let Ok(threshold) = std::env::var("SEMANTIC_CACHE_DISTANCE_THRESHOLD") {
            config.distance_threshold = threshold.parse().map_err(|_| {
                CacheError::ConfigError(format!(
                    "SEMANTIC_CACHE_DISTANCE_THRESHOLD is not a number: {}",
                    threshold
                ))
            })?;
        }

        if let Ok(level) = std::env::var("SEMANTIC_CACHE_LOG_LEVEL") {
            config.logging.level = level.to_lowercase();
        }

        if let Ok(version) = std::env::var("SEMANTIC_CACHE_CACHE_VERSION") {
            config.cache_version = version;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    name: Option<String>,
    distance_threshold: Option<f32>,
    ttl: Option<Option<Duration>>,
    ttl_jitter: Option<f64>,
    enable_context_hashing: Option<bool>,
    context_fields: Option<Vec<String>>,
    enable_tags: Option<bool>,
    max_tags_per_entry: Option<usize>,
    default_num_results: Option<usize>,
    rerank_limit: Option<usize>,
    cache_version: Option<String>,
    enable_version_checking: Option<bool>,
    l1: Option<L1CacheConfig>,
    staleness: Option<StalenessConfig>,
    retry: Option<RetryConfig>,
    observability: Option<ObservabilityConfig>,
    logging: Option<LoggingConfig>,
}

impl CacheConfigBuilder {
    /// Set the namespace
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the distance threshold
    pub fn distance_threshold(mut self, threshold: f32) -> Self {
        self.distance_threshold = Some(threshold);
        self
    }

    /// Set the default TTL (`None` disables expiry)
    pub fn ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set retention jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    /// Enable or disable context hashing
    pub fn enable_context_hashing(mut self, enable: bool) -> Self {
        self.enable_context_hashing = Some(enable);
        self
    }

    /// Set the context fields included in the digest
    pub fn context_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Enable or disable the tag index
    pub fn enable_tags(mut self, enable: bool) -> Self {
        self.enable_tags = Some(enable);
        self
    }

    /// Set the per-entry tag limit
    pub fn max_tags_per_entry(mut self, max: usize) -> Self {
        self.max_tags_per_entry = Some(max);
        self
    }

    /// Set the default neighbour count
    pub fn default_num_results(mut self, n: usize) -> Self {
        self.default_num_results = Some(n);
        self
    }

    /// Set the post-rerank result limit
    pub fn rerank_limit(mut self, limit: usize) -> Self {
        self.rerank_limit = Some(limit);
        self
    }

    /// Set the current cache format version
    pub fn cache_version(mut self, version: impl Into<String>) -> Self {
        self.cache_version = Some(version.into());
        self
    }

    /// Enable or disable version checking
    pub fn enable_version_checking(mut self, enable: bool) -> Self {
        self.enable_version_checking = Some(enable);
        self
    }

    /// Configure the in-process tier
    pub fn l1(mut self, l1: L1CacheConfig) -> Self {
        self.l1 = Some(l1);
        self
    }

    /// Disable the in-process tier
    pub fn disable_l1(mut self) -> Self {
        self.l1 = Some(L1CacheConfig {
            enabled: false,
            ..Default::default()
        });
        self
    }

    /// Configure staleness mitigation
    pub fn staleness(mut self, staleness: StalenessConfig) -> Self {
        self.staleness = Some(staleness);
        self
    }

    /// Configure retries
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Configure metrics exposition
    pub fn observability(mut self, observability: ObservabilityConfig) -> Self {
        self.observability = Some(observability);
        self
    }

    /// Configure log output
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            name: self.name.unwrap_or(defaults.name),
            distance_threshold: self
                .distance_threshold
                .unwrap_or(defaults.distance_threshold),
            ttl: self.ttl.unwrap_or(defaults.ttl),
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            enable_context_hashing: self
                .enable_context_hashing
                .unwrap_or(defaults.enable_context_hashing),
            context_fields: self.context_fields.unwrap_or(defaults.context_fields),
            enable_tags: self.enable_tags.unwrap_or(defaults.enable_tags),
            max_tags_per_entry: self
                .max_tags_per_entry
                .unwrap_or(defaults.max_tags_per_entry),
            default_num_results: self
                .default_num_results
                .unwrap_or(defaults.default_num_results),
            rerank_limit: self.rerank_limit.unwrap_or(defaults.rerank_limit),
            cache_version: self.cache_version.unwrap_or(defaults.cache_version),
            enable_version_checking: self
                .enable_version_checking
                .unwrap_or(defaults.enable_version_checking),
            l1: self.l1.unwrap_or(defaults.l1),
            staleness: self.staleness.unwrap_or(defaults.staleness),
            retry: self.retry.unwrap_or(defaults.retry),
            observability: self.observability.unwrap_or(defaults.observability),
            logging: self.logging.unwrap_or(defaults.logging),
        }
    }
}

/// Preset configurations for common use cases
impl CacheConfig {
    /// Rapidly changing answers: short TTL, strict matching, serve-stale on
    pub fn realtime() -> Self {
        Self {
            // 5 minutes
            ttl: Some(Duration::from_secs(300)),
            distance_threshold: 0.1,
            staleness: StalenessConfig {
                enable_stale_while_revalidate: true,
                stale_tolerance: Duration::from_secs(60),
                max_stale_age: None,
            },
            ..Default::default()
        }
    }

    /// Reference material: long TTL, looser matching, larger L1
    pub fn static_content() -> Self {
        Self {
            // 48 hours
            ttl: Some(Duration::from_secs(48 * 3600)),
            distance_threshold: 0.25,
            l1: L1CacheConfig {
                max_size: 10_000,
                eviction_strategy: EvictionStrategy::Lfu,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Memory-constrained environments
    pub fn small() -> Self {
        Self {
            l1: L1CacheConfig {
                max_size: 100,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
