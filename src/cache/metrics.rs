//! Cache performance metrics
//!
//! One [`MetricsRecorder`] belongs to one orchestrator. All counters live in a
//! single state struct behind a `parking_lot` mutex, so every derived figure
//! in a snapshot comes from the same locked read.

use crate::cache::types::CacheTier;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

/// Samples kept per latency window
pub const LATENCY_WINDOW: usize = 1000;

#[derive(Debug, Default)]
struct LatencyWindow {
    samples_ms: VecDeque<f64>,
}

impl LatencyWindow {
    fn record(&mut self, latency: Duration) {
        if self.samples_ms.len() == LATENCY_WINDOW {
            self.samples_ms.pop_front();
        }
        self.samples_ms.push_back(latency.as_secs_f64() * 1000.0);
    }

    fn average_ms(&self) -> f64 {
        if self.samples_ms.is_empty() {
            return 0.0;
        }
        self.samples_ms.iter().sum::<f64>() / self.samples_ms.len() as f64
    }

    fn p95_ms(&self) -> f64 {
        if self.samples_ms.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.samples_ms.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let rank = ((sorted.len() as f64) * 0.95).ceil() as usize;
        sorted[rank.clamp(1, sorted.len()) - 1]
    }
}

#[derive(Debug, Default)]
struct MetricsState {
    total_queries: u64,
    hits: u64,
    misses: u64,
    errors: u64,
    rerank_operations: u64,
    llm_calls_avoided: u64,
    total_latency_saved: Duration,

    l1_hits: u64,
    l1_misses: u64,
    l2_hits: u64,
    l2_misses: u64,
    l1_latency: LatencyWindow,
    l2_latency: LatencyWindow,

    stale_served: u64,
    stale_refused: u64,
    version_mismatches: u64,
    total_stale_age: Duration,

    refreshes_started: u64,
    refreshes_failed: u64,

    context_hits: BTreeMap<String, u64>,
    tag_invalidations: BTreeMap<String, u64>,
}

/// Per-tier section of a snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate_percentage: f64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub samples: usize,
}

/// Staleness section of a snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StalenessSnapshot {
    pub stale_served_count: u64,
    pub stale_refused_count: u64,
    pub version_mismatches: u64,
    pub average_stale_age_seconds: f64,
    pub refreshes_started: u64,
    pub refreshes_failed: u64,
}

/// Point-in-time view of all metrics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub total_queries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub hit_rate_percentage: f64,
    pub cost_savings_percentage: f64,
    pub llm_calls_avoided: u64,
    pub avg_latency_saved_ms: f64,
    pub errors: u64,
    pub error_rate_percentage: f64,
    pub rerank_operations: u64,
    pub l1_cache: TierSnapshot,
    pub l2_cache: TierSnapshot,
    pub context_hits: BTreeMap<String, u64>,
    pub tag_invalidations: BTreeMap<String, u64>,
    pub staleness: StalenessSnapshot,
    pub timestamp: DateTime<Utc>,
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn tier_snapshot(hits: u64, misses: u64, window: &LatencyWindow) -> TierSnapshot {
    TierSnapshot {
        hits,
        misses,
        hit_rate_percentage: round2(percentage(hits, hits + misses)),
        avg_latency_ms: window.average_ms(),
        p95_latency_ms: window.p95_ms(),
        samples: window.samples_ms.len(),
    }
}

/// Thread-safe metrics for one cache instance
#[derive(Debug)]
pub struct MetricsRecorder {
    detailed: bool,
    state: Mutex<MetricsState>,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new(true)
    }
}

impl MetricsRecorder {
    /// Create a recorder. `detailed` enables per-context and per-tag maps.
    pub fn new(detailed: bool) -> Self {
        Self {
            detailed,
            state: Mutex::new(MetricsState::default()),
        }
    }

    pub fn record_query(&self) {
        self.state.lock().total_queries += 1;
    }

    /// Hit on either tier. `latency_saved` is the generation time avoided,
    /// when the caller knows it.
    pub fn record_hit(&self, latency_saved: Option<Duration>) {
        let mut state = self.state.lock();
        state.hits += 1;
        state.llm_calls_avoided += 1;
        if let Some(saved) = latency_saved {
            state.total_latency_saved = state.total_latency_saved.saturating_add(saved);
        }
    }

    pub fn record_miss(&self) {
        self.state.lock().misses += 1;
    }

    pub fn record_error(&self) {
        self.state.lock().errors += 1;
    }

    pub fn record_rerank(&self) {
        self.state.lock().rerank_operations += 1;
    }

    /// Tier hit with the lookup latency on that tier
    pub fn record_tier_hit(&self, tier: CacheTier, latency: Duration) {
        let mut state = self.state.lock();
        match tier {
            CacheTier::L1 => {
                state.l1_hits += 1;
                state.l1_latency.record(latency);
            }
            CacheTier::L2 => {
                state.l2_hits += 1;
                state.l2_latency.record(latency);
            }
        }
    }

    pub fn record_tier_miss(&self, tier: CacheTier) {
        let mut state = self.state.lock();
        match tier {
            CacheTier::L1 => state.l1_misses += 1,
            CacheTier::L2 => state.l2_misses += 1,
        }
    }

    pub fn record_context_hit(&self, label: &str) {
        if !self.detailed {
            return;
        }
        *self
            .state
            .lock()
            .context_hits
            .entry(label.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_tag_invalidation(&self, tag: &str, count: usize) {
        if !self.detailed {
            return;
        }
        *self
            .state
            .lock()
            .tag_invalidations
            .entry(tag.to_string())
            .or_insert(0) += count as u64;
    }

    pub fn record_stale_served(&self, age: Duration) {
        let mut state = self.state.lock();
        state.stale_served += 1;
        state.total_stale_age += age;
    }

    pub fn record_stale_refused(&self) {
        self.state.lock().stale_refused += 1;
    }

    pub fn record_version_mismatch(&self) {
        self.state.lock().version_mismatches += 1;
    }

    pub fn record_refresh_started(&self) {
        self.state.lock().refreshes_started += 1;
    }

    pub fn record_refresh_failed(&self) {
        self.state.lock().refreshes_failed += 1;
    }

    /// Structured view
    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.lock();

        let avg_saved_ms = if state.hits == 0 {
            0.0
        } else {
            state.total_latency_saved.as_secs_f64() * 1000.0 / state.hits as f64
        };
        let avg_stale_age = if state.stale_served == 0 {
            0.0
        } else {
            state.total_stale_age.as_secs_f64() / state.stale_served as f64
        };

        MetricsSnapshot {
            total_queries: state.total_queries,
            cache_hits: state.hits,
            cache_misses: state.misses,
            hit_rate_percentage: round2(percentage(state.hits, state.total_queries)),
            cost_savings_percentage: round2(percentage(
                state.llm_calls_avoided,
                state.total_queries,
            )),
            llm_calls_avoided: state.llm_calls_avoided,
            avg_latency_saved_ms: round2(avg_saved_ms),
            errors: state.errors,
            error_rate_percentage: round2(percentage(state.errors, state.total_queries)),
            rerank_operations: state.rerank_operations,
            l1_cache: tier_snapshot(state.l1_hits, state.l1_misses, &state.l1_latency),
            l2_cache: tier_snapshot(state.l2_hits, state.l2_misses, &state.l2_latency),
            context_hits: state.context_hits.clone(),
            tag_invalidations: state.tag_invalidations.clone(),
            staleness: StalenessSnapshot {
                stale_served_count: state.stale_served,
                stale_refused_count: state.stale_refused,
                version_mismatches: state.version_mismatches,
                average_stale_age_seconds: round2(avg_stale_age),
                refreshes_started: state.refreshes_started,
                refreshes_failed: state.refreshes_failed,
            },
            timestamp: Utc::now(),
        }
    }

    /// Text exposition format, every metric name prefixed with `prefix`
    pub fn to_prometheus(&self, prefix: &str) -> String {
        let snap = self.snapshot();
        let mut out = String::new();

        let mut metric = |name: &str, help: &str, kind: &str, value: String| {
            out.push_str(&format!("# HELP {}_{} {}\n", prefix, name, help));
            out.push_str(&format!("# TYPE {}_{} {}\n", prefix, name, kind));
            out.push_str(&format!("{}_{} {}\n\n", prefix, name, value));
        };

        metric("queries_total", "Total number of cache queries", "counter", snap.total_queries.to_string());
        metric("hits_total", "Total number of cache hits", "counter", snap.cache_hits.to_string());
        metric("misses_total", "Total number of cache misses", "counter", snap.cache_misses.to_string());
        metric("hit_rate", "Cache hit rate percentage", "gauge", snap.hit_rate_percentage.to_string());

        metric("l1_hits_total", "Total L1 cache hits", "counter", snap.l1_cache.hits.to_string());
        metric("l1_misses_total", "Total L1 cache misses", "counter", snap.l1_cache.misses.to_string());
        metric("l1_hit_rate", "L1 cache hit rate percentage", "gauge", snap.l1_cache.hit_rate_percentage.to_string());
        metric("l1_latency_ms", "Average L1 latency in milliseconds", "gauge", snap.l1_cache.avg_latency_ms.to_string());

        metric("l2_hits_total", "Total L2 cache hits", "counter", snap.l2_cache.hits.to_string());
        metric("l2_misses_total", "Total L2 cache misses", "counter", snap.l2_cache.misses.to_string());
        metric("l2_hit_rate", "L2 cache hit rate percentage", "gauge", snap.l2_cache.hit_rate_percentage.to_string());
        metric("l2_latency_ms", "Average L2 latency in milliseconds", "gauge", snap.l2_cache.avg_latency_ms.to_string());

        metric("llm_calls_avoided", "Total LLM calls avoided", "counter", snap.llm_calls_avoided.to_string());
        metric("errors_total", "Total number of errors", "counter", snap.errors.to_string());
        metric("rerank_operations_total", "Total rerank operations", "counter", snap.rerank_operations.to_string());
        metric("stale_served_total", "Stale entries served", "counter", snap.staleness.stale_served_count.to_string());
        metric("stale_refused_total", "Stale entries refused", "counter", snap.staleness.stale_refused_count.to_string());
        metric("version_mismatches_total", "Entries rejected for version mismatch", "counter", snap.staleness.version_mismatches.to_string());

        if !snap.context_hits.is_empty() {
            out.push_str(&format!(
                "# HELP {p}_context_hits_total Cache hits by context type\n# TYPE {p}_context_hits_total counter\n",
                p = prefix
            ));
            for (label, count) in &snap.context_hits {
                out.push_str(&format!(
                    "{}_context_hits_total{{context_type=\"{}\"}} {}\n",
                    prefix,
                    escape_label(label),
                    count
                ));
            }
            out.push('\n');
        }

        if !snap.tag_invalidations.is_empty() {
            out.push_str(&format!(
                "# HELP {p}_tag_invalidations_total Tag invalidations\n# TYPE {p}_tag_invalidations_total counter\n",
                p = prefix
            ));
            for (tag, count) in &snap.tag_invalidations {
                out.push_str(&format!(
                    "{}_tag_invalidations_total{{tag=\"{}\"}} {}\n",
                    prefix,
                    escape_label(tag),
                    count
                ));
            }
            out.push('\n');
        }

        out
    }

    /// Zero every counter and window
    pub fn reset(&self) {
        *self.state.lock() = MetricsState::default();
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
