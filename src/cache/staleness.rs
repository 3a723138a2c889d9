//! Staleness classification and single-flight refresh tracking

use crate::cache::config::StalenessConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Outcome of classifying an entry's age
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Freshness {
    /// Within TTL, serve normally
    Fresh,

    /// Past TTL but within the stale window: serve and refresh in the background
    StaleServe,

    /// Too old to serve
    StaleRefuse,
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Freshness::Fresh => write!(f, "fresh"),
            Freshness::StaleServe => write!(f, "stale-serve"),
            Freshness::StaleRefuse => write!(f, "stale-refuse"),
        }
    }
}

/// Stateless age classification
#[derive(Debug, Clone)]
pub struct StalenessPolicy {
    stale_while_revalidate: bool,
    stale_tolerance: Duration,
    max_stale_age: Option<Duration>,
}

impl StalenessPolicy {
    /// Build the policy from configuration
    pub fn new(config: &StalenessConfig) -> Self {
        Self {
            stale_while_revalidate: config.enable_stale_while_revalidate,
            stale_tolerance: config.stale_tolerance,
            max_stale_age: config.max_stale_age,
        }
    }

    /// Oldest age at which an entry with the given TTL may still be served
    pub fn max_stale_age(&self, ttl: Duration) -> Duration {
        self.max_stale_age
            .unwrap_or(ttl.saturating_add(self.stale_tolerance))
            .max(ttl)
    }

    /// Classify an entry of age `age` under `ttl` (`None` means no expiry)
    pub fn classify(&self, age: Duration, ttl: Option<Duration>) -> Freshness {
        let Some(ttl) = ttl else {
            return Freshness::Fresh;
        };

        if age <= ttl {
            Freshness::Fresh
        } else if self.stale_while_revalidate && age <= self.max_stale_age(ttl) {
            Freshness::StaleServe
        } else {
            Freshness::StaleRefuse
        }
    }
}

struct RegistryState {
    in_flight: Mutex<HashSet<String>>,
    count: watch::Sender<usize>,
}

/// Per-key registry of in-flight background refreshes.
///
/// At most one refresh runs per key; [`RefreshRegistry::wait_idle`] resolves
/// once nothing is in flight.
#[derive(Clone)]
pub struct RefreshRegistry {
    state: Arc<RegistryState>,
}

/// Held by a running refresh. Dropping it releases the key.
pub struct RefreshGuard {
    key: String,
    state: Arc<RegistryState>,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.state.in_flight.lock().remove(&self.key);
        self.state.count.send_modify(|c| *c = c.saturating_sub(1));
        debug!("Refresh finished: {}", self.key);
    }
}

impl RefreshRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        let (count, _) = watch::channel(0usize);
        Self {
            state: Arc::new(RegistryState {
                in_flight: Mutex::new(HashSet::new()),
                count,
            }),
        }
    }

    /// Claim `key` for a refresh. Returns `None` if one is already running.
    pub fn try_begin(&self, key: &str) -> Option<RefreshGuard> {
        {
            let mut in_flight = self.state.in_flight.lock();
            if !in_flight.insert(key.to_string()) {
                return None;
            }
            // Counter moves under the same lock so it never lags membership
            self.state.count.send_modify(|c| *c += 1);
        }

        debug!("Refresh started: {}", key);
        Some(RefreshGuard {
            key: key.to_string(),
            state: Arc::clone(&self.state),
        })
    }

    /// Whether a refresh for `key` is running
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.state.in_flight.lock().contains(key)
    }

    /// Number of refreshes running
    pub fn in_flight(&self) -> usize {
        *self.state.count.borrow()
    }

    /// Wait until no refresh is running
    pub async fn wait_idle(&self) {
        let mut rx = self.state.count.subscribe();
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for RefreshRegistry {
    fn default() -> Self {
        Self::new()
    }
}
