//! Core type definitions for the cache system

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Composite lookup key used by the in-process tier
pub type CacheKey = String;

/// Request context (conversation id, persona, session...). Ordered so that
/// serialization is canonical.
pub type Context = BTreeMap<String, serde_json::Value>;

/// Equality filters applied to the backing store (`field == value`)
pub type Filters = BTreeMap<String, String>;

/// Free-form entry annotations
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Statistics for the in-process tier
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct L1Stats {
    /// Total number of L1 hits
    pub hits: u64,

    /// Total number of L1 misses (absent or expired)
    pub misses: u64,

    /// Number of entries currently held
    pub entries: usize,

    /// Number of capacity evictions
    pub evictions: u64,

    /// Number of entries dropped because their age exceeded the L1 TTL
    pub expirations: u64,
}

impl L1Stats {
    /// Calculate hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl fmt::Display for L1Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "L1Stats {{ hits: {}, misses: {}, hit_rate: {:.2}%, entries: {}, evictions: {}, expirations: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.entries,
            self.evictions,
            self.expirations
        )
    }
}

/// Cache tier that answered (or failed to answer) a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheTier {
    /// In-process bounded cache
    L1,

    /// Persistent similarity-search store
    L2,
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTier::L1 => write!(f, "l1"),
            CacheTier::L2 => write!(f, "l2"),
        }
    }
}

/// Why a lookup resolved to a miss.
///
/// Every reason returns the same shape to the caller; the distinction only
/// shows up in logs and metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissReason {
    /// Nothing within the distance threshold
    NoMatch,

    /// Store returned a candidate whose distance exceeds the threshold
    BeyondThreshold,

    /// Entry older than the maximum stale age
    StaleRefused,

    /// Entry written under a different cache format version
    VersionMismatch { stored: String, current: String },

    /// A collaborator failed and the read degraded to a miss
    Error { kind: String },
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissReason::NoMatch => write!(f, "no match"),
            MissReason::BeyondThreshold => write!(f, "beyond distance threshold"),
            MissReason::StaleRefused => write!(f, "stale entry refused"),
            MissReason::VersionMismatch { stored, current } => {
                write!(f, "version mismatch: stored={} current={}", stored, current)
            }
            MissReason::Error { kind } => write!(f, "degraded on {} error", kind),
        }
    }
}
