//! Lookup and write requests

use crate::cache::types::{Context, Filters, Metadata};
use std::time::Duration;

/// A cache lookup
#[derive(Debug, Clone, Default)]
pub struct CacheQuery {
    pub prompt: String,
    pub user_id: Option<String>,
    pub context: Option<Context>,

    /// Extra equality filters, combined with the user and context partition
    pub filters: Filters,

    /// Neighbours to request. Falls back to the configured default.
    pub num_results: Option<usize>,

    /// Metadata fields to fetch. Empty fetches all.
    pub return_fields: Vec<String>,
}

impl CacheQuery {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    pub fn num_results(mut self, n: usize) -> Self {
        self.num_results = Some(n);
        self
    }

    pub fn return_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.return_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

/// A cache write
#[derive(Debug, Clone, Default)]
pub struct StoreRequest {
    pub prompt: String,
    pub response: String,
    pub user_id: Option<String>,
    pub context: Option<Context>,

    /// Caller annotations, merged with the managed fields
    pub metadata: Metadata,

    /// Tags for bulk invalidation
    pub tags: Vec<String>,

    /// Extra filterable fields
    pub filters: Filters,

    /// Per-entry TTL override
    pub ttl: Option<Duration>,
}

impl StoreRequest {
    pub fn new(prompt: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            response: response.into(),
            ..Default::default()
        }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}
