//! Composite lookup keys, context digests and store filters

use crate::backend::TagFilter;
use crate::cache::types::{CacheKey, Context, Filters};
use crate::error::{CacheError, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Filter field carrying the partition (user id)
pub const USER_FIELD: &str = "user_id";

/// Filter field carrying the context digest
pub const CONTEXT_HASH_FIELD: &str = "context_hash";

/// Width of the truncated context digest, in hex characters
pub const DIGEST_WIDTH: usize = 16;

/// Deterministic digest of the configured subset of `context`.
///
/// `fields` selects which keys take part; an empty list selects every key.
/// Returns `None` when the selected subset is empty, so a context that
/// carries none of the configured fields does not partition the cache.
pub fn context_digest(context: &Context, fields: &[String]) -> Result<Option<String>> {
    let subset: BTreeMap<&String, &serde_json::Value> = context
        .iter()
        .filter(|(k, _)| fields.is_empty() || fields.contains(*k))
        .collect();

    if subset.is_empty() {
        return Ok(None);
    }

    // BTreeMap and serde_json's default Map both serialize with sorted keys
    let canonical = serde_json::to_vec(&subset)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    let digest = hex::encode(hasher.finalize());

    Ok(Some(digest[..DIGEST_WIDTH].to_string()))
}

/// Label used for per-context hit metrics: persona, then conversation id
pub fn context_label(context: &Context) -> String {
    ["user_persona", "conversation_id"]
        .iter()
        .find_map(|field| context.get(*field))
        .map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Everything derived from a request's prompt, user and context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupKey {
    /// Composite key for the in-process tier
    pub key: CacheKey,

    /// Context digest, when context hashing applies
    pub digest: Option<String>,

    /// Metrics label for the request context, if any context was supplied
    pub context_label: Option<String>,
}

impl LookupKey {
    /// Derive the lookup key for a request.
    ///
    /// The key is `prompt`, then `:user:<id>` when a user is given, then
    /// `:ctx:<digest>` when a digest applies.
    pub fn derive(
        prompt: &str,
        user_id: Option<&str>,
        context: Option<&Context>,
        hashing_enabled: bool,
        fields: &[String],
    ) -> Result<Self> {
        let digest = match context {
            Some(ctx) if hashing_enabled => context_digest(ctx, fields)?,
            _ => None,
        };

        let mut key = prompt.to_string();
        if let Some(user) = user_id {
            key.push_str(":user:");
            key.push_str(user);
        }
        if let Some(d) = &digest {
            key.push_str(":ctx:");
            key.push_str(d);
        }

        Ok(Self {
            key,
            digest,
            context_label: context.map(context_label),
        })
    }

    /// Scope the in-process key to caller-supplied filters, appended as
    /// `:filter:<field>=<value>` in field order
    pub fn scoped(mut self, filters: &Filters) -> Self {
        for (field, value) in filters {
            self.key.push_str(":filter:");
            self.key.push_str(field);
            self.key.push('=');
            self.key.push_str(value);
        }
        self
    }

    /// Conjunctive store filter: user partition, context digest, then any
    /// caller-supplied equality filters
    pub fn filter(&self, user_id: Option<&str>, extra: &Filters) -> Result<TagFilter> {
        let mut filter = TagFilter::new();

        if let Some(user) = user_id {
            filter = filter.and(USER_FIELD, user);
        }
        if let Some(digest) = &self.digest {
            filter = filter.and(CONTEXT_HASH_FIELD, digest.as_str());
        }
        for (field, value) in extra {
            validate_field_name(field)?;
            filter = filter.and(field.as_str(), value.as_str());
        }

        Ok(filter)
    }
}

/// Filter field names must be plain identifiers
pub fn validate_field_name(field: &str) -> Result<()> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidFilter(format!(
            "filter field name must be a non-empty identifier: {:?}",
            field
        )))
    }
}
