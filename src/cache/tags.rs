//! Tag index for bulk invalidation
//!
//! Each tag maps to a set of store keys held in a [`SetStore`]. Sets are
//! pruned lazily: bulk invalidation by several tags deletes the entries but
//! leaves the tag sets, and later invalidations simply find fewer live keys.

use crate::backend::{SetStore, VectorStore};
use crate::error::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Maps tags to the store keys carrying them
pub struct TagIndex {
    namespace: String,
    sets: Arc<dyn SetStore>,
    store: Arc<dyn VectorStore>,
}

impl TagIndex {
    pub fn new(
        namespace: impl Into<String>,
        sets: Arc<dyn SetStore>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            sets,
            store,
        }
    }

    /// Set name holding the keys for `tag`
    pub fn tag_key(&self, tag: &str) -> String {
        format!("{}:tag:{}", self.namespace, tag)
    }

    /// Union `key` into every tag's set
    pub async fn add_tags(&self, key: &str, tags: &[String]) -> Result<()> {
        let member = [key.to_string()];
        for tag in tags {
            self.sets.sadd(&self.tag_key(tag), &member).await?;
        }
        debug!("Added tags {:?} to key {}", tags, key);
        Ok(())
    }

    /// Keys currently recorded under `tag`
    pub async fn members(&self, tag: &str) -> Result<HashSet<String>> {
        self.sets.smembers(&self.tag_key(tag)).await
    }

    /// Delete every entry carrying `tag`, then the tag's set.
    ///
    /// Returns the number of entries the store actually removed.
    pub async fn invalidate_by_tag(&self, tag: &str) -> Result<usize> {
        let tag_key = self.tag_key(tag);
        let keys: Vec<String> = self.sets.smembers(&tag_key).await?.into_iter().collect();

        if keys.is_empty() {
            return Ok(0);
        }

        let removed = self.store.delete(&keys).await?;
        self.sets.delete_sets(&[tag_key]).await?;

        info!("Invalidated {} entries for tag '{}'", removed, tag);
        Ok(removed)
    }

    /// Delete entries carrying any (`match_all == false`) or all of `tags`
    pub async fn invalidate_by_tags(&self, tags: &[String], match_all: bool) -> Result<usize> {
        if tags.is_empty() {
            return Ok(0);
        }

        let tag_keys: Vec<String> = tags.iter().map(|t| self.tag_key(t)).collect();
        let keys = if match_all {
            self.sets.sinter(&tag_keys).await?
        } else {
            self.sets.sunion(&tag_keys).await?
        };

        if keys.is_empty() {
            return Ok(0);
        }

        let keys: Vec<String> = keys.into_iter().collect();
        let removed = self.store.delete(&keys).await?;

        info!(
            "Invalidated {} entries for tags {:?} (match_all: {})",
            removed, tags, match_all
        );
        Ok(removed)
    }
}
