use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::expiry_after;
use crate::storage::{KeyValueStore, load_json, save_json};

/// Hosted cached-content API wrapped by the cache manager
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Upload `content`, returning the provider's id for it
    async fn create(&self, content: &str, ttl_seconds: u64) -> Result<String>;

    /// Push the resource's expiry out to `ttl_seconds` from now
    async fn extend(&self, cache_id: &str, ttl_seconds: u64) -> Result<()>;

    async fn delete(&self, cache_id: &str) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredContent {
    content: String,
    expires_at: DateTime<Utc>,
}

/// Cache backend that keeps content in the local key-value store
///
/// Used by the CLI and for offline sessions where no hosted cache is reachable.
#[derive(Clone)]
pub struct LocalCacheBackend {
    store: Arc<dyn KeyValueStore>,
}

impl LocalCacheBackend {
    #[inline]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn storage_key(cache_id: &str) -> String {
        format!("cached_content:{}", cache_id)
    }

    /// Stored content for a live id
    #[inline]
    pub async fn content(&self, cache_id: &str) -> Result<Option<String>> {
        let stored: Option<StoredContent> =
            load_json(self.store.as_ref(), &Self::storage_key(cache_id)).await?;
        Ok(stored
            .filter(|s| s.expires_at > Utc::now())
            .map(|s| s.content))
    }
}

#[async_trait]
impl CacheBackend for LocalCacheBackend {
    #[inline]
    async fn create(&self, content: &str, ttl_seconds: u64) -> Result<String> {
        let cache_id = format!("cachedContents/{}", Uuid::new_v4());
        let stored = StoredContent {
            content: content.to_string(),
            expires_at: expiry_after(Utc::now(), ttl_seconds),
        };

        save_json(self.store.as_ref(), &Self::storage_key(&cache_id), &stored)
            .await
            .context("Failed to store cached content")?;

        debug!("Stored {} chars of cached content as {}", content.len(), cache_id);
        Ok(cache_id)
    }

    #[inline]
    async fn extend(&self, cache_id: &str, ttl_seconds: u64) -> Result<()> {
        let key = Self::storage_key(cache_id);
        let mut stored: StoredContent = load_json(self.store.as_ref(), &key)
            .await?
            .with_context(|| format!("Cached content {} not found", cache_id))?;

        stored.expires_at = expiry_after(Utc::now(), ttl_seconds);
        save_json(self.store.as_ref(), &key, &stored).await
    }

    #[inline]
    async fn delete(&self, cache_id: &str) -> Result<()> {
        self.store.remove(&Self::storage_key(cache_id)).await
    }
}
