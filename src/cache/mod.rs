// Cache manager
// Tracks externally hosted cached-content handles with TTLs, a size gate and LRU capacity

pub mod backend;
pub mod registry;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::classifier::QueryType;
use crate::cost::PricingConfig;
use crate::storage::{KeyValueStore, load_json, save_json};
use crate::transcript::estimate_tokens;

pub use backend::{CacheBackend, LocalCacheBackend};
pub use registry::{CacheEntry, CacheRegistry};

/// Storage key of the persisted registry
pub const REGISTRY_KEY: &str = "cache_registry";

/// Entries expiring within this many seconds count as "expiring soon"
const EXPIRING_SOON_SECONDS: i64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for whole-transcript caches
    pub direct_ttl_seconds: u64,
    /// TTL for selected-chunk caches
    pub chunk_ttl_seconds: u64,
    /// TTL for per-query caches on very long videos
    pub query_ttl_seconds: u64,
    /// Upper bound applied to every requested TTL
    pub max_ttl_seconds: u64,
    /// Content smaller than this is never cached
    pub min_tokens: usize,
    /// Transcripts larger than this are never cached whole
    pub max_content_tokens: usize,
    pub registry_capacity: usize,
}

impl Default for CacheConfig {
    #[inline]
    fn default() -> Self {
        Self {
            direct_ttl_seconds: 3600,
            chunk_ttl_seconds: 1800,
            query_ttl_seconds: 7200,
            max_ttl_seconds: 86_400,
            min_tokens: 1000,
            max_content_tokens: 50_000,
            registry_capacity: 256,
        }
    }
}

/// `now + ttl_seconds`, saturating at the largest representable time
#[inline]
pub fn expiry_after(now: DateTime<Utc>, ttl_seconds: u64) -> DateTime<Utc> {
    let seconds = i64::try_from(ttl_seconds).unwrap_or(i64::MAX);
    Duration::try_seconds(seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// A usable cache reference returned to the router
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHandle {
    pub cache_id: String,
    pub token_count: usize,
    /// The entry already existed, so this use is billed at the cached rate
    pub reused: bool,
    pub usage_count: u64,
}

impl CacheHandle {
    fn from_entry(entry: &CacheEntry, reused: bool) -> Self {
        Self {
            cache_id: entry.external_cache_id.clone(),
            token_count: entry.token_count,
            reused,
            usage_count: entry.usage_count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub capacity: usize,
    pub total_cached_tokens: usize,
    pub total_usage: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub most_used_key: Option<String>,
    pub most_used_count: u64,
    pub expiring_soon: usize,
    pub estimated_monthly_savings: f64,
}

/// Registry of external cache resources keyed by content key
///
/// Expired entries are never handed out: lookups drop them first and release the
/// external resource on a best-effort basis. Every registry change is written
/// through to the key-value store.
pub struct CacheManager {
    registry: Mutex<CacheRegistry>,
    backend: Arc<dyn CacheBackend>,
    store: Arc<dyn KeyValueStore>,
    config: CacheConfig,
    pricing: PricingConfig,
}

impl CacheManager {
    /// Reload the persisted registry, dropping entries that expired while offline
    #[inline]
    pub async fn load(
        backend: Arc<dyn CacheBackend>,
        store: Arc<dyn KeyValueStore>,
        config: CacheConfig,
        pricing: PricingConfig,
    ) -> Result<Self> {
        let persisted: Vec<CacheEntry> = load_json(store.as_ref(), REGISTRY_KEY)
            .await
            .context("Failed to load cache registry")?
            .unwrap_or_default();

        let now = Utc::now();
        let total = persisted.len();
        let mut registry = CacheRegistry::new(config.registry_capacity);
        let mut stale = Vec::new();

        for entry in persisted {
            if entry.is_expired(now) {
                stale.push(entry);
            } else if let Some(evicted) = registry.insert(entry) {
                stale.push(evicted);
            }
        }

        let manager = Self {
            registry: Mutex::new(registry),
            backend,
            store,
            config,
            pricing,
        };

        if !stale.is_empty() {
            manager.release_all(&stale).await;
            let registry = manager.registry.lock().await;
            manager.persist(&registry).await?;
        }

        info!(
            "Loaded cache registry: {} live entries, {} stale dropped",
            total - stale.len(),
            stale.len()
        );
        Ok(manager)
    }

    #[inline]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the live cache for `key`, or create one from `builder`
    ///
    /// `Ok(None)` means the caller must send the content inline: either it is
    /// below the minimum cacheable size or the external creation failed. Errors
    /// are reserved for registry persistence failures; on error no entry is kept.
    #[inline]
    pub async fn get_or_create<F>(
        &self,
        key: &str,
        builder: F,
        ttl_seconds: u64,
    ) -> Result<Option<CacheHandle>>
    where
        F: FnOnce() -> String + Send,
    {
        let now = Utc::now();
        let mut registry = self.registry.lock().await;

        let stale = registry.remove_if_expired(key, now);
        if let Some(entry) = &stale {
            debug!("Cache entry {} expired at {}", key, entry.expires_at);
            self.release(entry).await;
        }

        if let Some(entry) = registry.touch(key, now) {
            debug!("Cache hit for {} (used {} times)", key, entry.usage_count);
            if let Err(e) = self.persist(&registry).await {
                warn!("Failed to persist cache usage for {}: {:#}", key, e);
            }
            return Ok(Some(CacheHandle::from_entry(&entry, true)));
        }

        let content = builder();
        let token_count = estimate_tokens(&content);
        if token_count < self.config.min_tokens {
            debug!(
                "Not caching {}: {} tokens is below the {} token minimum",
                key, token_count, self.config.min_tokens
            );
            if stale.is_some() {
                self.persist(&registry).await?;
            }
            return Ok(None);
        }

        let ttl_seconds = ttl_seconds.min(self.config.max_ttl_seconds);
        let cache_id = match self.backend.create(&content, ttl_seconds).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Cache creation failed for {}: {:#}", key, e);
                if stale.is_some() {
                    self.persist(&registry).await?;
                }
                return Ok(None);
            }
        };

        let entry = CacheEntry {
            cache_key: key.to_string(),
            external_cache_id: cache_id,
            created_at: now,
            expires_at: expiry_after(now, ttl_seconds),
            token_count,
            usage_count: 1,
            last_used: now,
        };
        let handle = CacheHandle::from_entry(&entry, false);

        if let Some(evicted) = registry.insert(entry) {
            debug!("Registry full, evicted least recently used {}", evicted.cache_key);
            self.release(&evicted).await;
        }

        if let Err(e) = self.persist(&registry).await {
            if let Some(entry) = registry.remove(key) {
                self.release(&entry).await;
            }
            return Err(e);
        }

        info!(
            "Created cache {} for {} ({} tokens, ttl {}s)",
            handle.cache_id, key, token_count, ttl_seconds
        );
        Ok(Some(handle))
    }

    /// Live entry for `key`, without recording a use
    #[inline]
    pub async fn entry(&self, key: &str) -> Option<CacheEntry> {
        let registry = self.registry.lock().await;
        registry
            .peek(key)
            .filter(|entry| !entry.is_expired(Utc::now()))
            .cloned()
    }

    /// Drop `key` if it has expired; returns whether an entry was dropped
    #[inline]
    pub async fn expire(&self, key: &str) -> Result<bool> {
        let mut registry = self.registry.lock().await;
        let Some(entry) = registry.remove_if_expired(key, Utc::now()) else {
            return Ok(false);
        };

        self.release(&entry).await;
        self.persist(&registry).await?;
        info!("Expired cache entry {}", key);
        Ok(true)
    }

    /// Drop every expired entry; returns how many were dropped
    #[inline]
    pub async fn sweep(&self) -> Result<usize> {
        let mut registry = self.registry.lock().await;
        let expired = registry.drain_expired(Utc::now());
        if expired.is_empty() {
            return Ok(0);
        }

        self.release_all(&expired).await;
        self.persist(&registry).await?;

        info!("Swept {} expired cache entries", expired.len());
        Ok(expired.len())
    }

    /// Remove `key` regardless of expiry
    #[inline]
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let mut registry = self.registry.lock().await;
        let Some(entry) = registry.remove(key) else {
            return Ok(false);
        };

        self.release(&entry).await;
        self.persist(&registry).await?;
        Ok(true)
    }

    /// Push a live entry's expiry to `additional_seconds` past its current expiry
    ///
    /// The new expiry is capped at the maximum TTL from now. Returns `false` when
    /// there is no live entry or the provider refused the extension.
    #[inline]
    pub async fn extend_ttl(&self, key: &str, additional_seconds: u64) -> Result<bool> {
        let now = Utc::now();
        let mut registry = self.registry.lock().await;

        let Some(entry) = registry.peek(key).filter(|e| !e.is_expired(now)).cloned() else {
            return Ok(false);
        };

        let requested = expiry_after(entry.expires_at, additional_seconds);
        let new_expiry = requested.min(expiry_after(now, self.config.max_ttl_seconds));
        let ttl_seconds = u64::try_from((new_expiry - now).num_seconds()).unwrap_or(0);

        if let Err(e) = self.backend.extend(&entry.external_cache_id, ttl_seconds).await {
            warn!("Failed to extend cache {}: {:#}", entry.external_cache_id, e);
            return Ok(false);
        }

        registry.insert(CacheEntry {
            expires_at: new_expiry,
            ..entry
        });
        self.persist(&registry).await?;

        debug!("Extended cache {} until {}", key, new_expiry);
        Ok(true)
    }

    #[inline]
    pub async fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let soon = now + Duration::seconds(EXPIRING_SOON_SECONDS);
        let registry = self.registry.lock().await;

        let mut stats = CacheStats {
            capacity: registry.capacity(),
            ..CacheStats::default()
        };

        for entry in registry.iter().filter(|e| !e.is_expired(now)) {
            stats.total_entries += 1;
            stats.total_cached_tokens += entry.token_count;
            stats.total_usage += entry.usage_count;

            if stats.oldest_entry.is_none_or(|oldest| entry.created_at < oldest) {
                stats.oldest_entry = Some(entry.created_at);
            }
            if entry.usage_count > stats.most_used_count {
                stats.most_used_count = entry.usage_count;
                stats.most_used_key = Some(entry.cache_key.clone());
            }
            if entry.expires_at <= soon {
                stats.expiring_soon += 1;
            }
        }

        // Daily reuse at the cached discount, over a 30 day month
        let discount_per_million =
            self.pricing.input_per_million - self.pricing.cached_input_per_million;
        stats.estimated_monthly_savings = stats.total_cached_tokens as f64 / 1_000_000.0
            * discount_per_million
            * stats.total_usage as f64
            * 30.0;

        stats
    }

    /// Whether caching `token_count` tokens pays off over `expected_usage` uses
    #[inline]
    pub fn should_cache(&self, token_count: usize, expected_usage: u32) -> bool {
        if token_count < self.config.min_tokens || expected_usage == 0 {
            return false;
        }

        let millions = token_count as f64 / 1_000_000.0;
        let uses = f64::from(expected_usage);
        let normal_cost = millions * self.pricing.input_per_million * uses;
        let cached_cost = millions * self.pricing.input_per_million
            + millions * self.pricing.cached_input_per_million * (uses - 1.0)
            + millions * self.pricing.storage_per_million_hour / 3600.0;

        cached_cost < normal_cost
    }

    /// Suggested TTL for a video of `video_seconds` and a query type
    #[inline]
    pub fn optimal_ttl(&self, video_seconds: f64, query_type: QueryType) -> u64 {
        let ttl = if video_seconds > 10_800.0 {
            7200
        } else if video_seconds > 3600.0 {
            3600
        } else if query_type == QueryType::Summary {
            1800
        } else {
            900
        };
        ttl.min(self.config.max_ttl_seconds)
    }

    async fn release(&self, entry: &CacheEntry) {
        if let Err(e) = self.backend.delete(&entry.external_cache_id).await {
            warn!(
                "Failed to release external cache {} for {}: {:#}",
                entry.external_cache_id, entry.cache_key, e
            );
        }
    }

    async fn release_all(&self, entries: &[CacheEntry]) {
        join_all(entries.iter().map(|entry| self.release(entry))).await;
    }

    async fn persist(&self, registry: &CacheRegistry) -> Result<()> {
        save_json(self.store.as_ref(), REGISTRY_KEY, &registry.snapshot())
            .await
            .context("Failed to persist cache registry")
    }
}
