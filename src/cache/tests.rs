use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;

use super::*;
use crate::storage::MemoryStore;

#[derive(Default)]
struct RecordingBackend {
    created: AtomicUsize,
    deleted: StdMutex<Vec<String>>,
    fail_create: AtomicBool,
    fail_extend: AtomicBool,
}

impl RecordingBackend {
    fn deleted(&self) -> Vec<String> {
        self.deleted.lock().expect("should lock deleted list").clone()
    }
}

#[async_trait]
impl CacheBackend for RecordingBackend {
    async fn create(&self, _content: &str, _ttl_seconds: u64) -> Result<String> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(anyhow!("quota exceeded"));
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("cachedContents/{}", n))
    }

    async fn extend(&self, _cache_id: &str, _ttl_seconds: u64) -> Result<()> {
        if self.fail_extend.load(Ordering::SeqCst) {
            return Err(anyhow!("not found"));
        }
        Ok(())
    }

    async fn delete(&self, cache_id: &str) -> Result<()> {
        self.deleted
            .lock()
            .expect("should lock deleted list")
            .push(cache_id.to_string());
        Ok(())
    }
}

/// Store whose writes can be switched off
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("disk full"));
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }
}

fn small_content_config() -> CacheConfig {
    CacheConfig {
        min_tokens: 10,
        ..CacheConfig::default()
    }
}

fn content() -> String {
    "transcript words ".repeat(40)
}

async fn manager_with(
    backend: &Arc<RecordingBackend>,
    store: &Arc<FlakyStore>,
    config: CacheConfig,
) -> CacheManager {
    CacheManager::load(
        Arc::clone(backend) as Arc<dyn CacheBackend>,
        Arc::clone(store) as Arc<dyn KeyValueStore>,
        config,
        PricingConfig::default(),
    )
    .await
    .expect("should load cache manager")
}

async fn setup() -> (Arc<RecordingBackend>, Arc<FlakyStore>, CacheManager) {
    let backend = Arc::new(RecordingBackend::default());
    let store = Arc::new(FlakyStore::default());
    let manager = manager_with(&backend, &store, small_content_config()).await;
    (backend, store, manager)
}

/// Manager with an empty registry, for the pure cost and TTL helpers
fn unloaded_manager() -> CacheManager {
    let config = small_content_config();
    CacheManager {
        registry: Mutex::new(CacheRegistry::new(config.registry_capacity)),
        backend: Arc::new(RecordingBackend::default()),
        store: Arc::new(FlakyStore::default()),
        config,
        pricing: PricingConfig::default(),
    }
}

fn entry(key: &str, id: &str, expires_in_seconds: i64) -> CacheEntry {
    let now = Utc::now();
    CacheEntry {
        cache_key: key.to_string(),
        external_cache_id: id.to_string(),
        created_at: now - Duration::seconds(60),
        expires_at: now + Duration::seconds(expires_in_seconds),
        token_count: 500,
        usage_count: 3,
        last_used: now,
    }
}

#[tokio::test]
async fn get_or_create_is_idempotent() -> Result<()> {
    let (backend, _store, manager) = setup().await;

    let first = manager
        .get_or_create("video1", content, 3600)
        .await?
        .expect("should create cache");
    let second = manager
        .get_or_create("video1", || unreachable!("content must not be rebuilt"), 3600)
        .await?
        .expect("should hit cache");

    assert_eq!(first.cache_id, second.cache_id);
    assert!(!first.reused);
    assert!(second.reused);
    assert_eq!(second.usage_count, 2);
    assert_eq!(backend.created.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn small_content_is_not_cached() -> Result<()> {
    let (backend, _store, manager) = setup().await;

    let handle = manager
        .get_or_create("video1", || "tiny".to_string(), 3600)
        .await?;

    assert!(handle.is_none());
    assert!(manager.entry("video1").await.is_none());
    assert_eq!(backend.created.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn failed_creation_leaves_no_entry() -> Result<()> {
    let (backend, store, manager) = setup().await;
    backend.fail_create.store(true, Ordering::SeqCst);

    let handle = manager.get_or_create("video1", content, 3600).await?;

    assert!(handle.is_none());
    assert!(manager.entry("video1").await.is_none());
    assert!(store.inner.get(REGISTRY_KEY).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn expired_entry_behaves_like_cold_miss() -> Result<()> {
    let (backend, _store, manager) = setup().await;

    let first = manager
        .get_or_create("video1", content, 0)
        .await?
        .expect("should create cache");
    assert!(manager.entry("video1").await.is_none());

    let second = manager
        .get_or_create("video1", content, 3600)
        .await?
        .expect("should recreate cache");

    assert_ne!(first.cache_id, second.cache_id);
    assert!(!second.reused);
    assert_eq!(backend.created.load(Ordering::SeqCst), 2);
    assert_eq!(backend.deleted(), vec![first.cache_id]);
    Ok(())
}

#[tokio::test]
async fn ttl_is_capped() -> Result<()> {
    let backend = Arc::new(RecordingBackend::default());
    let store = Arc::new(FlakyStore::default());
    let config = CacheConfig {
        max_ttl_seconds: 100,
        ..small_content_config()
    };
    let manager = manager_with(&backend, &store, config).await;

    manager.get_or_create("video1", content, 86_400).await?;

    let entry = manager.entry("video1").await.expect("should have entry");
    assert!(entry.expires_at <= Utc::now() + Duration::seconds(100));
    Ok(())
}

#[tokio::test]
async fn reload_drops_stale_entries() -> Result<()> {
    let backend = Arc::new(RecordingBackend::default());
    let store = Arc::new(FlakyStore::default());
    save_json(
        store.as_ref(),
        REGISTRY_KEY,
        &vec![entry("old", "cachedContents/old", -10), entry("live", "cachedContents/live", 600)],
    )
    .await?;

    let manager = manager_with(&backend, &store, small_content_config()).await;

    assert!(manager.entry("old").await.is_none());
    let live = manager.entry("live").await.expect("live entry should survive");
    assert_eq!(live.usage_count, 3);
    assert_eq!(backend.deleted(), vec!["cachedContents/old".to_string()]);

    let persisted: Vec<CacheEntry> = load_json(store.as_ref(), REGISTRY_KEY)
        .await?
        .expect("registry should be persisted");
    assert_eq!(persisted.len(), 1);
    Ok(())
}

#[tokio::test]
async fn registry_survives_restart() -> Result<()> {
    let backend = Arc::new(RecordingBackend::default());
    let store = Arc::new(FlakyStore::default());
    let first = manager_with(&backend, &store, small_content_config()).await;
    let handle = first
        .get_or_create("video1", content, 3600)
        .await?
        .expect("should create cache");
    drop(first);

    let second = manager_with(&backend, &store, small_content_config()).await;
    let reused = second
        .get_or_create("video1", content, 3600)
        .await?
        .expect("should hit persisted cache");

    assert_eq!(reused.cache_id, handle.cache_id);
    assert!(reused.reused);
    assert_eq!(backend.created.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn capacity_evicts_least_recently_used() -> Result<()> {
    let backend = Arc::new(RecordingBackend::default());
    let store = Arc::new(FlakyStore::default());
    let config = CacheConfig {
        registry_capacity: 2,
        ..small_content_config()
    };
    let manager = manager_with(&backend, &store, config).await;

    manager.get_or_create("a", content, 3600).await?;
    let b = manager
        .get_or_create("b", content, 3600)
        .await?
        .expect("should create b");
    // Touch "a" so "b" becomes least recently used
    manager.get_or_create("a", content, 3600).await?;
    manager.get_or_create("c", content, 3600).await?;

    assert!(manager.entry("a").await.is_some());
    assert!(manager.entry("b").await.is_none());
    assert!(manager.entry("c").await.is_some());
    assert_eq!(backend.deleted(), vec![b.cache_id]);
    Ok(())
}

#[tokio::test]
async fn persistence_failure_rolls_back_creation() -> Result<()> {
    let (backend, store, manager) = setup().await;
    store.fail_writes.store(true, Ordering::SeqCst);

    let result = manager.get_or_create("video1", content, 3600).await;

    assert!(result.is_err());
    assert!(manager.entry("video1").await.is_none());
    assert_eq!(backend.deleted(), vec!["cachedContents/0".to_string()]);
    Ok(())
}

#[tokio::test]
async fn expire_and_sweep_only_drop_expired_entries() -> Result<()> {
    let (_backend, _store, manager) = setup().await;
    manager.get_or_create("short1", content, 0).await?;
    manager.get_or_create("short2", content, 0).await?;
    manager.get_or_create("long", content, 3600).await?;

    assert!(!manager.expire("long").await?);
    assert!(manager.expire("short1").await?);
    assert!(!manager.expire("short1").await?);

    assert_eq!(manager.sweep().await?, 1);
    assert_eq!(manager.sweep().await?, 0);
    assert!(manager.entry("long").await.is_some());
    Ok(())
}

#[tokio::test]
async fn delete_removes_live_entry() -> Result<()> {
    let (backend, _store, manager) = setup().await;
    let handle = manager
        .get_or_create("video1", content, 3600)
        .await?
        .expect("should create cache");

    assert!(manager.delete("video1").await?);
    assert!(!manager.delete("video1").await?);
    assert!(manager.entry("video1").await.is_none());
    assert_eq!(backend.deleted(), vec![handle.cache_id]);
    Ok(())
}

#[tokio::test]
async fn extend_ttl_moves_expiry() -> Result<()> {
    let (backend, _store, manager) = setup().await;
    manager.get_or_create("video1", content, 600).await?;
    let before = manager.entry("video1").await.expect("should have entry").expires_at;

    assert!(manager.extend_ttl("video1", 1200).await?);
    let after = manager.entry("video1").await.expect("should have entry").expires_at;
    assert!(after > before);

    backend.fail_extend.store(true, Ordering::SeqCst);
    assert!(!manager.extend_ttl("video1", 1200).await?);
    assert!(!manager.extend_ttl("missing", 1200).await?);
    Ok(())
}

#[tokio::test]
async fn stats_summarize_live_entries() -> Result<()> {
    let (_backend, _store, manager) = setup().await;
    manager.get_or_create("a", content, 3600).await?;
    manager.get_or_create("a", content, 3600).await?;
    manager.get_or_create("b", content, 300).await?;

    let stats = manager.stats().await;

    assert_eq!(stats.total_entries, 2);
    assert_eq!(stats.total_usage, 3);
    assert_eq!(stats.most_used_key.as_deref(), Some("a"));
    assert_eq!(stats.most_used_count, 2);
    assert_eq!(stats.expiring_soon, 1);
    assert_eq!(stats.total_cached_tokens, 2 * estimate_tokens(&content()));
    assert!(stats.oldest_entry.is_some());
    assert!(stats.estimated_monthly_savings > 0.0);
    Ok(())
}

#[test]
fn should_cache_compares_costs() {
    let manager = unloaded_manager();

    assert!(!manager.should_cache(5, 10));
    assert!(manager.should_cache(100_000, 2));
    assert!(!manager.should_cache(100_000, 1));
    assert!(!manager.should_cache(100_000, 0));
}

#[test]
fn optimal_ttl_scales_with_length() {
    let manager = unloaded_manager();

    assert_eq!(manager.optimal_ttl(14_400.0, QueryType::General), 7200);
    assert_eq!(manager.optimal_ttl(5400.0, QueryType::General), 3600);
    assert_eq!(manager.optimal_ttl(600.0, QueryType::Summary), 1800);
    assert_eq!(manager.optimal_ttl(600.0, QueryType::Specific), 900);
}

#[test]
fn registry_snapshot_is_lru_first() {
    let mut registry = CacheRegistry::new(3);
    registry.insert(entry("a", "1", 600));
    registry.insert(entry("b", "2", 600));
    registry.touch("a", Utc::now());

    let keys: Vec<String> = registry.snapshot().into_iter().map(|e| e.cache_key).collect();
    assert_eq!(keys, vec!["b".to_string(), "a".to_string()]);
}
