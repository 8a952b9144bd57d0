// Durable key-value storage
// The cache registry and the cost ledger persist their state through this trait


pub mod sqlite;

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;

pub use sqlite::SqliteStore;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

/// Read and deserialize a stored value
#[inline]
pub async fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(value) => {
            let parsed = serde_json::from_value(value)
                .with_context(|| format!("Failed to decode stored value for {}", key))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Serialize and store a value
#[inline]
pub async fn save_json<T: Serialize + Sync>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let encoded = serde_json::to_value(value)
        .with_context(|| format!("Failed to encode value for {}", key))?;
    store.set(key, encoded).await
}

/// Process-local store for tests and sessions that should leave nothing behind
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    #[inline]
    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    #[inline]
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    #[inline]
    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }

    #[inline]
    async fn remove(&self, key: &str) -> Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}
