use std::num::NonZeroUsize;

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};

/// One externally hosted cached-content resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cache_key: String,
    pub external_cache_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub token_count: usize,
    pub usage_count: u64,
    pub last_used: DateTime<Utc>,
}

impl CacheEntry {
    #[inline]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Capacity-bounded cache registry with least-recently-used eviction
///
/// Holds at most `capacity` entries. Inserting past capacity evicts the entry
/// whose last lookup or insertion is oldest.
#[derive(Debug)]
pub struct CacheRegistry {
    entries: LruCache<String, CacheEntry>,
}

impl CacheRegistry {
    #[inline]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Entry for `key` without touching recency
    #[inline]
    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.peek(key)
    }

    /// Record a use of a live entry, returning the updated entry
    #[inline]
    pub fn touch(&mut self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let entry = self.entries.get_mut(key)?;
        if entry.is_expired(now) {
            return None;
        }
        entry.usage_count += 1;
        entry.last_used = now;
        Some(entry.clone())
    }

    /// Insert or replace an entry; returns the entry evicted to make room, if any
    #[inline]
    pub fn insert(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        let key = entry.cache_key.clone();
        match self.entries.push(key.clone(), entry) {
            Some((evicted_key, evicted)) if evicted_key != key => Some(evicted),
            _ => None,
        }
    }

    #[inline]
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        self.entries.pop(key)
    }

    /// Remove `key` only if it has expired
    #[inline]
    pub fn remove_if_expired(&mut self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let expired = self.entries.peek(key).is_some_and(|e| e.is_expired(now));
        if expired { self.entries.pop(key) } else { None }
    }

    /// Remove and return every expired entry
    #[inline]
    pub fn drain_expired(&mut self, now: DateTime<Utc>) -> Vec<CacheEntry> {
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        expired_keys
            .iter()
            .filter_map(|key| self.entries.pop(key))
            .collect()
    }

    /// Entries from least to most recently used
    #[inline]
    pub fn snapshot(&self) -> Vec<CacheEntry> {
        self.entries.iter().rev().map(|(_, entry)| entry.clone()).collect()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.iter().map(|(_, entry)| entry)
    }
}
