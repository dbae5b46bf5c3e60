//! In-memory request cache keyed by endpoint
//!
//! The store is pure memoization: it never persists anything and knows
//! nothing about staleness. Callers decide what an entry's age means.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::sync::lock;

/// One cached response
///
/// Entries are never edited in place; a write replaces the whole entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Key the entry is stored under (usually the endpoint path)
    pub key: String,
    /// Decoded response payload
    pub data: Arc<Value>,
    /// Monotonic instant the entry was stored, used for all age checks
    pub timestamp: Instant,
    /// Wall-clock time the entry was stored, for display
    pub stored_at: DateTime<Utc>,
    /// Age after which the entry is expired
    pub ttl: Duration,
}

impl CacheEntry {
    /// Time elapsed since the entry was stored
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.timestamp)
    }

    /// Whether the entry may still be served without a refetch
    pub fn is_valid(&self) -> bool {
        self.age() < self.ttl
    }

    /// Whether the entry is old enough to warrant a background refresh
    ///
    /// Independent of validity: an entry can be both valid and stale.
    pub fn is_stale(&self, stale_time: Duration) -> bool {
        self.age() > stale_time
    }
}

/// Process-wide mapping from key to cached response
///
/// Shared behind an `Arc` by every query, mutation and batch created from the
/// same `ApiClient`. The lock is only held for map operations, never across
/// an `.await`, so each operation is atomic from every caller's view.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `key` whether or not it has expired
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        lock(&self.entries, "cache.store").get(key).cloned()
    }

    /// Returns the entry for `key` only while it is still within its TTL
    ///
    /// An expired entry found here is dropped on the spot.
    pub fn get_valid(&self, key: &str) -> Option<CacheEntry> {
        let mut entries = lock(&self.entries, "cache.store");
        match entries.get(key) {
            Some(entry) if entry.is_valid() => Some(entry.clone()),
            Some(_) => {
                debug!(key, "Dropping expired cache entry on read");
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores `data` under `key`, replacing any previous entry
    pub fn set(&self, key: &str, data: impl Into<Arc<Value>>, ttl: Duration) {
        let entry = CacheEntry {
            key: key.to_string(),
            data: data.into(),
            timestamp: Instant::now(),
            stored_at: Utc::now(),
            ttl,
        };
        lock(&self.entries, "cache.store").insert(key.to_string(), entry);
    }

    /// Removes the entry for `key`, returning whether one existed
    pub fn delete(&self, key: &str) -> bool {
        lock(&self.entries, "cache.store").remove(key).is_some()
    }

    /// Removes every entry
    pub fn clear(&self) {
        lock(&self.entries, "cache.store").clear();
    }

    /// Removes all expired entries and returns how many were dropped
    pub fn sweep_expired(&self) -> usize {
        let mut entries = lock(&self.entries, "cache.store");
        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid());
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries, "cache.store").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies out every entry, expired ones included
    pub fn entries(&self) -> Vec<CacheEntry> {
        lock(&self.entries, "cache.store").values().cloned().collect()
    }
}
