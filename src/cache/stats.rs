//! Read-only cache health metrics for an external performance monitor

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::CacheStore;

/// Snapshot of entry validity and payload size
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub total_entries: usize,
    /// Serialized size of every cached payload, rounded to whole KB
    pub total_size: u64,
    /// Percentage of entries still within their TTL, in `[0, 100]`
    pub hit_rate: f64,
    /// Wall-clock time of the most recent write, if anything is cached
    pub last_updated: Option<DateTime<Utc>>,
}

/// Rolling request counters used as an approximate hit-rate proxy
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStats {
    /// Every read that went through the fetch controller
    pub total_requests: u64,
    /// Reads that actually went out over the network
    pub network_requests: u64,
    /// Reads answered from a valid cache entry
    pub cache_hits: u64,
    /// Keys currently held in the cache
    pub distinct_keys: usize,
    /// `100 * (1 - distinct_keys / total_requests)`, clamped to `[0, 100]`
    pub approx_hit_rate: f64,
}

/// Counters bumped by the fetch controller on every read
#[derive(Debug, Default)]
pub struct RequestCounters {
    total: AtomicU64,
    network: AtomicU64,
    hits: AtomicU64,
}

impl RequestCounters {
    pub fn record_request(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_network(&self) {
        self.network.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.total.store(0, Ordering::Relaxed);
        self.network.store(0, Ordering::Relaxed);
        self.hits.store(0, Ordering::Relaxed);
    }
}

/// Derives `CacheStats` and `RequestStats` without touching the cache
#[derive(Debug, Clone)]
pub struct StatsCollector {
    store: Arc<CacheStore>,
    counters: Arc<RequestCounters>,
}

impl StatsCollector {
    pub fn new(store: Arc<CacheStore>, counters: Arc<RequestCounters>) -> Self {
        Self { store, counters }
    }

    pub fn cache_stats(&self) -> CacheStats {
        let entries = self.store.entries();
        let total_entries = entries.len();
        let valid_entries = entries.iter().filter(|e| e.is_valid()).count();
        let expired_entries = total_entries - valid_entries;

        let total_bytes: usize = entries
            .iter()
            .map(|e| serde_json::to_string(&*e.data).map(|s| s.len()).unwrap_or(0))
            .sum();

        CacheStats {
            valid_entries,
            expired_entries,
            total_entries,
            total_size: (total_bytes as f64 / 1024.0).round() as u64,
            hit_rate: percentage(valid_entries as f64, total_entries as f64),
            last_updated: entries.iter().map(|e| e.stored_at).max(),
        }
    }

    pub fn request_stats(&self) -> RequestStats {
        let total_requests = self.counters.total.load(Ordering::Relaxed);
        let distinct_keys = self.store.len();

        let approx_hit_rate = if total_requests == 0 {
            0.0
        } else {
            (100.0 * (1.0 - distinct_keys as f64 / total_requests as f64)).clamp(0.0, 100.0)
        };

        RequestStats {
            total_requests,
            network_requests: self.counters.network.load(Ordering::Relaxed),
            cache_hits: self.counters.hits.load(Ordering::Relaxed),
            distinct_keys,
            approx_hit_rate,
        }
    }
}

/// `part / whole` as a percentage, `0` when `whole` is zero
fn percentage(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        return 0.0;
    }
    (100.0 * part / whole).clamp(0.0, 100.0)
}
