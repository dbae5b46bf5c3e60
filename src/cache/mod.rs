//! Cache module for memoizing API responses in memory
//!
//! This module provides the process-wide `CacheStore` with per-entry TTL, an
//! owned background task that evicts expired entries, and a read-only stats
//! collector. Nothing here is persisted; the cache only lives as long as the
//! `ApiClient` that owns it.

mod stats;
mod store;
mod sweeper;

pub use stats::{CacheStats, RequestCounters, RequestStats, StatsCollector};
pub use store::{CacheEntry, CacheStore};
pub use sweeper::{EvictionTask, DEFAULT_SWEEP_INTERVAL};
