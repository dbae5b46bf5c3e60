//! fetchcache library
//!
//! A client-side data-fetch layer: an in-memory request cache with TTL and
//! staleness, retrying reads with stale-while-revalidate, single-attempt
//! mutations with optimistic updates, and batch reads with isolated failures.
//!
//! Everything hangs off one [`ApiClient`] created at startup:
//!
//! ```rust,ignore
//! let client = ApiClient::new(ClientConfig::default(), CredentialStore::fixed(None))?;
//! let stats: Query<serde_json::Value> = client.query("/api/stats", QueryOptions::default());
//! let value = stats.activate().await?;
//! println!("{:?}", client.cache_stats());
//! ```

pub mod auth;
pub mod batch;
pub mod cache;
pub mod cancel;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
pub mod mutation;
pub mod query;
pub mod transport;

mod sync;
#[cfg(test)]
mod testing;

pub use auth::CredentialStore;
pub use batch::{BatchFetcher, BatchItem, BatchOutcome, BatchState};
pub use cache::{CacheEntry, CacheStats, CacheStore, RequestStats};
pub use cancel::CancelToken;
pub use client::ApiClient;
pub use config::{ClientConfig, QueryOptions};
pub use error::FetchError;
pub use fetch::{FetchController, Fetched, RetryPolicy, Revalidation};
pub use mutation::{Mutation, MutationOptions, MutationState};
pub use query::{Query, QueryState};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, Transport};
