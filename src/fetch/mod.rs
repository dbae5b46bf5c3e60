//! Authenticated reads with retry, caching and stale-while-revalidate
//!
//! `FetchController` is the only component that turns a cache miss into a
//! network call. Cache-respecting reads of the same key share one in-flight
//! request; forced reads always go to the network.

mod retry;

pub use retry::RetryPolicy;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::auth::CredentialStore;
use crate::cache::{CacheStore, RequestCounters};
use crate::cancel::CancelToken;
use crate::config::{ClientConfig, QueryOptions};
use crate::error::FetchError;
use crate::sync::lock;
use crate::transport::{HttpRequest, Method, Transport};

/// A successful read and where it came from
#[derive(Debug, Clone)]
pub struct Fetched {
    pub data: Arc<Value>,
    /// When the payload was stored in the cache
    pub fetched_at: Instant,
    /// Whether the payload was served from a valid cache entry
    pub from_cache: bool,
}

type SharedFetch = Shared<BoxFuture<'static, Result<Fetched, FetchError>>>;

/// A background refresh of a stale entry
///
/// The refresh runs on its own task whether or not anyone waits on it.
#[derive(Clone)]
pub struct Revalidation(SharedFetch);

impl Revalidation {
    /// Waits for the refreshed payload
    pub async fn finish(self) -> Result<Fetched, FetchError> {
        self.0.await
    }
}

impl std::fmt::Debug for Revalidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Revalidation").finish_non_exhaustive()
    }
}

struct Inner {
    store: Arc<CacheStore>,
    transport: Arc<dyn Transport>,
    credentials: CredentialStore,
    config: ClientConfig,
    counters: Arc<RequestCounters>,
    inflight: Mutex<HashMap<String, SharedFetch>>,
    /// Cancels shared and background fetches when the client shuts down
    shutdown: CancelToken,
}

/// Performs reads against the backend and writes results into the cache
#[derive(Clone)]
pub struct FetchController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for FetchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchController")
            .field("base_url", &self.inner.config.base_url)
            .field("cached", &self.inner.store.len())
            .field("inflight", &self.inflight_count())
            .finish_non_exhaustive()
    }
}

impl FetchController {
    pub fn new(
        store: Arc<CacheStore>,
        transport: Arc<dyn Transport>,
        credentials: CredentialStore,
        config: ClientConfig,
        counters: Arc<RequestCounters>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                transport,
                credentials,
                config,
                counters,
                inflight: Mutex::new(HashMap::new()),
                shutdown: CancelToken::new(),
            }),
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.inner.store
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Number of de-duplicated reads currently on the wire
    pub fn inflight_count(&self) -> usize {
        lock(&self.inner.inflight, "fetch.inflight").len()
    }

    /// Reads `endpoint` through the cache entry `key`
    ///
    /// Without `force`, a valid entry is returned immediately; if it is also
    /// stale, a background refresh is started and not awaited. A miss joins
    /// any in-flight read of the same key. With `force`, the cache is skipped
    /// and a fresh request is always issued.
    ///
    /// # Returns
    /// * `Ok(Fetched)` - the payload, from cache or network
    /// * `Err(FetchError)` - the last attempt's error once retries are exhausted,
    ///   or `Cancelled` if `cancel` fired first
    pub async fn fetch_and_cache(
        &self,
        key: &str,
        endpoint: &str,
        options: &QueryOptions,
        force: bool,
        cancel: &CancelToken,
    ) -> Result<Fetched, FetchError> {
        let (fetched, _refresh) = self
            .fetch_revalidating(key, endpoint, options, force, cancel)
            .await?;
        Ok(fetched)
    }

    /// Like `fetch_and_cache`, but also hands back the background refresh
    /// started for a stale entry so the caller can pick up its result
    pub async fn fetch_revalidating(
        &self,
        key: &str,
        endpoint: &str,
        options: &QueryOptions,
        force: bool,
        cancel: &CancelToken,
    ) -> Result<(Fetched, Option<Revalidation>), FetchError> {
        self.inner.counters.record_request();

        if force {
            let fetched = self
                .fetch_with_retry(key, endpoint, &options.retry, options.cache_time, cancel)
                .await?;
            return Ok((fetched, None));
        }

        if let Some(entry) = self.inner.store.get_valid(key) {
            self.inner.counters.record_hit();
            let refresh = if entry.is_stale(options.stale_time) {
                debug!(
                    key,
                    age_ms = entry.age().as_millis() as u64,
                    "Serving stale entry, refreshing in background"
                );
                Some(Revalidation(self.shared_fetch(key, endpoint, options)))
            } else {
                debug!(key, "Cache hit");
                None
            };
            let fetched = Fetched {
                data: entry.data,
                fetched_at: entry.timestamp,
                from_cache: true,
            };
            return Ok((fetched, refresh));
        }

        debug!(key, "Cache miss");
        let shared = self.shared_fetch(key, endpoint, options);
        tokio::select! {
            result = shared => result.map(|fetched| (fetched, None)),
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
        }
    }

    /// Drops the cache entry for `key` without fetching
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.inner.store.delete(key);
        debug!(key, removed, "Invalidated cache entry");
        removed
    }

    /// Sends one request without retry and decodes its JSON body
    ///
    /// An empty 2xx body decodes to `Value::Null`.
    pub async fn request_json(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<String>,
    ) -> Result<Value, FetchError> {
        let url = self.inner.config.resolve_url(endpoint);
        let request = HttpRequest {
            method,
            url,
            bearer: self.inner.credentials.token(),
            body,
        };

        let body = self.inner.transport.send(request).await?.into_body()?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Cancels shared and background reads that are still running
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        lock(&self.inner.inflight, "fetch.inflight").clear();
    }

    /// Returns the in-flight read for `key`, starting one if there is none
    fn shared_fetch(&self, key: &str, endpoint: &str, options: &QueryOptions) -> SharedFetch {
        let mut inflight = lock(&self.inner.inflight, "fetch.inflight");
        if let Some(existing) = inflight.get(key) {
            debug!(key, "Joining in-flight request");
            return existing.clone();
        }

        let this = self.clone();
        let task_key = key.to_string();
        let endpoint = endpoint.to_string();
        let retry = options.retry.clone();
        let cache_time = options.cache_time;

        // The inflight lock is held until the entry is inserted, so the task
        // cannot remove its own entry before it exists.
        let handle = tokio::spawn(async move {
            let shutdown = this.inner.shutdown.clone();
            let result = this
                .fetch_with_retry(&task_key, &endpoint, &retry, cache_time, &shutdown)
                .await;
            lock(&this.inner.inflight, "fetch.inflight").remove(&task_key);
            result
        });

        let shared = async move {
            handle.await.unwrap_or_else(|err| {
                Err(FetchError::Network(format!("fetch task failed: {}", err)))
            })
        }
        .boxed()
        .shared();

        inflight.insert(key.to_string(), shared.clone());
        shared
    }

    /// Issues GETs until one succeeds or the retry policy gives up
    async fn fetch_with_retry(
        &self,
        key: &str,
        endpoint: &str,
        retry: &RetryPolicy,
        cache_time: Duration,
        cancel: &CancelToken,
    ) -> Result<Fetched, FetchError> {
        let mut attempt = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            self.inner.counters.record_network();
            match self.request_json(Method::Get, endpoint, None).await {
                Ok(data) => {
                    if cancel.is_cancelled() {
                        debug!(key, "Discarding response for cancelled fetch");
                        return Err(FetchError::Cancelled);
                    }
                    let data = Arc::new(data);
                    self.inner.store.set(key, data.clone(), cache_time);
                    info!(key, endpoint, attempt, "Fetched and cached");
                    return Ok(Fetched {
                        data,
                        fetched_at: Instant::now(),
                        from_cache: false,
                    });
                }
                Err(err) if retry.should_retry(&err, attempt) => {
                    let delay = retry.delay_after(attempt);
                    warn!(
                        key,
                        endpoint,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Fetch failed, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                    }
                    attempt += 1;
                }
                Err(err) => {
                    warn!(key, endpoint, attempt, error = %err, "Fetch failed");
                    return Err(err);
                }
            }
        }
    }
}
