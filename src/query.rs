//! Per-consumer read path bound to one endpoint
//!
//! A `Query` is what a screen or widget holds for as long as it shows a piece
//! of remote data. It serves cached data when it can, exposes loading, error
//! and staleness state, and optionally refetches on a fixed interval while it
//! is active.

use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::config::QueryOptions;
use crate::error::FetchError;
use crate::fetch::{FetchController, Revalidation};
use crate::sync::lock;

/// Snapshot of a query as a consumer would render it
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    /// Last successfully decoded payload; kept when a later fetch fails
    pub data: Option<T>,
    pub loading: bool,
    /// Message of the last failed foreground fetch
    pub error: Option<String>,
    /// When the data currently shown was stored
    pub last_fetch: Option<Instant>,
    /// `last_fetch` is set and older than the query's stale time
    pub is_stale: bool,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
            last_fetch: None,
            is_stale: false,
        }
    }
}

/// Everything a load needs, cloned into the refetch task
struct Binding<T> {
    endpoint: String,
    key: String,
    options: QueryOptions,
    fetcher: FetchController,
    state: Arc<Mutex<QueryState<T>>>,
    /// Loads still running; only changed under the `state` lock
    pending: Arc<AtomicUsize>,
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            key: self.key.clone(),
            options: self.options.clone(),
            fetcher: self.fetcher.clone(),
            state: self.state.clone(),
            pending: self.pending.clone(),
        }
    }
}

/// Keeps `loading` set while at least one load is alive
struct LoadGuard<'a, T> {
    binding: &'a Binding<T>,
}

impl<'a, T> LoadGuard<'a, T> {
    fn enter(binding: &'a Binding<T>) -> Self {
        let mut state = lock(&binding.state, "query.state");
        binding.pending.fetch_add(1, Ordering::SeqCst);
        state.loading = true;
        Self { binding }
    }
}

impl<T> Drop for LoadGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = lock(&self.binding.state, "query.state");
        let left = self.binding.pending.fetch_sub(1, Ordering::SeqCst) - 1;
        state.loading = left > 0;
    }
}

impl<T> Binding<T>
where
    T: DeserializeOwned + Clone + Send + 'static,
{
    async fn load(&self, force: bool, cancel: &CancelToken) -> Result<T, FetchError> {
        let loading = LoadGuard::enter(self);

        let result = self
            .fetcher
            .fetch_revalidating(&self.key, &self.endpoint, &self.options, force, cancel)
            .await
            .and_then(|(fetched, refresh)| {
                let data = T::deserialize(&*fetched.data)?;
                Ok((data, fetched.fetched_at, refresh))
            });

        let result = match result {
            Ok((data, fetched_at, refresh)) => {
                self.commit(data.clone(), fetched_at);
                if let Some(refresh) = refresh {
                    self.follow(refresh, cancel.clone());
                }
                Ok(data)
            }
            Err(FetchError::Cancelled) => Err(FetchError::Cancelled),
            Err(err) => {
                lock(&self.state, "query.state").error = Some(err.to_string());
                Err(err)
            }
        };
        drop(loading);
        result
    }

    fn commit(&self, data: T, fetched_at: Instant) {
        let mut state = lock(&self.state, "query.state");
        state.data = Some(data);
        state.error = None;
        state.last_fetch = Some(fetched_at);
    }

    /// Applies a background refresh once it lands, unless the query was
    /// cancelled first
    ///
    /// A failed refresh is logged and leaves the shown data alone.
    fn follow(&self, refresh: Revalidation, cancel: CancelToken) {
        let binding = self.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                result = refresh.finish() => result,
                _ = cancel.cancelled() => return,
            };
            let decoded = result.and_then(|fetched| {
                let data = T::deserialize(&*fetched.data)?;
                Ok((data, fetched.fetched_at))
            });
            match decoded {
                Ok((data, fetched_at)) => {
                    debug!(key = %binding.key, "Applied background refresh");
                    binding.commit(data, fetched_at);
                }
                Err(err) => {
                    warn!(key = %binding.key, error = %err, "Background refresh failed");
                }
            }
        });
    }
}

/// A read bound to one endpoint for the lifetime of its consumer
///
/// Dropping the query (or calling `deactivate`) stops its refetch timer and
/// cancels any fetch it is still running.
pub struct Query<T> {
    binding: Binding<T>,
    cancel: Mutex<CancelToken>,
    refetch_task: Mutex<Option<JoinHandle<()>>>,
}

impl<T> std::fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("endpoint", &self.binding.endpoint)
            .field("key", &self.binding.key)
            .field("options", &self.binding.options)
            .finish_non_exhaustive()
    }
}

impl<T> Query<T>
where
    T: DeserializeOwned + Clone + Send + 'static,
{
    pub fn new(
        endpoint: impl Into<String>,
        fetcher: FetchController,
        options: QueryOptions,
    ) -> Self {
        let endpoint = endpoint.into();
        Self {
            binding: Binding {
                key: options.key_for(&endpoint),
                endpoint,
                options,
                fetcher,
                state: Arc::new(Mutex::new(QueryState::default())),
                pending: Arc::new(AtomicUsize::new(0)),
            },
            cancel: Mutex::new(CancelToken::new()),
            refetch_task: Mutex::new(None),
        }
    }

    /// Performs the first (cache-respecting) load and starts auto-refetch
    ///
    /// Calling it again while active only repeats the cache-respecting load.
    pub async fn activate(&self) -> Result<T, FetchError> {
        let cancel = {
            let mut cancel = lock(&self.cancel, "query.cancel");
            if cancel.is_cancelled() {
                *cancel = CancelToken::new();
            }
            cancel.clone()
        };

        if let Some(period) = self.binding.options.refetch_interval {
            let mut task = lock(&self.refetch_task, "query.task");
            if task.is_none() {
                *task = Some(self.spawn_refetch(period, cancel.clone()));
            }
        }

        self.binding.load(false, &cancel).await
    }

    /// Fetches from the network, ignoring any cached entry
    pub async fn refetch(&self) -> Result<T, FetchError> {
        let cancel = self.cancel_token();
        self.binding.load(true, &cancel).await
    }

    /// Drops this query's cache entry without fetching
    pub fn invalidate_cache(&self) -> bool {
        self.binding.fetcher.invalidate(&self.binding.key)
    }

    /// Stops auto-refetch and cancels anything in flight
    pub fn deactivate(&self) {
        lock(&self.cancel, "query.cancel").cancel();
        if let Some(task) = lock(&self.refetch_task, "query.task").take() {
            task.abort();
        }
        debug!(key = %self.binding.key, "Query deactivated");
    }

    pub fn is_refetching_automatically(&self) -> bool {
        lock(&self.refetch_task, "query.task")
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Current state with `is_stale` evaluated against the clock now
    pub fn state(&self) -> QueryState<T> {
        let mut state = lock(&self.binding.state, "query.state").clone();
        state.is_stale = state
            .last_fetch
            .is_some_and(|at| at.elapsed() > self.binding.options.stale_time);
        state
    }

    pub fn data(&self) -> Option<T> {
        lock(&self.binding.state, "query.state").data.clone()
    }

    pub fn key(&self) -> &str {
        &self.binding.key
    }

    fn cancel_token(&self) -> CancelToken {
        lock(&self.cancel, "query.cancel").clone()
    }

    fn spawn_refetch(&self, period: Duration, cancel: CancelToken) -> JoinHandle<()> {
        let binding = self.binding.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the first tick (immediate)
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!(key = %binding.key, "Auto-refetching");
                        if let Err(err) = binding.load(true, &cancel).await {
                            warn!(key = %binding.key, error = %err, "Auto-refetch failed");
                        }
                    }
                    _ = cancel.cancelled() => {
                        break;
                    }
                }
            }
        })
    }
}

impl<T> Drop for Query<T> {
    fn drop(&mut self) {
        lock(&self.cancel, "query.cancel").cancel();
        if let Some(task) = lock(&self.refetch_task, "query.task").take() {
            task.abort();
        }
    }
}
