//! The application-wide entry point
//!
//! An `ApiClient` owns one `CacheStore` and its eviction task, and hands out
//! queries, mutations and batch fetchers that all share that store. Create it
//! once at startup and pass it (or clones of what it hands out) to consumers.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::auth::CredentialStore;
use crate::batch::BatchFetcher;
use crate::cache::{
    CacheStats, CacheStore, EvictionTask, RequestCounters, RequestStats, StatsCollector,
};
use crate::config::{ClientConfig, QueryOptions};
use crate::error::FetchError;
use crate::fetch::FetchController;
use crate::mutation::{Mutation, MutationOptions};
use crate::query::Query;
use crate::sync::lock;
use crate::transport::{HttpTransport, Transport};

/// Shared cache plus factories for every consumer-facing handle
#[derive(Debug)]
pub struct ApiClient {
    fetcher: FetchController,
    stats: StatsCollector,
    sweeper: Mutex<Option<EvictionTask>>,
}

impl ApiClient {
    /// Creates a client that talks HTTP through `reqwest`
    ///
    /// Must be called from within a tokio runtime; the eviction sweep is
    /// spawned immediately. Fails only if the HTTP client cannot be built.
    pub fn new(config: ClientConfig, credentials: CredentialStore) -> Result<Self, FetchError> {
        let transport = HttpTransport::with_user_agent(&config.user_agent)?;
        Ok(Self::with_transport(config, credentials, Arc::new(transport)))
    }

    /// Creates a client with a custom transport
    pub fn with_transport(
        config: ClientConfig,
        credentials: CredentialStore,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let store = Arc::new(CacheStore::new());
        let counters = Arc::new(RequestCounters::default());
        let sweeper = EvictionTask::spawn(store.clone(), config.sweep_interval);

        info!(
            base_url = %config.base_url,
            sweep_interval_secs = config.sweep_interval.as_secs(),
            user_agent = %config.user_agent,
            "API client started"
        );

        Self {
            stats: StatsCollector::new(store.clone(), counters.clone()),
            fetcher: FetchController::new(store, transport, credentials, config, counters),
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// A read of `endpoint`; call `activate` on it to start loading
    pub fn query<T>(&self, endpoint: &str, options: QueryOptions) -> Query<T>
    where
        T: DeserializeOwned + Clone + Send + 'static,
    {
        Query::new(endpoint, self.fetcher.clone(), options)
    }

    /// A write to `endpoint`
    pub fn mutation<P, R>(&self, endpoint: &str, options: MutationOptions<P, R>) -> Mutation<P, R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        Mutation::new(endpoint, self.fetcher.clone(), options)
    }

    /// A batch fetcher using the default query options
    pub fn batch(&self) -> BatchFetcher {
        self.batch_with(QueryOptions::default())
    }

    pub fn batch_with(&self, options: QueryOptions) -> BatchFetcher {
        BatchFetcher::new(self.fetcher.clone(), options)
    }

    /// Removes every cached entry
    pub fn clear_all_cache(&self) {
        let cleared = self.fetcher.store().len();
        self.fetcher.store().clear();
        info!(cleared, "Cleared all cache entries");
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.stats.cache_stats()
    }

    pub fn request_stats(&self) -> RequestStats {
        self.stats.request_stats()
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        self.fetcher.store()
    }

    pub fn fetcher(&self) -> &FetchController {
        &self.fetcher
    }

    /// Whether the eviction sweep is still scheduled
    pub fn is_sweeping(&self) -> bool {
        lock(&self.sweeper, "client.sweeper")
            .as_ref()
            .is_some_and(EvictionTask::is_running)
    }

    /// Stops the eviction sweep and cancels shared background reads
    pub async fn shutdown(&self) {
        let sweeper = lock(&self.sweeper, "client.sweeper").take();
        if let Some(sweeper) = sweeper {
            sweeper.shutdown().await;
        }
        self.fetcher.shutdown();
        info!("API client shut down");
    }
}
