//! Client and per-query configuration with their defaults

use std::time::Duration;

use crate::cache::DEFAULT_SWEEP_INTERVAL;
use crate::fetch::RetryPolicy;

/// Default base URL of the backend
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Default time an entry stays valid
pub const DEFAULT_CACHE_TIME: Duration = Duration::from_secs(5 * 60);

/// Default age after which an entry is refreshed in the background
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(60);

/// `User-Agent` sent with every request
pub const DEFAULT_USER_AGENT: &str = concat!("fetchcache/", env!("CARGO_PKG_VERSION"));

/// Settings shared by everything created from one `ApiClient`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Prefix for every endpoint path
    pub base_url: String,
    /// Interval between background eviction sweeps
    pub sweep_interval: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Joins an endpoint path onto the base URL
    ///
    /// Absolute `http(s)://` endpoints are used as-is.
    pub fn resolve_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if endpoint.starts_with('/') {
            format!("{}{}", base, endpoint)
        } else {
            format!("{}/{}", base, endpoint)
        }
    }
}

/// Per-query cache and retry settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Cache key; defaults to the endpoint path
    pub key: Option<String>,
    /// How long a fetched response stays valid
    pub cache_time: Duration,
    /// Age after which a cached response is refreshed in the background
    pub stale_time: Duration,
    /// Auto-refetch period; `None` disables it
    pub refetch_interval: Option<Duration>,
    pub retry: RetryPolicy,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            key: None,
            cache_time: DEFAULT_CACHE_TIME,
            stale_time: DEFAULT_STALE_TIME,
            refetch_interval: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl QueryOptions {
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = cache_time;
        self
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    /// Set the auto-refetch period; a zero duration disables it
    pub fn refetch_interval(mut self, interval: Duration) -> Self {
        self.refetch_interval = (!interval.is_zero()).then_some(interval);
        self
    }

    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry.attempts = attempts;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry.base_delay = delay;
        self
    }

    pub fn retry_client_errors(mut self, enabled: bool) -> Self {
        self.retry.retry_client_errors = enabled;
        self
    }

    /// The cache key for `endpoint` under these options
    pub fn key_for(&self, endpoint: &str) -> String {
        self.key.clone().unwrap_or_else(|| endpoint.to_string())
    }
}
