//! Concurrent reads of many endpoints with per-endpoint failure isolation

use futures::future::join_all;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::cancel::CancelToken;
use crate::config::QueryOptions;
use crate::fetch::FetchController;
use crate::sync::lock;

/// One successfully fetched endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub endpoint: String,
    pub data: Arc<Value>,
}

/// Results of a batch: every success plus one message per failure
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// Successful reads, in the order the endpoints were given
    pub results: Vec<BatchItem>,
    /// Failures formatted as `"<endpoint>: <message>"`
    pub errors: Vec<String>,
}

/// Consumer-visible state of the most recent batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchState {
    pub loading: bool,
    pub errors: Vec<String>,
}

/// Fetches many endpoints at once through the shared cache
#[derive(Debug)]
pub struct BatchFetcher {
    fetcher: FetchController,
    options: QueryOptions,
    state: Mutex<BatchState>,
    /// Token of the batch currently running; replaced once cancelled
    cancel: Mutex<CancelToken>,
}

impl BatchFetcher {
    pub fn new(fetcher: FetchController, options: QueryOptions) -> Self {
        Self {
            fetcher,
            options,
            state: Mutex::new(BatchState::default()),
            cancel: Mutex::new(CancelToken::new()),
        }
    }

    /// Reads every endpoint concurrently and waits for all of them
    ///
    /// One endpoint failing never fails the batch; each request runs to
    /// completion and its error is reported alongside the successes.
    pub async fn batch_fetch<S: AsRef<str>>(&self, endpoints: &[S]) -> BatchOutcome {
        {
            let mut state = lock(&self.state, "batch.state");
            state.loading = true;
            state.errors.clear();
        }

        let cancel = {
            let mut cancel = lock(&self.cancel, "batch.cancel");
            if cancel.is_cancelled() {
                *cancel = CancelToken::new();
            }
            cancel.clone()
        };

        let cancel = &cancel;
        let reads = endpoints.iter().map(|endpoint| {
            let endpoint = endpoint.as_ref();
            async move {
                let result = self
                    .fetcher
                    .fetch_and_cache(endpoint, endpoint, &self.options, false, cancel)
                    .await;
                (endpoint, result)
            }
        });

        let mut outcome = BatchOutcome::default();
        for (endpoint, result) in join_all(reads).await {
            match result {
                Ok(fetched) => outcome.results.push(BatchItem {
                    endpoint: endpoint.to_string(),
                    data: fetched.data,
                }),
                Err(err) => outcome.errors.push(format!("{}: {}", endpoint, err)),
            }
        }

        info!(
            requested = endpoints.len(),
            succeeded = outcome.results.len(),
            failed = outcome.errors.len(),
            "Batch fetch finished"
        );

        let mut state = lock(&self.state, "batch.state");
        state.loading = false;
        state.errors = outcome.errors.clone();
        outcome
    }

    pub fn state(&self) -> BatchState {
        lock(&self.state, "batch.state").clone()
    }

    /// Stops waiting on reads of the batch that is still running
    ///
    /// The next `batch_fetch` starts with a fresh token.
    pub fn cancel(&self) {
        lock(&self.cancel, "batch.cancel").cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialStore;
    use crate::cache::{CacheStore, RequestCounters};
    use crate::config::ClientConfig;
    use crate::testing::{Reply, ScriptedTransport};
    use serde_json::json;
    use std::time::Duration;

    fn batch(transport: ScriptedTransport) -> (BatchFetcher, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let fetcher = FetchController::new(
            Arc::new(CacheStore::new()),
            transport.clone(),
            CredentialStore::fixed(None),
            ClientConfig::default().with_base_url("http://api.test"),
            Arc::new(RequestCounters::default()),
        );
        (BatchFetcher::new(fetcher, QueryOptions::default()), transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failure_does_not_fail_siblings() {
        let (batch, _transport) = batch(
            ScriptedTransport::new()
                .on("http://api.test/a", vec![Reply::json(r#"{"a":1}"#)])
                .on("http://api.test/b", vec![Reply::status(500, "Internal Server Error", "")]),
        );

        let outcome = batch.batch_fetch(&["/a", "/b"]).await;

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].endpoint, "/a");
        assert_eq!(*outcome.results[0].data, json!({"a": 1}));
        assert_eq!(outcome.errors, vec!["/b: HTTP 500: Internal Server Error"]);

        let state = batch.state();
        assert!(!state.loading);
        assert_eq!(state.errors, outcome.errors);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_run_concurrently() {
        let slow = |body: &str| vec![Reply::json(body).after(Duration::from_millis(100))];
        let (batch, transport) = batch(
            ScriptedTransport::new()
                .on("http://api.test/a", slow("1"))
                .on("http://api.test/b", slow("2"))
                .on("http://api.test/c", slow("3")),
        );

        let started = tokio::time::Instant::now();
        let outcome = batch.batch_fetch(&["/a", "/b", "/c"]).await;

        assert_eq!(started.elapsed(), Duration::from_millis(100));
        assert_eq!(outcome.results.len(), 3);
        let values: Vec<_> = outcome.results.iter().map(|r| (*r.data).clone()).collect();
        assert_eq!(values, vec![json!(1), json!(2), json!(3)]);
        assert_eq!(transport.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_reads_go_through_cache() {
        let (batch, transport) =
            batch(ScriptedTransport::new().on("http://api.test/a", vec![Reply::json("{}")]));

        batch.batch_fetch(&["/a"]).await;
        let outcome = batch.batch_fetch(&["/a"]).await;

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(transport.calls_to("http://api.test/a"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_batch() {
        let (batch, _transport) = batch(ScriptedTransport::new());
        let outcome = batch.batch_fetch::<&str>(&[]).await;
        assert_eq!(outcome, BatchOutcome::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_running_batch_only() {
        let (batch, transport) = batch(
            ScriptedTransport::new()
                .on(
                    "http://api.test/a",
                    vec![Reply::json("1").after(Duration::from_millis(100))],
                )
                .on("http://api.test/b", vec![Reply::json("2")]),
        );
        let batch = Arc::new(batch);

        let running = batch.clone();
        let handle = tokio::spawn(async move { running.batch_fetch(&["/a"]).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        batch.cancel();
        let cancelled = handle.await.unwrap();
        assert_eq!(cancelled.errors, vec!["/a: Request cancelled"]);

        let outcome = batch.batch_fetch(&["/b"]).await;
        assert!(
            outcome.errors.is_empty(),
            "unexpected errors: {:?}",
            outcome.errors
        );
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(*outcome.results[0].data, json!(2));
        assert_eq!(transport.calls_to("http://api.test/b"), 1);
        assert!(!batch.state().loading);
    }
}
