//! Single-attempt writes that keep the cache consistent
//!
//! A mutation POSTs a JSON payload once (writes are not assumed idempotent),
//! optionally applies an optimistic local update first, and on success drops
//! the cache keys it was told to invalidate.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::fetch::FetchController;
use crate::sync::lock;
use crate::transport::Method;

/// Reverts an optimistic update
pub type UndoFn = Box<dyn FnOnce() + Send>;

type OptimisticFn<P> = Box<dyn Fn(&P) -> UndoFn + Send + Sync>;

/// Callbacks and invalidation list for one mutation endpoint
pub struct MutationOptions<P, R> {
    on_success: Option<Box<dyn Fn(&R) + Send + Sync>>,
    on_error: Option<Box<dyn Fn(&str) + Send + Sync>>,
    optimistic_update: Option<OptimisticFn<P>>,
    /// Cache keys dropped after a successful write
    pub invalidate: Vec<String>,
}

impl<P, R> Default for MutationOptions<P, R> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_error: None,
            optimistic_update: None,
            invalidate: Vec::new(),
        }
    }
}

impl<P, R> std::fmt::Debug for MutationOptions<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationOptions")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("optimistic_update", &self.optimistic_update.is_some())
            .field("invalidate", &self.invalidate)
            .finish()
    }
}

impl<P, R> MutationOptions<P, R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the decoded response after a successful write
    pub fn on_success(mut self, f: impl Fn(&R) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Box::new(f));
        self
    }

    /// Called with the error message after a failed write
    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Applied before the request is sent; the returned closure undoes it
    /// and is invoked automatically if the write fails
    pub fn optimistic_update<F, U>(mut self, f: F) -> Self
    where
        F: Fn(&P) -> U + Send + Sync + 'static,
        U: FnOnce() + Send + 'static,
    {
        self.optimistic_update = Some(Box::new(move |payload: &P| Box::new(f(payload)) as UndoFn));
        self
    }

    /// Adds a cache key to drop after a successful write
    pub fn invalidate(mut self, key: impl Into<String>) -> Self {
        self.invalidate.push(key.into());
        self
    }
}

/// Consumer-visible state of a mutation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationState {
    pub loading: bool,
    pub error: Option<String>,
}

/// A write endpoint bound to its options
pub struct Mutation<P, R> {
    endpoint: String,
    fetcher: FetchController,
    options: MutationOptions<P, R>,
    state: Mutex<MutationState>,
    _types: PhantomData<fn(P) -> R>,
}

impl<P, R> std::fmt::Debug for Mutation<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutation")
            .field("endpoint", &self.endpoint)
            .field("options", &self.options)
            .field("state", &self.state())
            .finish()
    }
}

impl<P, R> Mutation<P, R>
where
    P: Serialize,
    R: DeserializeOwned,
{
    pub fn new(
        endpoint: impl Into<String>,
        fetcher: FetchController,
        options: MutationOptions<P, R>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            fetcher,
            options,
            state: Mutex::new(MutationState::default()),
            _types: PhantomData,
        }
    }

    /// Sends `payload` once and returns the decoded response
    ///
    /// # Behavior
    /// - Applies the optimistic update (if any) before the request goes out
    /// - On success, drops every configured cache key, then calls `on_success`
    /// - On failure, undoes the optimistic update, calls `on_error` and records
    ///   the message in `state().error`; no retry is attempted
    pub async fn mutate(&self, payload: P) -> Result<R, FetchError> {
        self.update_state(|s| {
            s.loading = true;
            s.error = None;
        });

        let body = match serde_json::to_string(&payload) {
            Ok(body) => body,
            Err(err) => return Err(self.fail(FetchError::Encode(err.to_string()), None)),
        };

        let undo = self
            .options
            .optimistic_update
            .as_ref()
            .map(|apply| apply(&payload));

        let result = self
            .fetcher
            .request_json(Method::Post, &self.endpoint, Some(body))
            .await
            .and_then(|value| serde_json::from_value::<R>(value).map_err(FetchError::from));

        match result {
            Ok(response) => {
                for key in &self.options.invalidate {
                    self.fetcher.invalidate(key);
                }
                info!(
                    endpoint = %self.endpoint,
                    invalidated = self.options.invalidate.len(),
                    "Mutation succeeded"
                );
                if let Some(on_success) = &self.options.on_success {
                    on_success(&response);
                }
                self.update_state(|s| s.loading = false);
                Ok(response)
            }
            Err(err) => Err(self.fail(err, undo)),
        }
    }

    fn fail(&self, err: FetchError, undo: Option<UndoFn>) -> FetchError {
        let message = err.to_string();
        warn!(endpoint = %self.endpoint, error = %message, "Mutation failed");

        if let Some(undo) = undo {
            debug!(endpoint = %self.endpoint, "Rolling back optimistic update");
            undo();
        }
        if let Some(on_error) = &self.options.on_error {
            on_error(&message);
        }
        self.update_state(|s| {
            s.loading = false;
            s.error = Some(message);
        });
        err
    }
}

impl<P, R> Mutation<P, R> {
    /// Snapshot of the loading flag and last error
    pub fn state(&self) -> MutationState {
        lock(&self.state, "mutation.state").clone()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn update_state(&self, f: impl FnOnce(&mut MutationState)) {
        f(&mut lock(&self.state, "mutation.state"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialStore;
    use crate::cache::{CacheStore, RequestCounters};
    use crate::cancel::CancelToken;
    use crate::config::{ClientConfig, QueryOptions};
    use crate::testing::{Reply, ScriptedTransport};
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const POST_URL: &str = "http://api.test/api/items";
    const LIST_URL: &str = "http://api.test/api/x";

    #[derive(Debug, Serialize)]
    struct NewItem {
        name: String,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Created {
        id: u32,
    }

    fn fetcher(transport: ScriptedTransport) -> (FetchController, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let fetcher = FetchController::new(
            Arc::new(CacheStore::new()),
            transport.clone(),
            CredentialStore::fixed(Some("tok".to_string())),
            ClientConfig::default().with_base_url("http://api.test"),
            Arc::new(RequestCounters::default()),
        );
        (fetcher, transport)
    }

    fn item() -> NewItem {
        NewItem {
            name: "widget".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_invalidates_and_calls_back() {
        let (fetcher, transport) = fetcher(
            ScriptedTransport::new()
                .on(POST_URL, vec![Reply::json(r#"{"id":7}"#)])
                .on(
                    LIST_URL,
                    vec![Reply::json(r#"{"items":[]}"#), Reply::json(r#"{"items":[7]}"#)],
                ),
        );
        let options = QueryOptions::default();
        let cancel = CancelToken::new();
        let read = || fetcher.fetch_and_cache("/api/x", "/api/x", &options, false, &cancel);
        read().await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mutation: Mutation<NewItem, Created> = Mutation::new(
            "/api/items",
            fetcher.clone(),
            MutationOptions::new()
                .invalidate("/api/x")
                .on_success(move |created: &Created| sink.lock().unwrap().push(created.id)),
        );

        let created = mutation.mutate(item()).await.unwrap();
        assert_eq!(created, Created { id: 7 });
        assert_eq!(*seen.lock().unwrap(), vec![7]);
        assert_eq!(mutation.state(), MutationState::default());

        let after = read().await.unwrap();
        assert!(!after.from_cache, "invalidated key must be refetched");
        assert_eq!(*after.data, json!({"items": [7]}));
        assert_eq!(transport.calls_to(LIST_URL), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_carries_json_body_and_token() {
        let (fetcher, transport) =
            fetcher(ScriptedTransport::new().on(POST_URL, vec![Reply::json(r#"{"id":1}"#)]));
        let mutation: Mutation<NewItem, Created> =
            Mutation::new("/api/items", fetcher, MutationOptions::new());

        mutation.mutate(item()).await.unwrap();

        let call = &transport.calls()[0];
        assert_eq!(call.request.method, Method::Post);
        assert_eq!(call.request.bearer.as_deref(), Some("tok"));
        assert_eq!(call.request.body.as_deref(), Some(r#"{"name":"widget"}"#));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_rolls_back_and_reports_once() {
        let (fetcher, transport) = fetcher(ScriptedTransport::new().on(
            POST_URL,
            vec![Reply::status(500, "Internal Server Error", "")],
        ));
        fetcher
            .store()
            .set("/api/x", json!({"items": []}), Duration::from_secs(300));

        let local = Arc::new(Mutex::new(Vec::<String>::new()));
        let errors = Arc::new(Mutex::new(Vec::<String>::new()));
        let (apply_to, error_sink) = (local.clone(), errors.clone());

        let mutation: Mutation<NewItem, Created> = Mutation::new(
            "/api/items",
            fetcher.clone(),
            MutationOptions::new()
                .invalidate("/api/x")
                .optimistic_update(move |payload: &NewItem| {
                    apply_to.lock().unwrap().push(payload.name.clone());
                    let undo_on = apply_to.clone();
                    move || {
                        undo_on.lock().unwrap().pop();
                    }
                })
                .on_error(move |message| error_sink.lock().unwrap().push(message.to_string())),
        );

        let err = mutation.mutate(item()).await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP 500: Internal Server Error");
        assert!(local.lock().unwrap().is_empty(), "optimistic update must be undone");
        assert_eq!(*errors.lock().unwrap(), vec!["HTTP 500: Internal Server Error"]);
        assert_eq!(
            mutation.state().error.as_deref(),
            Some("HTTP 500: Internal Server Error")
        );
        assert!(!mutation.state().loading);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.calls_to(POST_URL), 1, "mutations are never retried");
        assert!(fetcher.store().get("/api/x").is_some(), "failed write keeps cache");
    }

    #[tokio::test(start_paused = true)]
    async fn test_optimistic_update_applies_before_response() {
        let (fetcher, _transport) = fetcher(ScriptedTransport::new().on(
            POST_URL,
            vec![Reply::json(r#"{"id":3}"#).after(Duration::from_millis(100))],
        ));
        let local = Arc::new(Mutex::new(Vec::<String>::new()));
        let apply_to = local.clone();

        let mutation: Arc<Mutation<NewItem, Created>> = Arc::new(Mutation::new(
            "/api/items",
            fetcher,
            MutationOptions::new().optimistic_update(move |payload: &NewItem| {
                apply_to.lock().unwrap().push(payload.name.clone());
                || {}
            }),
        ));

        let running = mutation.clone();
        let handle = tokio::spawn(async move { running.mutate(item()).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(*local.lock().unwrap(), vec!["widget"]);
        assert!(mutation.state().loading);

        handle.await.unwrap().unwrap();
        assert_eq!(*local.lock().unwrap(), vec!["widget"], "success keeps the update");
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_response_is_an_error() {
        let (fetcher, _transport) = fetcher(
            ScriptedTransport::new().on(POST_URL, vec![Reply::json(r#"{"unexpected":true}"#)]),
        );
        let mutation: Mutation<NewItem, Created> =
            Mutation::new("/api/items", fetcher, MutationOptions::new());

        let err = mutation.mutate(item()).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
        assert!(mutation.state().error.is_some());
    }
}
