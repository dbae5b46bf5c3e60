//! Scripted transport used by the unit tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::FetchError;
use crate::transport::{HttpRequest, HttpResponse, Transport};

/// One scripted answer, optionally delayed
#[derive(Debug, Clone)]
pub struct Reply {
    pub delay: Duration,
    pub result: Result<HttpResponse, FetchError>,
}

impl Reply {
    pub fn json(body: &str) -> Self {
        Self::status(200, "OK", body)
    }

    pub fn status(status: u16, status_text: &str, body: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(HttpResponse {
                status,
                status_text: status_text.to_string(),
                body: body.to_string(),
            }),
        }
    }

    pub fn network_error(message: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(FetchError::Network(message.to_string())),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A request the transport saw, and when
#[derive(Debug, Clone)]
pub struct Call {
    pub request: HttpRequest,
    pub at: Instant,
}

/// Answers each URL from its own queue; the last reply of a queue repeats
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, url: &str, replies: Vec<Reply>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(url.to_string(), replies.into());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls().iter().filter(|c| c.request.url == url).count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, FetchError> {
        let url = request.url.clone();
        self.calls.lock().unwrap().push(Call {
            request,
            at: Instant::now(),
        });

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(&url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        let reply = reply.unwrap_or_else(|| Reply::status(404, "Not Found", ""));
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.result
    }
}
