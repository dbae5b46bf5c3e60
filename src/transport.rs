//! HTTP transport used by every read and write
//!
//! `Transport` is the seam between the cache layer and the network. The
//! production implementation wraps a `reqwest::Client`; tests script
//! responses instead.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder};

use crate::error::FetchError;

/// Request method; reads are GET, mutations are POST
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A fully resolved outgoing request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    /// Bearer token for the `Authorization` header, if logged in
    pub bearer: Option<String>,
    /// JSON-encoded body (POST only)
    pub body: Option<String>,
}

/// Status line and raw body of a response
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the body for a 2xx response, or the status as an error
    pub fn into_body(self) -> Result<String, FetchError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(FetchError::Http {
                status: self.status,
                status_text: self.status_text,
            })
        }
    }
}

/// Sends one request and returns whatever the server answered
///
/// Implementations only fail for requests that got no response at all;
/// non-2xx answers come back as an `HttpResponse`.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, FetchError>;
}

/// `Transport` backed by a shared `reqwest::Client`
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport whose client identifies itself as `user_agent`
    pub fn with_user_agent(user_agent: &str) -> Result<Self, FetchError> {
        let client = client_builder(user_agent).build()?;
        Ok(Self { client })
    }

    /// Create a transport around a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn client_builder(user_agent: &str) -> ClientBuilder {
    Client::builder().user_agent(user_agent)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, FetchError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        }
        .header(CONTENT_TYPE, "application/json");

        if let Some(token) = &request.bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}
