//! Error types shared by the fetch, mutation and batch paths
//!
//! Every failure inside the crate is a `FetchError`. Consumer-facing state
//! (`QueryState`, `MutationState`, `BatchOutcome`) only ever stores the
//! `Display` text of these errors.

use thiserror::Error;

/// Errors that can occur while talking to the backend
///
/// The type is `Clone` so that one in-flight request can hand the same
/// result to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The server answered with a non-2xx status
    #[error("HTTP {status}: {status_text}")]
    Http { status: u16, status_text: String },

    /// The request never produced a response (DNS, connect, reset, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// The response body was not the JSON we expected
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The request payload could not be serialized
    #[error("Failed to encode request body: {0}")]
    Encode(String),

    /// The owning consumer went away before the request finished
    #[error("Request cancelled")]
    Cancelled,
}

impl FetchError {
    /// Returns the HTTP status code if this is a status failure
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this is a 4xx answer that will not change on retry
    ///
    /// 408 (timeout) and 429 (rate limited) are treated as transient.
    pub fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(s) if (400..500).contains(&s) && s != 408 && s != 429)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
