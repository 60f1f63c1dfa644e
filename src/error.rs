//! Error types for the API client
//!
//! `ApiError` is what callers of `CachedApiClient` see. Cache failures never show
//! up here; they are logged and absorbed by the cache layer.

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when talking to the remote API
#[derive(Debug, Error)]
pub enum ApiError {
    /// An attempt exceeded the per-attempt time budget
    #[error("Request timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// Transport-level failure (DNS, connection refused, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-2xx status
    #[error("{message}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Human-readable message from the error body, or a generic one
        message: String,
        /// Error body, when it was valid JSON
        body: Option<Value>,
    },

    /// The request URL could not be resolved
    #[error("Invalid request URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The request body could not be serialized
    #[error("Failed to serialize request body: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The response payload did not match the expected type
    #[error("Failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),

    /// The caller cancelled the request
    #[error("Request cancelled")]
    Cancelled,
}

impl ApiError {
    /// Builds an `HttpStatus` error from a status and the raw error body.
    ///
    /// The message comes from a `message` or `error` string field in the JSON
    /// body. Anything else falls back to `"Request failed: <status>"`.
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let body: Option<Value> = serde_json::from_slice(body).ok();
        let message = body
            .as_ref()
            .and_then(|b| {
                b.get("message")
                    .or_else(|| b.get("error"))
                    .and_then(Value::as_str)
            })
            .map(str::to_string)
            .unwrap_or_else(|| format!("Request failed: {}", status));

        ApiError::HttpStatus {
            status,
            message,
            body,
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Timeouts, network failures and 5xx responses are retried. 4xx responses
    /// and local failures are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Timeout { .. } | ApiError::Network(_) => true,
            ApiError::HttpStatus { status, .. } => (500..600).contains(status),
            ApiError::InvalidUrl { .. }
            | ApiError::Serialize(_)
            | ApiError::Decode(_)
            | ApiError::Cancelled => false,
        }
    }
}
