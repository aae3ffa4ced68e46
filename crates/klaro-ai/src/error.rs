//! Error types for klaro-ai

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using klaro-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// How a failed request should be treated by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// May succeed if sent again (network, rate limit, overload, 5xx)
    #[default]
    Transient,
    /// The endpoint refused this request; sending it again will not help
    Rejected,
    /// Credentials or configuration are wrong; nothing will succeed
    Fatal,
}

/// Errors that can occur when talking to an LLM endpoint
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error: {message} (type: {error_type})")]
    Api { error_type: String, message: String },

    /// Rate limit exceeded
    #[error("Rate limited: retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Invalid API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl Error {
    /// Create an API error from type and message
    pub fn api(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status and body onto a typed error
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => Error::Auth(body),
            429 => Error::RateLimited { retry_after: None },
            _ => Error::api(format!("http_{}", status), body),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::RateLimited { .. } | Error::Sse(_) => true,
            Error::Api {
                error_type,
                message,
            } => {
                let et = error_type.to_lowercase();
                let msg = message.to_lowercase();
                et.contains("rate_limit")
                    || et.contains("overloaded")
                    || et.starts_with("http_5")
                    || msg.contains("rate limit")
                    || msg.contains("overloaded")
                    || msg.contains("too many requests")
            }
            _ => false,
        }
    }

    /// Errors that no amount of retrying will fix (credentials, configuration)
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Auth(_) | Error::InvalidApiKey)
    }

    pub fn kind(&self) -> ErrorKind {
        if self.is_fatal() {
            ErrorKind::Fatal
        } else if self.is_retryable() {
            ErrorKind::Transient
        } else {
            ErrorKind::Rejected
        }
    }
}
