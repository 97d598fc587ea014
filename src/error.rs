//! Error types for the tably engine
//!
//! This module defines the error taxonomy used by the API client and the
//! task runner. Rate limits and transient failures are recoverable and
//! handled inside the scan loop; nothing here escalates past a runner.

use thiserror::Error;

/// Errors that can occur when talking to the reservation API
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP transport error (connection refused, DNS, TLS, ...)
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    /// Rate limit exceeded, with the server's Retry-After value when present
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Option<u64> },

    /// Non-success status code
    #[error("Server returned HTTP {0}")]
    Status(u16),

    /// Request timed out
    #[error("Request timeout")]
    Timeout,

    /// Response body did not have the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Http(err)
        }
    }
}

impl ApiError {
    /// True for failures that count toward a runner's consecutive-failure
    /// tally. Rate limits are coordinated through the shared cooldown, and
    /// a malformed body is treated as an empty result for the cycle;
    /// neither counts.
    pub fn is_transient_failure(&self) -> bool {
        !matches!(
            self,
            ApiError::RateLimited { .. } | ApiError::Malformed(_)
        )
    }
}
