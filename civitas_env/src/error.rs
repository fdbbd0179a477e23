//! Error types for the Civitas environment abstraction.

use thiserror::Error;

/// Errors a `GenerativeModel` backend can report.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// Request never reached the model (DNS, TLS, connection reset, ...)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Backend refused the request because of rate limiting (HTTP 429)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Backend answered with an error or an unparseable payload
    #[error("Model error: {0}")]
    Model(String),

    /// Call did not complete in time
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl ModelError {
    /// Creates a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a rate-limit error.
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Returns true for the 429-equivalent signal.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}
