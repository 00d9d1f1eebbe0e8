//! Error taxonomy for the resilience engine.
//!
//! # Design Decisions
//! - Every failure mode is a value; the executor never lets an error
//!   escape its public boundary
//! - Retryability is a property of the error class, not the call site
//!   (see `resilience::retries`)
//! - Fail-fast classes carry enough context for callers to render a
//!   useful advisory (service key, time until the next probe window)

use std::time::Duration;
use thiserror::Error;

/// A classified request failure.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// Connection-level failure (DNS, refused, reset).
    #[error("network error: {0}")]
    Network(String),

    /// The per-attempt deadline elapsed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Upstream returned a 5xx status.
    #[error("upstream server error (status {status})")]
    Server { status: u16 },

    /// Upstream returned 429.
    #[error("rate limited by upstream")]
    RateLimited { retry_after: Option<Duration> },

    /// Upstream returned a 4xx status other than 429.
    #[error("client error (status {status})")]
    Client { status: u16 },

    /// The circuit for the service key is open; the call was never attempted.
    #[error("circuit open for `{key}`")]
    CircuitOpen {
        key: String,
        retry_in: Option<Duration>,
    },

    /// The process is offline and the request was neither queued nor
    /// served from a fallback.
    #[error("offline")]
    Offline,

    /// The caller cancelled the request.
    #[error("aborted by caller")]
    Aborted,
}

impl RequestError {
    /// Short label used for metrics and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            RequestError::Network(_) => "network",
            RequestError::Timeout(_) => "timeout",
            RequestError::Server { .. } => "server",
            RequestError::RateLimited { .. } => "rate_limited",
            RequestError::Client { .. } => "client",
            RequestError::CircuitOpen { .. } => "circuit_open",
            RequestError::Offline => "offline",
            RequestError::Aborted => "aborted",
        }
    }
}
