//! Failure classification and retry scheduling.
//!
//! # Responsibilities
//! - Map transport failures onto the engine's error taxonomy
//! - Decide which error classes consume retry budget
//! - Compute the delay before each retry
//!
//! # Design Decisions
//! - Connection errors, timeouts, and 5xx are retryable; other 4xx are not
//! - 429 is retryable and goes through the same backoff as 5xx
//! - Fail-fast classes (circuit open, offline, abort) never consume
//!   retry budget

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::RequestError;
use crate::resilience::backoff::BackoffPolicy;
use crate::transport::TransportError;

/// Classify a transport failure under the given attempt deadline.
pub fn classify_transport(error: TransportError, deadline: Duration) -> RequestError {
    match error {
        TransportError::Network(message) => RequestError::Network(message),
        TransportError::Timeout => RequestError::Timeout(deadline),
        TransportError::Http(429) => RequestError::RateLimited { retry_after: None },
        TransportError::Http(status) if (500..=599).contains(&status) => {
            RequestError::Server { status }
        }
        TransportError::Http(status) => RequestError::Client { status },
    }
}

/// True for error classes worth another attempt.
pub fn is_retryable(error: &RequestError) -> bool {
    matches!(
        error,
        RequestError::Network(_)
            | RequestError::Timeout(_)
            | RequestError::Server { .. }
            | RequestError::RateLimited { .. }
    )
}

/// True for outcomes the circuit breaker should count.
pub fn counts_for_breaker(error: &RequestError) -> bool {
    !matches!(
        error,
        RequestError::CircuitOpen { .. } | RequestError::Offline | RequestError::Aborted
    )
}

/// How the delay before each retry is computed.
#[derive(Clone, Default)]
pub enum RetryDelay {
    /// The engine's configured backoff policy.
    #[default]
    Standard,
    /// Exponential schedule with an overridden base delay.
    Base(Duration),
    /// Fully custom schedule as a function of the retry index.
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl RetryDelay {
    /// Delay before retry `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32, policy: &BackoffPolicy) -> Duration {
        match self {
            RetryDelay::Standard => policy.delay_for(attempt),
            RetryDelay::Base(base) => policy.delay_with_base(*base, attempt),
            RetryDelay::Custom(f) => f(attempt),
        }
    }
}

impl fmt::Debug for RetryDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryDelay::Standard => write!(f, "Standard"),
            RetryDelay::Base(base) => f.debug_tuple("Base").field(base).finish(),
            RetryDelay::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}
