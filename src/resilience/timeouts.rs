//! Per-attempt deadline enforcement.
//!
//! # Responsibilities
//! - Wrap a single transport attempt with a deadline
//! - Surface expiry as a distinct, retryable error class
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities, so paused-clock tests advance it
//! - The deadline applies per attempt, not per logical request

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;

use crate::error::RequestError;

/// Run `fut` under `limit`; expiry yields `RequestError::Timeout`.
pub async fn bounded<F, T>(limit: Duration, fut: F) -> Result<T, RequestError>
where
    F: Future<Output = Result<T, RequestError>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(RequestError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expiry_maps_to_timeout_error() {
        let result: Result<(), _> = bounded(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(RequestError::Timeout(_))));
    }

    #[tokio::test]
    async fn fast_completion_passes_through() {
        let result = bounded(Duration::from_millis(50), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
