//! Passive connectivity signals (failure detection).
//!
//! # Responsibilities
//! - Observe request outcomes reported by the executor
//! - Track consecutive connection-class failures
//! - Trigger the offline transition past the threshold
//!
//! # Design Decisions
//! - Only connection errors and timeouts count; an HTTP status reply
//!   proves the link is up
//! - Any success resets the run and revives a flagged-offline process
//! - Thresholded runs prevent flapping on a single dropped packet

use std::sync::atomic::Ordering;

use crate::error::RequestError;
use crate::health::state::NetworkState;

/// True for failures that indicate the link itself is down.
pub fn is_connection_failure(error: &RequestError) -> bool {
    matches!(error, RequestError::Network(_) | RequestError::Timeout(_))
}

impl NetworkState {
    /// A request or probe reached the upstream.
    pub fn report_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        if !self.is_online() {
            self.mark_online();
        }
    }

    /// A request or probe failed; connection-class runs go offline.
    pub fn report_failure(&self, error: &RequestError) {
        if !is_connection_failure(error) {
            // The upstream answered, however unhappily.
            self.consecutive_failures.store(0, Ordering::Relaxed);
            return;
        }
        let run = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if run >= self.offline_threshold && self.is_online() {
            tracing::warn!(consecutive_failures = run, "marking process offline");
            self.mark_offline();
        }
    }
}
