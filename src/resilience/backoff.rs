//! Exponential backoff with jitter.
//!
//! # Design Decisions
//! - Delays grow as base × 2^attempt and are capped after jitter
//! - Jitter comes from a seedable RNG so retry schedules are
//!   reproducible in tests
//! - Reconnection probing uses the same curve without jitter

use std::sync::Mutex;
use std::time::Duration;

/// Computes retry delays for one engine instance.
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    jitter: Duration,
    rng: Mutex<fastrand::Rng>,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration, jitter: Duration) -> Self {
        Self {
            base,
            max,
            jitter,
            rng: Mutex::new(fastrand::Rng::new()),
        }
    }

    /// Deterministic jitter for tests.
    pub fn seeded(base: Duration, max: Duration, jitter: Duration, seed: u64) -> Self {
        Self {
            base,
            max,
            jitter,
            rng: Mutex::new(fastrand::Rng::with_seed(seed)),
        }
    }

    /// Delay before retry `attempt` (0-based) using the configured base.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay_with_base(self.base, attempt)
    }

    /// Delay before retry `attempt` with an overridden base delay.
    pub fn delay_with_base(&self, base: Duration, attempt: u32) -> Duration {
        let exponent = 2u64.saturating_pow(attempt);
        let raw_ms = (base.as_millis() as u64).saturating_mul(exponent);
        let delay_ms = raw_ms
            .saturating_add(self.jitter_ms())
            .min(self.max.as_millis() as u64);
        Duration::from_millis(delay_ms)
    }

    fn jitter_ms(&self) -> u64 {
        let bound = self.jitter.as_millis() as u64;
        if bound == 0 {
            return 0;
        }
        self.rng
            .lock()
            .expect("backoff rng mutex poisoned")
            .u64(0..bound)
    }
}

/// Reconnection delay: base × 2^attempt, capped, no jitter.
pub fn reconnect_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exponent = 2u64.saturating_pow(attempt);
    Duration::from_millis(base_ms.saturating_mul(exponent).min(max_ms))
}
