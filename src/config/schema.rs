//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! resilience engine. All types derive Serde traits for deserialization
//! from config files; durations are expressed in milliseconds.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the resilience engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Circuit breaker thresholds and timers.
    pub breaker: BreakerConfig,

    /// Retry and backoff settings.
    pub retry: RetryConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Connectivity monitoring settings.
    pub network: NetworkConfig,

    /// Offline request queue settings.
    pub queue: QueueConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Circuit breaker configuration, applied per service key.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failures within the monitoring window before the circuit opens.
    pub failure_threshold: u32,

    /// How long an open circuit waits before permitting probes.
    pub reset_timeout_ms: u64,

    /// Consecutive half-open successes required to close the circuit.
    pub success_threshold: u32,

    /// Failures further apart than this window do not accumulate.
    pub monitoring_window_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
            success_threshold: 3,
            monitoring_window_ms: 300_000,
        }
    }
}

impl BreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn monitoring_window(&self) -> Duration {
        Duration::from_millis(self.monitoring_window_ms)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum retries after the initial attempt.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Cap on any single backoff delay in milliseconds.
    pub max_delay_ms: u64,

    /// Upper bound of the random jitter added to each delay.
    pub jitter_ms: u64,

    /// Per-attempt deadline in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter_ms: 1_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the response cache.
    pub enabled: bool,

    /// Freshness window used when a request does not specify one.
    pub default_max_age_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_max_age_ms: 300_000,
        }
    }
}

impl CacheConfig {
    pub fn default_max_age(&self) -> Duration {
        Duration::from_millis(self.default_max_age_ms)
    }
}

/// Connectivity monitoring configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Enable active liveness pings.
    pub ping_enabled: bool,

    /// Liveness endpoint probed by the monitor.
    pub ping_url: String,

    /// Interval between pings in milliseconds.
    pub ping_interval_ms: u64,

    /// Deadline for a single ping in milliseconds.
    pub ping_timeout_ms: u64,

    /// Reconnection attempts after going offline.
    pub max_reconnect_attempts: u32,

    /// Base delay for reconnection backoff in milliseconds.
    pub reconnect_base_delay_ms: u64,

    /// Cap on reconnection backoff in milliseconds.
    pub reconnect_max_delay_ms: u64,

    /// Consecutive connection-class failures before marking offline.
    pub offline_failure_threshold: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ping_enabled: true,
            ping_url: String::new(),
            ping_interval_ms: 30_000,
            ping_timeout_ms: 10_000,
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            offline_failure_threshold: 3,
        }
    }
}

impl NetworkConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

/// Offline request queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Enable queueing of requests issued while offline.
    pub enabled: bool,

    /// Maximum queued requests; enqueue past this depth is refused.
    pub max_depth: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_depth: 256,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = EngineConfig::default();
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.reset_timeout_ms, 60_000);
        assert_eq!(config.breaker.success_threshold, 3);
        assert_eq!(config.breaker.monitoring_window_ms, 300_000);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.retry.max_delay_ms, 30_000);
        assert_eq!(config.network.ping_interval_ms, 30_000);
        assert_eq!(config.network.max_reconnect_attempts, 5);
    }

    #[test]
    fn minimal_toml_fills_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [breaker]
            failure_threshold = 2

            [network]
            ping_url = "http://localhost:9000/ping"
            "#,
        )
        .unwrap();
        assert_eq!(config.breaker.failure_threshold, 2);
        assert_eq!(config.breaker.success_threshold, 3);
        assert_eq!(config.network.ping_url, "http://localhost:9000/ping");
        assert!(config.queue.enabled);
    }
}
