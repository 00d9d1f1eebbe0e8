//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds ≥ 1, timers > 0)
//! - Check cross-field consistency (backoff cap ≥ base)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before the config is accepted into the engine

use crate::config::schema::EngineConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn err(field: &'static str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field,
        message: message.into(),
    }
}

/// Validate an engine configuration, collecting every problem.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.breaker.failure_threshold < 1 {
        errors.push(err("breaker.failure_threshold", "must be at least 1"));
    }
    if config.breaker.success_threshold < 1 {
        errors.push(err("breaker.success_threshold", "must be at least 1"));
    }
    if config.breaker.reset_timeout_ms == 0 {
        errors.push(err("breaker.reset_timeout_ms", "must be greater than zero"));
    }
    if config.breaker.monitoring_window_ms == 0 {
        errors.push(err(
            "breaker.monitoring_window_ms",
            "must be greater than zero",
        ));
    }

    if config.retry.max_delay_ms < config.retry.base_delay_ms {
        errors.push(err(
            "retry.max_delay_ms",
            format!(
                "must be at least base_delay_ms ({})",
                config.retry.base_delay_ms
            ),
        ));
    }
    if config.retry.request_timeout_ms == 0 {
        errors.push(err("retry.request_timeout_ms", "must be greater than zero"));
    }

    if config.network.ping_enabled {
        if config.network.ping_url.is_empty() {
            errors.push(err(
                "network.ping_url",
                "required when ping_enabled is true",
            ));
        }
        if config.network.ping_interval_ms == 0 {
            errors.push(err(
                "network.ping_interval_ms",
                "must be greater than zero",
            ));
        }
        if config.network.ping_timeout_ms == 0 {
            errors.push(err("network.ping_timeout_ms", "must be greater than zero"));
        }
    }
    if config.network.offline_failure_threshold < 1 {
        errors.push(err(
            "network.offline_failure_threshold",
            "must be at least 1",
        ));
    }
    if config.network.reconnect_max_delay_ms < config.network.reconnect_base_delay_ms {
        errors.push(err(
            "network.reconnect_max_delay_ms",
            "must be at least reconnect_base_delay_ms",
        ));
    }

    if config.queue.enabled && config.queue.max_depth == 0 {
        errors.push(err("queue.max_depth", "must be at least 1 when enabled"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(err(
            "observability.metrics_address",
            "must be a valid socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
