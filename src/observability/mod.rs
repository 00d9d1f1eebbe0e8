//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All components produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, remote)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Metric updates are cheap enough to sit on request paths
//! - The exporter is optional; the `metrics` facade no-ops without it
//! - Service key is the primary label on every breaker/request metric

pub mod logging;
pub mod metrics;
