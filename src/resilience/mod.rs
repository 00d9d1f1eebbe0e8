//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to an upstream service:
//!     → timeouts.rs (enforce the per-attempt deadline)
//!     → On failure: retries.rs (classify, retry with backoff.rs delays)
//!     → circuit_breaker.rs (track the final verdict, open on threshold)
//! ```
//!
//! # Design Decisions
//! - Every attempt has a deadline; there is no unbounded wait
//! - Only transient failure classes are retried
//! - The breaker sees one verdict per logical request, never
//!   intermediate retry failures

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;
