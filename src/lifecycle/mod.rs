//! Lifecycle management.
//!
//! # Design Decisions
//! - Background loops (connectivity monitor, queue flusher) subscribe
//!   to a single broadcast shutdown signal
//! - Shutdown is cooperative: loops exit at their next await point

pub mod shutdown;

pub use shutdown::Shutdown;
