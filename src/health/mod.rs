//! Connectivity monitoring subsystem.
//!
//! # Data Flow
//! ```text
//! Active probing (active.rs):
//!     Periodic timer
//!     → Ping the liveness endpoint
//!     → Update state.rs (rtt average, online/offline)
//!     → On offline: reconnection probes with exponential backoff
//!
//! Passive signals (passive.rs):
//!     Request outcome observed by the executor
//!     → Consecutive connection failures counted
//!     → state.rs marked offline past the threshold
//!
//! State (state.rs):
//!     Online ←→ Offline, quality derived deterministically
//! ```
//!
//! # Design Decisions
//! - Active and passive signals are complementary
//! - A run of consecutive failures is required before going offline
//! - Status is one shared snapshot; transitions broadcast to subscribers

pub mod active;
pub mod passive;
pub mod state;

pub use active::{ConnectivityMonitor, HttpPinger, Pinger};
pub use state::{ConnectionQuality, NetworkEvent, NetworkState, NetworkStatus};
