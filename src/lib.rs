//! Client-side network resilience engine.
//!
//! Makes outbound requests to unreliable upstreams (AI providers,
//! internal APIs) safe under partial failure: a per-service circuit
//! breaker, adaptive retry with backoff, connectivity monitoring,
//! response caching, and offline request queueing, orchestrated by a
//! single executor that never lets an error cross its boundary.

// Core engine
pub mod cache;
pub mod error;
pub mod executor;
pub mod queue;
pub mod resilience;
pub mod transport;

// Connectivity
pub mod health;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod notify;
pub mod observability;

pub use config::schema::EngineConfig;
pub use error::RequestError;
pub use executor::{
    CancelToken, ExecutionOutcome, RequestOptions, ResilientRequestExecutor, ResponseSource,
};
pub use health::state::{ConnectionQuality, NetworkStatus};
pub use lifecycle::Shutdown;
pub use notify::{LogNotifier, Notifier, StateChangeEvent};
pub use resilience::circuit_breaker::{BreakerSnapshot, CircuitState};
pub use resilience::retries::RetryDelay;
pub use transport::{HttpTransport, Transport, TransportError};
