//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EngineConfig (validated, immutable)
//!     → shared by value at engine construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require rebuilding the engine
//! - All fields have defaults so a minimal (or absent) config works
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::BreakerConfig;
pub use schema::CacheConfig;
pub use schema::EngineConfig;
pub use schema::NetworkConfig;
pub use schema::QueueConfig;
pub use schema::RetryConfig;
