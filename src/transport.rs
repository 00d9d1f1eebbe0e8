//! Outbound transport abstraction.
//!
//! # Responsibilities
//! - Define the narrow interface the engine needs from the HTTP layer
//! - Map wire-level failures onto the three transport error classes
//!
//! # Design Decisions
//! - The engine owns per-attempt deadlines; adapters do not configure
//!   their own timeouts
//! - Implementations are injected at construction; tests use scripted
//!   fakes instead of sockets

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failure classes a transport may produce. Classification into the
/// engine's retry policy happens in `resilience::retries`.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection-level failure (DNS, refused, reset).
    #[error("network error: {0}")]
    Network(String),

    /// The transport's own I/O stalled.
    #[error("transport timed out")]
    Timeout,

    /// The upstream answered with a non-success HTTP status.
    #[error("http status {0}")]
    Http(u16),
}

/// The single operation the engine needs from the outside world.
///
/// A `None` payload issues a read (GET); a `Some` payload posts JSON.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, target: &str, payload: Option<&Value>) -> Result<Value, TransportError>;
}

/// Default transport over a shared `reqwest` client.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Use a pre-configured client (proxies, default headers).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, target: &str, payload: Option<&Value>) -> Result<Value, TransportError> {
        let request = match payload {
            Some(body) => self.client.post(target).json(body),
            None => self.client.get(target),
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Http(status.as_u16()));
        }

        // Upstreams are not required to answer JSON; wrap plain text.
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}
