//! Active connectivity probing.
//!
//! # Responsibilities
//! - Periodically ping the liveness endpoint
//! - Feed round-trip times into the rolling rtt average
//! - Drive reconnection with exponential backoff after going offline

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::config::schema::NetworkConfig;
use crate::error::RequestError;
use crate::health::state::{NetworkEvent, NetworkState};
use crate::resilience::backoff::reconnect_delay;

/// Liveness probe seam; tests inject scripted implementations.
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self) -> Result<(), String>;
}

/// Default pinger: GET against the configured liveness endpoint.
pub struct HttpPinger {
    client: reqwest::Client,
    url: String,
}

impl HttpPinger {
    pub fn new(url: String) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    /// Use a pre-configured client (proxies, default headers).
    pub fn with_client(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl Pinger for HttpPinger {
    async fn ping(&self) -> Result<(), String> {
        let response = self
            .client
            .get(&self.url)
            .header("user-agent", "resilient-client-liveness")
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("liveness endpoint returned {}", response.status()))
        }
    }
}

/// Background loop that keeps `NetworkState` honest.
pub struct ConnectivityMonitor {
    state: Arc<NetworkState>,
    config: NetworkConfig,
    pinger: Arc<dyn Pinger>,
}

impl ConnectivityMonitor {
    pub fn new(state: Arc<NetworkState>, config: NetworkConfig) -> Self {
        let pinger = Arc::new(HttpPinger::new(config.ping_url.clone()));
        Self {
            state,
            config,
            pinger,
        }
    }

    pub fn with_pinger(
        state: Arc<NetworkState>,
        config: NetworkConfig,
        pinger: Arc<dyn Pinger>,
    ) -> Self {
        Self {
            state,
            config,
            pinger,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.ping_enabled {
            tracing::info!("Active connectivity pings disabled");
            return;
        }

        tracing::info!(
            interval_ms = self.config.ping_interval_ms,
            url = %self.config.ping_url,
            "Connectivity monitor starting"
        );

        let mut ticker = time::interval(self.config.ping_interval());
        let mut events = self.state.subscribe();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_once().await;
                }
                event = events.recv() => {
                    if matches!(event, Ok(NetworkEvent::WentOffline)) {
                        if self.reconnect(&mut shutdown).await {
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Connectivity monitor received shutdown signal, exiting");
                    break;
                }
            }
        }
    }

    /// One liveness probe under the configured deadline.
    async fn probe_once(&self) -> bool {
        let started = Instant::now();
        match time::timeout(self.config.ping_timeout(), self.pinger.ping()).await {
            Ok(Ok(())) => {
                self.state.record_rtt_sample(started.elapsed());
                self.state.report_success();
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Liveness ping failed");
                self.state.report_failure(&RequestError::Network(e));
                false
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.ping_timeout_ms,
                    "Liveness ping timed out"
                );
                self.state
                    .report_failure(&RequestError::Timeout(self.config.ping_timeout()));
                false
            }
        }
    }

    /// Backoff-spaced reconnection probes. Returns true on shutdown.
    async fn reconnect(&self, shutdown: &mut broadcast::Receiver<()>) -> bool {
        for attempt in 0..self.config.max_reconnect_attempts {
            let delay = reconnect_delay(
                attempt,
                self.config.reconnect_base_delay_ms,
                self.config.reconnect_max_delay_ms,
            );
            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = shutdown.recv() => return true,
            }

            let total = self.state.note_reconnect_attempt();
            tracing::info!(attempt = total, delay_ms = delay.as_millis() as u64, "Reconnection probe");
            if self.probe_once().await {
                return false;
            }
        }
        tracing::warn!(
            attempts = self.config.max_reconnect_attempts,
            "Reconnection attempts exhausted; continuing at ping cadence"
        );
        false
    }
}
