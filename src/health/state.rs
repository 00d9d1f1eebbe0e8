//! Network status state machine and quality derivation.
//!
//! # States
//! - Online: requests go to the transport
//! - Offline: requests are queued, served from fallback, or failed
//!
//! # State Transitions
//! ```text
//! Online → Offline: consecutive connection failures >= threshold
//! Offline → Online: any successful probe or request
//! ```
//!
//! # Design Decisions
//! - Status is a lock-free snapshot (arc-swap); transitions serialize
//!   through one small mutex
//! - Quality is a pure function of the snapshot fields
//! - Ping round-trips feed a rolling average, not the last sample

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::schema::NetworkConfig;
use crate::notify::{Notifier, StateChangeEvent};
use crate::observability::metrics;

/// Weight of the newest ping sample in the rolling rtt average.
const RTT_EWMA_ALPHA: f64 = 0.3;

/// Physical link class reported by the platform, when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    Wifi,
    Cellular,
    Unknown,
}

/// Effective connection generation, when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveClass {
    Slow2g,
    Mobile2g,
    Mobile3g,
    Mobile4g,
    Unknown,
}

/// Derived connection quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    Offline,
}

impl ConnectionQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionQuality::Excellent => "excellent",
            ConnectionQuality::Good => "good",
            ConnectionQuality::Fair => "fair",
            ConnectionQuality::Poor => "poor",
            ConnectionQuality::Offline => "offline",
        }
    }
}

/// Derive quality from the current snapshot fields.
pub fn derive_quality(
    is_online: bool,
    link: LinkType,
    effective: EffectiveClass,
    downlink_mbps: Option<f64>,
    rtt_ms: Option<f64>,
) -> ConnectionQuality {
    if !is_online {
        return ConnectionQuality::Offline;
    }
    if let (Some(rtt), Some(downlink)) = (rtt_ms, downlink_mbps) {
        if rtt < 100.0 && downlink > 10.0 {
            return ConnectionQuality::Excellent;
        }
    }
    match effective {
        EffectiveClass::Mobile4g => ConnectionQuality::Good,
        EffectiveClass::Mobile3g => ConnectionQuality::Fair,
        EffectiveClass::Mobile2g | EffectiveClass::Slow2g => ConnectionQuality::Poor,
        EffectiveClass::Unknown => match link {
            // Broadband-class, or no metadata at all: assume good.
            LinkType::Ethernet | LinkType::Wifi | LinkType::Unknown => ConnectionQuality::Good,
            LinkType::Cellular => ConnectionQuality::Fair,
        },
    }
}

/// One observable snapshot of connectivity.
#[derive(Debug, Clone)]
pub struct NetworkStatus {
    pub is_online: bool,
    pub link: LinkType,
    pub effective: EffectiveClass,
    pub downlink_mbps: Option<f64>,
    pub rtt_ms: Option<f64>,
    pub quality: ConnectionQuality,
    pub last_online: Option<Instant>,
    pub last_offline: Option<Instant>,
    pub reconnect_attempts: u32,
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self {
            is_online: true,
            link: LinkType::Unknown,
            effective: EffectiveClass::Unknown,
            downlink_mbps: None,
            rtt_ms: None,
            quality: ConnectionQuality::Good,
            last_online: None,
            last_offline: None,
            reconnect_attempts: 0,
        }
    }
}

/// Connectivity transitions broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    CameOnline,
    WentOffline,
    QualityChanged(ConnectionQuality),
}

/// Process-wide connectivity singleton shared by all engine components.
pub struct NetworkState {
    status: ArcSwap<NetworkStatus>,
    events: broadcast::Sender<NetworkEvent>,
    /// Serializes transitions so events match the snapshot they describe.
    write_lock: Mutex<()>,
    pub(super) consecutive_failures: AtomicU32,
    pub(super) offline_threshold: u32,
    notifier: Arc<dyn Notifier>,
}

impl NetworkState {
    pub fn new(config: &NetworkConfig, notifier: Arc<dyn Notifier>) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            status: ArcSwap::from_pointee(NetworkStatus::default()),
            events,
            write_lock: Mutex::new(()),
            consecutive_failures: AtomicU32::new(0),
            offline_threshold: config.offline_failure_threshold,
            notifier,
        }
    }

    /// Current snapshot.
    pub fn status(&self) -> Arc<NetworkStatus> {
        self.status.load_full()
    }

    pub fn is_online(&self) -> bool {
        self.status.load().is_online
    }

    /// Subscribe to connectivity transitions. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.events.subscribe()
    }

    /// Platform hook: push an OS/browser-style connectivity signal.
    pub fn set_online(&self, online: bool) {
        if online {
            self.mark_online();
        } else {
            self.mark_offline();
        }
    }

    /// Platform hook: push link metadata when the environment knows it.
    pub fn update_link_metadata(
        &self,
        link: LinkType,
        effective: EffectiveClass,
        downlink_mbps: Option<f64>,
        rtt_ms: Option<f64>,
    ) {
        let _guard = self.write_lock.lock().expect("network state mutex poisoned");
        let (before, after) = self.update_status(|status| {
            status.link = link;
            status.effective = effective;
            status.downlink_mbps = downlink_mbps;
            if rtt_ms.is_some() {
                status.rtt_ms = rtt_ms;
            }
            status.quality = derive_quality(
                status.is_online,
                status.link,
                status.effective,
                status.downlink_mbps,
                status.rtt_ms,
            );
        });
        self.emit_quality_change(before, after);
    }

    /// Fold a ping round-trip into the rolling rtt average.
    pub(crate) fn record_rtt_sample(&self, rtt: Duration) {
        metrics::record_ping_rtt(rtt);
        let sample_ms = rtt.as_secs_f64() * 1_000.0;
        let _guard = self.write_lock.lock().expect("network state mutex poisoned");
        let (before, after) = self.update_status(|status| {
            status.rtt_ms = Some(match status.rtt_ms {
                Some(avg) => RTT_EWMA_ALPHA * sample_ms + (1.0 - RTT_EWMA_ALPHA) * avg,
                None => sample_ms,
            });
            status.quality = derive_quality(
                status.is_online,
                status.link,
                status.effective,
                status.downlink_mbps,
                status.rtt_ms,
            );
        });
        self.emit_quality_change(before, after);
    }

    pub(crate) fn mark_online(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let _guard = self.write_lock.lock().expect("network state mutex poisoned");
        if self.status.load().is_online {
            return;
        }
        self.update_status(|status| {
            status.is_online = true;
            status.last_online = Some(Instant::now());
            status.reconnect_attempts = 0;
            status.quality = derive_quality(
                true,
                status.link,
                status.effective,
                status.downlink_mbps,
                status.rtt_ms,
            );
        });
        tracing::info!("connectivity restored");
        metrics::record_network_online(true);
        let _ = self.events.send(NetworkEvent::CameOnline);
        self.notifier.notify(StateChangeEvent::came_online());
    }

    pub(crate) fn mark_offline(&self) {
        let _guard = self.write_lock.lock().expect("network state mutex poisoned");
        if !self.status.load().is_online {
            return;
        }
        self.update_status(|status| {
            status.is_online = false;
            status.last_offline = Some(Instant::now());
            status.quality = ConnectionQuality::Offline;
        });
        tracing::warn!("connectivity lost");
        metrics::record_network_online(false);
        let _ = self.events.send(NetworkEvent::WentOffline);
        self.notifier.notify(StateChangeEvent::went_offline());
    }

    /// Count one reconnection probe; returns the total so far.
    pub(crate) fn note_reconnect_attempt(&self) -> u32 {
        let _guard = self.write_lock.lock().expect("network state mutex poisoned");
        let (_, after) = self.update_status(|status| {
            status.reconnect_attempts += 1;
        });
        after.reconnect_attempts
    }

    /// Swap in a mutated snapshot; returns (before, after).
    fn update_status<F>(&self, mutate: F) -> (Arc<NetworkStatus>, Arc<NetworkStatus>)
    where
        F: FnOnce(&mut NetworkStatus),
    {
        let before = self.status.load_full();
        let mut next = (*before).clone();
        mutate(&mut next);
        let after = Arc::new(next);
        self.status.store(after.clone());
        (before, after)
    }

    fn emit_quality_change(&self, before: Arc<NetworkStatus>, after: Arc<NetworkStatus>) {
        if before.quality != after.quality {
            let _ = self
                .events
                .send(NetworkEvent::QualityChanged(after.quality));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NoopNotifier;

    fn state() -> NetworkState {
        NetworkState::new(&NetworkConfig::default(), Arc::new(NoopNotifier))
    }

    #[test]
    fn quality_table() {
        use ConnectionQuality::*;
        use EffectiveClass as E;
        use LinkType as L;

        assert_eq!(derive_quality(false, L::Wifi, E::Mobile4g, None, None), Offline);
        assert_eq!(
            derive_quality(true, L::Wifi, E::Unknown, Some(50.0), Some(20.0)),
            Excellent
        );
        assert_eq!(
            derive_quality(true, L::Wifi, E::Unknown, Some(5.0), Some(20.0)),
            Good
        );
        assert_eq!(derive_quality(true, L::Cellular, E::Mobile4g, None, None), Good);
        assert_eq!(derive_quality(true, L::Cellular, E::Mobile3g, None, None), Fair);
        assert_eq!(derive_quality(true, L::Cellular, E::Slow2g, None, None), Poor);
        assert_eq!(derive_quality(true, L::Unknown, E::Unknown, None, None), Good);
    }

    #[tokio::test]
    async fn transitions_fire_events_once() {
        let state = state();
        let mut events = state.subscribe();

        state.mark_offline();
        state.mark_offline();
        assert_eq!(events.recv().await.unwrap(), NetworkEvent::WentOffline);

        state.mark_online();
        state.mark_online();
        assert_eq!(events.recv().await.unwrap(), NetworkEvent::CameOnline);

        // The duplicate transitions produced no further events.
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn rtt_average_smooths_samples() {
        let state = state();
        state.record_rtt_sample(Duration::from_millis(100));
        assert_eq!(state.status().rtt_ms, Some(100.0));

        state.record_rtt_sample(Duration::from_millis(200));
        let rtt = state.status().rtt_ms.unwrap();
        assert!(rtt > 100.0 && rtt < 200.0);
    }

    #[tokio::test]
    async fn link_metadata_reshapes_quality() {
        let state = state();
        let mut events = state.subscribe();

        state.update_link_metadata(LinkType::Cellular, EffectiveClass::Mobile3g, None, None);
        assert_eq!(state.status().quality, ConnectionQuality::Fair);
        assert_eq!(
            events.recv().await.unwrap(),
            NetworkEvent::QualityChanged(ConnectionQuality::Fair)
        );

        state.update_link_metadata(
            LinkType::Wifi,
            EffectiveClass::Unknown,
            Some(50.0),
            Some(20.0),
        );
        assert_eq!(state.status().quality, ConnectionQuality::Excellent);
    }

    #[tokio::test]
    async fn offline_snapshot_fields() {
        let state = state();
        state.mark_offline();
        let status = state.status();
        assert!(!status.is_online);
        assert_eq!(status.quality, ConnectionQuality::Offline);
        assert!(status.last_offline.is_some());
    }
}
