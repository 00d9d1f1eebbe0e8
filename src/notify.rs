//! State-change notification seam.
//!
//! # Design Decisions
//! - The notifier is injected at engine construction; absence is a
//!   no-op implementation, not a runtime capability check
//! - Notification is best-effort and must never block state mutation
//! - Rendering (toasts, banners, pages) belongs to the consumer

/// How urgent an event is for a consuming UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// The state transitions the engine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    BreakerOpened,
    BreakerClosed,
    WentOffline,
    CameOnline,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::BreakerOpened => "breaker_opened",
            EventKind::BreakerClosed => "breaker_closed",
            EventKind::WentOffline => "went_offline",
            EventKind::CameOnline => "came_online",
        }
    }
}

/// A structured state-change event.
#[derive(Debug, Clone)]
pub struct StateChangeEvent {
    pub kind: EventKind,
    /// Service key for breaker events; `None` for connectivity events.
    pub service: Option<String>,
    pub severity: Severity,
}

impl StateChangeEvent {
    pub fn breaker_opened(service: &str) -> Self {
        Self {
            kind: EventKind::BreakerOpened,
            service: Some(service.to_string()),
            severity: Severity::Warning,
        }
    }

    pub fn breaker_closed(service: &str) -> Self {
        Self {
            kind: EventKind::BreakerClosed,
            service: Some(service.to_string()),
            severity: Severity::Info,
        }
    }

    pub fn went_offline() -> Self {
        Self {
            kind: EventKind::WentOffline,
            service: None,
            severity: Severity::Warning,
        }
    }

    pub fn came_online() -> Self {
        Self {
            kind: EventKind::CameOnline,
            service: None,
            severity: Severity::Info,
        }
    }
}

/// Receiver of engine state-change events.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: StateChangeEvent);
}

/// Default notifier: does nothing.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: StateChangeEvent) {}
}

/// Notifier that forwards events to the tracing subscriber.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: StateChangeEvent) {
        match event.severity {
            Severity::Info => tracing::info!(
                kind = event.kind.as_str(),
                service = event.service.as_deref(),
                "state change"
            ),
            Severity::Warning => tracing::warn!(
                kind = event.kind.as_str(),
                service = event.service.as_deref(),
                "state change"
            ),
            Severity::Error => tracing::error!(
                kind = event.kind.as_str(),
                service = event.service.as_deref(),
                "state change"
            ),
        }
    }
}
