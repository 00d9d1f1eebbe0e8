//! Circuit breaker registry for upstream service protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: service assumed down, calls fail fast
//! - Half-Open: limited probes test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: failures within the monitoring window reach threshold
//! Open → Half-Open: after the reset timeout (timer task, or lazily on read)
//! Half-Open → Closed: success_threshold consecutive successes
//! Half-Open → Open: any single failure
//! ```
//!
//! # Design Decisions
//! - One breaker per service key, created lazily, shared by every caller
//! - Per-key locking; no global lock across keys
//! - Fail-fast rejections update no counters
//! - Subscriber notification is best-effort and happens outside the
//!   per-key lock

use std::sync::{Arc, Mutex, Weak};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::schema::BreakerConfig;
use crate::notify::{Notifier, StateChangeEvent};
use crate::observability::metrics;

/// Position of one breaker's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of one breaker, taken under its lock.
#[derive(Debug, Clone)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub attempt_count: u64,
    pub last_failure: Option<Instant>,
    pub last_success: Option<Instant>,
    pub next_retry_at: Option<Instant>,
}

impl BreakerSnapshot {
    /// Time until the open circuit permits a probe, if any.
    pub fn retry_in(&self) -> Option<std::time::Duration> {
        self.next_retry_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

/// Broadcast to subscribers on every state transition.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub key: String,
    pub from: CircuitState,
    pub to: CircuitState,
}

struct BreakerEntry {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    attempt_count: u64,
    last_failure: Option<Instant>,
    last_success: Option<Instant>,
    next_retry_at: Option<Instant>,
    reopen_timer: Option<JoinHandle<()>>,
    events: broadcast::Sender<StateChange>,
}

impl BreakerEntry {
    fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            attempt_count: 0,
            last_failure: None,
            last_success: None,
            next_retry_at: None,
            reopen_timer: None,
            events,
        }
    }

    fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            failure_count: self.failure_count,
            success_count: self.success_count,
            attempt_count: self.attempt_count,
            last_failure: self.last_failure,
            last_success: self.last_success,
            next_retry_at: self.next_retry_at,
        }
    }

    fn clear_timer(&mut self) {
        if let Some(timer) = self.reopen_timer.take() {
            timer.abort();
        }
    }
}

/// A transition captured under the lock, emitted after it is released.
struct Emitted {
    change: StateChange,
    events: broadcast::Sender<StateChange>,
    notify: Option<StateChangeEvent>,
}

/// Keyed registry of circuit breakers shared by all call sites.
pub struct CircuitBreakerRegistry {
    entries: DashMap<String, Arc<Mutex<BreakerEntry>>>,
    config: BreakerConfig,
    notifier: Arc<dyn Notifier>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            notifier,
        }
    }

    fn entry(&self, key: &str) -> Arc<Mutex<BreakerEntry>> {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(BreakerEntry::new())));
        entry.clone()
    }

    /// Count one permitted transport attempt against the key.
    pub fn record_attempt(&self, key: &str) {
        let entry = self.entry(key);
        let mut entry = entry.lock().expect("breaker entry mutex poisoned");
        entry.attempt_count += 1;
    }

    /// Record the final success of a logical request.
    pub fn record_success(&self, key: &str) {
        let entry = self.entry(key);
        let emitted = {
            let mut entry = entry.lock().expect("breaker entry mutex poisoned");
            entry.last_success = Some(Instant::now());
            match entry.state {
                CircuitState::Closed => {
                    entry.failure_count = 0;
                    None
                }
                CircuitState::HalfOpen => {
                    entry.success_count += 1;
                    if entry.success_count >= self.config.success_threshold {
                        entry.clear_timer();
                        entry.state = CircuitState::Closed;
                        entry.failure_count = 0;
                        entry.success_count = 0;
                        entry.next_retry_at = None;
                        Some(Emitted {
                            change: StateChange {
                                key: key.to_string(),
                                from: CircuitState::HalfOpen,
                                to: CircuitState::Closed,
                            },
                            events: entry.events.clone(),
                            notify: Some(StateChangeEvent::breaker_closed(key)),
                        })
                    } else {
                        None
                    }
                }
                // A straggler from before the circuit opened; the timestamp
                // is recorded but the state machine ignores it.
                CircuitState::Open => None,
            }
        };
        self.emit(key, emitted);
    }

    /// Record the final failure of a logical request.
    pub fn record_failure(self: &Arc<Self>, key: &str) {
        let entry = self.entry(key);
        let emitted = {
            let mut entry = entry.lock().expect("breaker entry mutex poisoned");
            let now = Instant::now();
            match entry.state {
                CircuitState::Closed => {
                    // Failures further apart than the window do not accumulate.
                    if let Some(last) = entry.last_failure {
                        if now.duration_since(last) > self.config.monitoring_window() {
                            entry.failure_count = 0;
                        }
                    }
                    entry.failure_count += 1;
                    entry.last_failure = Some(now);
                    if entry.failure_count >= self.config.failure_threshold {
                        Some(self.open_locked(key, &mut entry, CircuitState::Closed))
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    entry.last_failure = Some(now);
                    Some(self.open_locked(key, &mut entry, CircuitState::HalfOpen))
                }
                CircuitState::Open => {
                    entry.last_failure = Some(now);
                    None
                }
            }
        };
        self.emit(key, emitted);
    }

    /// Current state, normalized if the open period has elapsed.
    pub fn state(&self, key: &str) -> BreakerSnapshot {
        let entry = self.entry(key);
        let (snapshot, emitted) = {
            let mut entry = entry.lock().expect("breaker entry mutex poisoned");
            let emitted = self.half_open_locked(key, &mut entry, false);
            (entry.snapshot(), emitted)
        };
        self.emit(key, emitted);
        snapshot
    }

    /// Reset the breaker to pristine Closed state.
    pub fn reset(&self, key: &str) {
        let entry = self.entry(key);
        let emitted = {
            let mut entry = entry.lock().expect("breaker entry mutex poisoned");
            let from = entry.state;
            entry.clear_timer();
            entry.state = CircuitState::Closed;
            entry.failure_count = 0;
            entry.success_count = 0;
            entry.attempt_count = 0;
            entry.last_failure = None;
            entry.last_success = None;
            entry.next_retry_at = None;
            (from != CircuitState::Closed).then(|| Emitted {
                change: StateChange {
                    key: key.to_string(),
                    from,
                    to: CircuitState::Closed,
                },
                events: entry.events.clone(),
                notify: Some(StateChangeEvent::breaker_closed(key)),
            })
        };
        self.emit(key, emitted);
    }

    /// Immediately open the breaker, bypassing thresholds.
    pub fn force_open(self: &Arc<Self>, key: &str) {
        let entry = self.entry(key);
        let emitted = {
            let mut entry = entry.lock().expect("breaker entry mutex poisoned");
            if entry.state == CircuitState::Open {
                None
            } else {
                let from = entry.state;
                Some(self.open_locked(key, &mut entry, from))
            }
        };
        self.emit(key, emitted);
    }

    /// Immediately close the breaker, bypassing thresholds.
    pub fn force_close(&self, key: &str) {
        let entry = self.entry(key);
        let emitted = {
            let mut entry = entry.lock().expect("breaker entry mutex poisoned");
            if entry.state == CircuitState::Closed {
                None
            } else {
                let from = entry.state;
                entry.clear_timer();
                entry.state = CircuitState::Closed;
                entry.failure_count = 0;
                entry.success_count = 0;
                entry.next_retry_at = None;
                Some(Emitted {
                    change: StateChange {
                        key: key.to_string(),
                        from,
                        to: CircuitState::Closed,
                    },
                    events: entry.events.clone(),
                    notify: Some(StateChangeEvent::breaker_closed(key)),
                })
            }
        };
        self.emit(key, emitted);
    }

    /// Manually permit probes on an open circuit (used by `retry()`).
    pub fn allow_probe(&self, key: &str) {
        let entry = self.entry(key);
        let emitted = {
            let mut entry = entry.lock().expect("breaker entry mutex poisoned");
            self.half_open_locked(key, &mut entry, true)
        };
        self.emit(key, emitted);
    }

    /// Subscribe to state transitions for one key. Dropping the
    /// receiver unsubscribes.
    pub fn subscribe(&self, key: &str) -> broadcast::Receiver<StateChange> {
        let entry = self.entry(key);
        let entry = entry.lock().expect("breaker entry mutex poisoned");
        entry.events.subscribe()
    }

    /// Remove a breaker nobody observes. Returns true if removed.
    pub fn prune(&self, key: &str) -> bool {
        self.entries
            .remove_if(key, |_, entry| {
                let entry = entry.lock().expect("breaker entry mutex poisoned");
                entry.state == CircuitState::Closed && entry.events.receiver_count() == 0
            })
            .is_some()
    }

    /// Keys with live breaker state, for status displays.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Transition to Open under the entry lock and arm the reopen timer.
    fn open_locked(
        self: &Arc<Self>,
        key: &str,
        entry: &mut BreakerEntry,
        from: CircuitState,
    ) -> Emitted {
        let reopen_at = Instant::now() + self.config.reset_timeout();
        entry.clear_timer();
        entry.state = CircuitState::Open;
        entry.success_count = 0;
        entry.next_retry_at = Some(reopen_at);
        entry.reopen_timer = Some(self.schedule_reopen(key, reopen_at));
        Emitted {
            change: StateChange {
                key: key.to_string(),
                from,
                to: CircuitState::Open,
            },
            events: entry.events.clone(),
            notify: Some(StateChangeEvent::breaker_opened(key)),
        }
    }

    /// Transition Open → Half-Open if due (or forced). Idempotent.
    fn half_open_locked(
        &self,
        key: &str,
        entry: &mut BreakerEntry,
        force: bool,
    ) -> Option<Emitted> {
        if entry.state != CircuitState::Open {
            return None;
        }
        let due = entry
            .next_retry_at
            .map(|at| Instant::now() >= at)
            .unwrap_or(false);
        if !due && !force {
            return None;
        }
        entry.clear_timer();
        entry.state = CircuitState::HalfOpen;
        entry.success_count = 0;
        entry.next_retry_at = None;
        Some(Emitted {
            change: StateChange {
                key: key.to_string(),
                from: CircuitState::Open,
                to: CircuitState::HalfOpen,
            },
            events: entry.events.clone(),
            notify: None,
        })
    }

    fn schedule_reopen(self: &Arc<Self>, key: &str, at: Instant) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep_until(at).await;
            if let Some(registry) = registry.upgrade() {
                let entry = registry.entry(&key);
                let emitted = {
                    let mut entry = entry.lock().expect("breaker entry mutex poisoned");
                    registry.half_open_locked(&key, &mut entry, false)
                };
                registry.emit(&key, emitted);
            }
        })
    }

    fn emit(&self, key: &str, emitted: Option<Emitted>) {
        let Some(emitted) = emitted else { return };
        tracing::info!(
            service = %key,
            from = %emitted.change.from,
            to = %emitted.change.to,
            "circuit breaker transition"
        );
        metrics::record_breaker_state(key, emitted.change.to);
        let _ = emitted.events.send(emitted.change);
        if let Some(event) = emitted.notify {
            self.notifier.notify(event);
        }
    }
}
