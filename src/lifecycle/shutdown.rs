//! Shutdown coordination for engine background tasks.

use tokio::sync::broadcast;

/// Coordinator for stopping the engine's background loops.
///
/// Every long-running task holds a receiver and exits when the signal
/// fires. Dropping the coordinator without triggering leaves tasks
/// running for the process lifetime, which is the default for a
/// client-side engine.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal all subscribed tasks to stop.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
