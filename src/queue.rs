//! Offline request queueing.
//!
//! # Responsibilities
//! - Buffer requests issued while the process is offline
//! - Resolve each caller's pending handle exactly once
//! - Preserve strict enqueue order across flushes
//!
//! # Design Decisions
//! - Flushing drains a snapshot; entries added mid-flush wait for the
//!   next flush instead of interleaving into the current pass
//! - Bounded depth; enqueue past capacity is refused
//! - The executor owns flush orchestration; this module owns the data

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use crate::executor::{ExecutionOutcome, RequestOptions};
use crate::observability::metrics;

/// One deferred request waiting for connectivity.
pub struct QueuedRequest {
    pub id: Uuid,
    pub target: String,
    pub options: RequestOptions,
    pub enqueued_at: Instant,
    tx: oneshot::Sender<ExecutionOutcome>,
}

impl QueuedRequest {
    /// Resolve the caller's handle. Consumes the entry.
    pub(crate) fn resolve(self, outcome: ExecutionOutcome) {
        let _ = self.tx.send(outcome);
    }
}

/// Caller-side handle for a queued request.
pub struct PendingRequest {
    pub id: Uuid,
    rx: oneshot::Receiver<ExecutionOutcome>,
}

impl PendingRequest {
    /// Wait for the queued request to run. `None` if the engine was
    /// dropped before the flush reached it.
    pub async fn outcome(self) -> Option<ExecutionOutcome> {
        self.rx.await.ok()
    }
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest").field("id", &self.id).finish()
    }
}

/// FIFO buffer of requests deferred while offline.
pub struct OfflineRequestQueue {
    entries: Mutex<VecDeque<QueuedRequest>>,
    max_depth: usize,
}

impl OfflineRequestQueue {
    pub fn new(max_depth: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_depth,
        }
    }

    /// Buffer a request. Returns `None` when the queue is full.
    pub fn enqueue(&self, target: &str, options: RequestOptions) -> Option<PendingRequest> {
        let mut entries = self.entries.lock().expect("offline queue mutex poisoned");
        if entries.len() >= self.max_depth {
            tracing::warn!(depth = entries.len(), "offline queue full; refusing request");
            return None;
        }

        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        entries.push_back(QueuedRequest {
            id,
            target: target.to_string(),
            options,
            enqueued_at: Instant::now(),
            tx,
        });
        metrics::record_queue_depth(entries.len());
        tracing::debug!(id = %id, target, depth = entries.len(), "request queued while offline");
        Some(PendingRequest { id, rx })
    }

    /// Snapshot-drain the queue for one flush pass.
    pub fn take_batch(&self) -> Vec<QueuedRequest> {
        let mut entries = self.entries.lock().expect("offline queue mutex poisoned");
        let batch: Vec<_> = entries.drain(..).collect();
        metrics::record_queue_depth(entries.len());
        batch
    }

    /// Return unprocessed entries to the head, preserving order.
    pub fn requeue_front(&self, items: Vec<QueuedRequest>) {
        let mut entries = self.entries.lock().expect("offline queue mutex poisoned");
        for item in items.into_iter().rev() {
            entries.push_front(item);
        }
        metrics::record_queue_depth(entries.len());
    }

    pub fn depth(&self) -> usize {
        self.entries.lock().expect("offline queue mutex poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ResponseSource;
    use serde_json::json;

    #[tokio::test]
    async fn fifo_order_is_preserved() {
        let queue = OfflineRequestQueue::new(16);
        let _a = queue.enqueue("http://svc/a", RequestOptions::default()).unwrap();
        let _b = queue.enqueue("http://svc/b", RequestOptions::default()).unwrap();
        let _c = queue.enqueue("http://svc/c", RequestOptions::default()).unwrap();

        let batch = queue.take_batch();
        let targets: Vec<_> = batch.iter().map(|r| r.target.clone()).collect();
        assert_eq!(targets, ["http://svc/a", "http://svc/b", "http://svc/c"]);
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn requeue_keeps_head_position() {
        let queue = OfflineRequestQueue::new(16);
        let _a = queue.enqueue("a", RequestOptions::default()).unwrap();
        let _b = queue.enqueue("b", RequestOptions::default()).unwrap();

        let batch = queue.take_batch();
        let _c = queue.enqueue("c", RequestOptions::default()).unwrap();
        queue.requeue_front(batch);

        let order: Vec<_> = queue.take_batch().iter().map(|r| r.target.clone()).collect();
        assert_eq!(order, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn capacity_is_enforced() {
        let queue = OfflineRequestQueue::new(2);
        assert!(queue.enqueue("a", RequestOptions::default()).is_some());
        assert!(queue.enqueue("b", RequestOptions::default()).is_some());
        assert!(queue.enqueue("c", RequestOptions::default()).is_none());
    }

    #[tokio::test]
    async fn resolving_wakes_the_handle() {
        let queue = OfflineRequestQueue::new(4);
        let pending = queue.enqueue("a", RequestOptions::default()).unwrap();

        let batch = queue.take_batch();
        for request in batch {
            request.resolve(ExecutionOutcome::success(
                json!("done"),
                1,
                ResponseSource::Network,
            ));
        }

        let outcome = pending.outcome().await.unwrap();
        assert_eq!(outcome.data, Some(json!("done")));
    }

    #[tokio::test]
    async fn dropped_engine_resolves_to_none() {
        let queue = OfflineRequestQueue::new(4);
        let pending = queue.enqueue("a", RequestOptions::default()).unwrap();
        drop(queue.take_batch());
        assert!(pending.outcome().await.is_none());
    }
}
