//! Resilient request execution.
//!
//! # Data Flow
//! ```text
//! execute(target, options):
//!     → circuit breaker check (fail fast when open)
//!     → cache read (unless network-first)
//!     → offline check (queue / fallback / error)
//!     → transport attempts under a deadline, backoff between retries
//!     → on the final verdict: breaker update, cache write-through,
//!       passive connectivity signal
//! ```
//!
//! # Design Decisions
//! - The public boundary never returns `Err`; outcomes carry error state
//! - The breaker sees one verdict per logical request, never
//!   intermediate retry failures
//! - Cancellation wins over any in-flight attempt or pending delay and
//!   leaves the breaker untouched

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::time::sleep;
use url::Url;

use crate::cache::{CacheLookup, ResponseCache};
use crate::config::schema::EngineConfig;
use crate::error::RequestError;
use crate::health::active::{ConnectivityMonitor, Pinger};
use crate::health::state::{NetworkEvent, NetworkState, NetworkStatus};
use crate::lifecycle::Shutdown;
use crate::notify::{Notifier, NoopNotifier};
use crate::observability::metrics;
use crate::queue::{OfflineRequestQueue, PendingRequest};
use crate::resilience::backoff::BackoffPolicy;
use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitBreakerRegistry, CircuitState};
use crate::resilience::retries::{classify_transport, counts_for_breaker, is_retryable, RetryDelay};
use crate::resilience::timeouts;
use crate::transport::{HttpTransport, Transport};

/// Where an outcome's data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    StaleCache,
    Fallback,
    Queued,
}

/// Uniform result shape returned to callers. Failures are data, never
/// panics or `Err`.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub data: Option<Value>,
    pub error: Option<RequestError>,
    /// Transport attempts made for this request (0 when served without one).
    pub attempts: u32,
    pub source: ResponseSource,
    /// Set when the request was queued for later execution.
    pub pending: Option<PendingRequest>,
}

impl ExecutionOutcome {
    pub(crate) fn success(data: Value, attempts: u32, source: ResponseSource) -> Self {
        Self {
            data: Some(data),
            error: None,
            attempts,
            source,
            pending: None,
        }
    }

    pub(crate) fn failure(error: RequestError, attempts: u32) -> Self {
        Self {
            data: None,
            error: Some(error),
            attempts,
            source: ResponseSource::Network,
            pending: None,
        }
    }

    pub(crate) fn queued(pending: PendingRequest) -> Self {
        Self {
            data: None,
            error: None,
            attempts: 0,
            source: ResponseSource::Queued,
            pending: Some(pending),
        }
    }

    pub fn is_success(&self) -> bool {
        self.data.is_some() && self.error.is_none()
    }
}

/// Caller-held handle that aborts a request and its pending retries.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        // The sender cannot drop while `self` borrows it.
        std::future::pending::<()>().await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-request knobs recognized by the executor.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Breaker key; defaults to the target URL's host.
    pub service_key: Option<String>,
    /// JSON payload; `None` issues a read.
    pub body: Option<Value>,
    pub cache_key: Option<String>,
    /// Freshness window; defaults to the engine's cache config.
    pub cache_max_age: Option<Duration>,
    pub stale_while_revalidate: bool,
    /// Skip the cache read and go to the network first.
    pub network_first: bool,
    /// Value served when offline and not queueing.
    pub offline_fallback: Option<Value>,
    pub queue_if_offline: bool,
    /// Per-attempt deadline; defaults to the engine's retry config.
    pub request_timeout: Option<Duration>,
    /// Retry budget; defaults to the engine's retry config.
    pub max_retries: Option<u32>,
    pub retry_delay: RetryDelay,
    pub cancel: Option<CancelToken>,
}

/// The orchestrator: consults breaker, cache, and network status,
/// executes transport calls, classifies failures, and retries.
#[derive(Clone)]
pub struct ResilientRequestExecutor {
    transport: Arc<dyn Transport>,
    breakers: Arc<CircuitBreakerRegistry>,
    cache: Arc<ResponseCache>,
    network: Arc<NetworkState>,
    queue: Arc<OfflineRequestQueue>,
    backoff: Arc<BackoffPolicy>,
    pinger: Option<Arc<dyn Pinger>>,
    config: EngineConfig,
}

/// Assembles an executor and its shared components.
pub struct ExecutorBuilder {
    config: EngineConfig,
    transport: Option<Arc<dyn Transport>>,
    notifier: Arc<dyn Notifier>,
    pinger: Option<Arc<dyn Pinger>>,
    backoff_seed: Option<u64>,
}

impl ExecutorBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn pinger(mut self, pinger: Arc<dyn Pinger>) -> Self {
        self.pinger = Some(pinger);
        self
    }

    /// Deterministic backoff jitter for tests.
    pub fn backoff_seed(mut self, seed: u64) -> Self {
        self.backoff_seed = Some(seed);
        self
    }

    pub fn build(self) -> ResilientRequestExecutor {
        let retry = &self.config.retry;
        let backoff = match self.backoff_seed {
            Some(seed) => BackoffPolicy::seeded(
                retry.base_delay(),
                retry.max_delay(),
                Duration::from_millis(retry.jitter_ms),
                seed,
            ),
            None => BackoffPolicy::new(
                retry.base_delay(),
                retry.max_delay(),
                Duration::from_millis(retry.jitter_ms),
            ),
        };

        ResilientRequestExecutor {
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(HttpTransport::new())),
            breakers: Arc::new(CircuitBreakerRegistry::new(
                self.config.breaker.clone(),
                self.notifier.clone(),
            )),
            cache: Arc::new(ResponseCache::new()),
            network: Arc::new(NetworkState::new(&self.config.network, self.notifier)),
            queue: Arc::new(OfflineRequestQueue::new(self.config.queue.max_depth)),
            backoff: Arc::new(backoff),
            pinger: self.pinger,
            config: self.config,
        }
    }
}

impl ResilientRequestExecutor {
    pub fn builder(config: EngineConfig) -> ExecutorBuilder {
        ExecutorBuilder {
            config,
            transport: None,
            notifier: Arc::new(NoopNotifier),
            pinger: None,
            backoff_seed: None,
        }
    }

    /// Default engine over the reqwest transport.
    pub fn new(config: EngineConfig) -> Self {
        Self::builder(config).build()
    }

    /// Spawn the connectivity monitor and the queue flusher.
    pub fn spawn_background(&self, shutdown: &Shutdown) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        let monitor = match &self.pinger {
            Some(pinger) => ConnectivityMonitor::with_pinger(
                self.network.clone(),
                self.config.network.clone(),
                pinger.clone(),
            ),
            None => ConnectivityMonitor::new(self.network.clone(), self.config.network.clone()),
        };
        handles.push(tokio::spawn(monitor.run(shutdown.subscribe())));

        let this = self.clone();
        let mut events = self.network.subscribe();
        let mut stop = shutdown.subscribe();
        handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(NetworkEvent::CameOnline) => this.flush_queue().await,
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = stop.recv() => break,
                }
            }
        }));

        handles
    }

    /// Execute one logical request. Never returns `Err` or panics.
    pub async fn execute(&self, target: &str, options: RequestOptions) -> ExecutionOutcome {
        if options.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return ExecutionOutcome::failure(RequestError::Aborted, 0);
        }

        let key = options
            .service_key
            .clone()
            .unwrap_or_else(|| service_key(target));

        // Fail fast on an open circuit; cache and network stay untouched.
        let breaker = self.breakers.state(&key);
        if breaker.state == CircuitState::Open {
            metrics::record_fail_fast(&key);
            tracing::debug!(service = %key, "circuit open; failing fast");
            return ExecutionOutcome::failure(
                RequestError::CircuitOpen {
                    key,
                    retry_in: breaker.retry_in(),
                },
                0,
            );
        }

        let cache_enabled = self.config.cache.enabled;
        let max_age = options
            .cache_max_age
            .unwrap_or_else(|| self.config.cache.default_max_age());

        if let Some(cache_key) = options.cache_key.as_deref() {
            if cache_enabled && !options.network_first {
                match self
                    .cache
                    .lookup(cache_key, max_age, options.stale_while_revalidate)
                {
                    CacheLookup::Fresh(data) => {
                        metrics::record_request_outcome(&key, "cache");
                        return ExecutionOutcome::success(data, 0, ResponseSource::Cache);
                    }
                    CacheLookup::Stale(data) => {
                        tracing::debug!(
                            service = %key,
                            cache_key,
                            "serving stale value; refreshing in background"
                        );
                        self.spawn_revalidate(target, &options);
                        metrics::record_request_outcome(&key, "stale_cache");
                        return ExecutionOutcome::success(data, 0, ResponseSource::StaleCache);
                    }
                    CacheLookup::Miss => {}
                }
            }
        }

        if !self.network.is_online() {
            if options.queue_if_offline && self.config.queue.enabled {
                if let Some(pending) = self.queue.enqueue(target, options.clone()) {
                    metrics::record_request_outcome(&key, "queued");
                    return ExecutionOutcome::queued(pending);
                }
            }
            if let Some(fallback) = options.offline_fallback.clone() {
                metrics::record_request_outcome(&key, "offline_fallback");
                return ExecutionOutcome {
                    data: Some(fallback),
                    error: None,
                    attempts: 0,
                    source: ResponseSource::Fallback,
                    pending: None,
                };
            }
            metrics::record_request_outcome(&key, "offline");
            return ExecutionOutcome::failure(RequestError::Offline, 0);
        }

        let outcome = self.run_attempts(target, &key, &options).await;

        // Network-first requests fall back to whatever the cache holds.
        let failed = outcome.error.is_some() && !matches!(outcome.error, Some(RequestError::Aborted));
        if options.network_first && cache_enabled && failed {
            if let Some(data) = options
                .cache_key
                .as_deref()
                .and_then(|cache_key| self.cache.peek(cache_key))
            {
                tracing::debug!(
                    service = %key,
                    "network-first request failed; serving cached fallback"
                );
                return ExecutionOutcome {
                    data: Some(data),
                    error: outcome.error,
                    attempts: outcome.attempts,
                    source: ResponseSource::Fallback,
                    pending: None,
                };
            }
        }

        outcome
    }

    /// Reset the local retry budget and force the breaker to re-evaluate.
    pub async fn retry(&self, target: &str, options: RequestOptions) -> ExecutionOutcome {
        let key = options
            .service_key
            .clone()
            .unwrap_or_else(|| service_key(target));
        self.breakers.allow_probe(&key);
        self.execute(target, options).await
    }

    /// Drain the offline queue strictly in enqueue order. Entries added
    /// during the pass wait for the next one.
    pub async fn flush_queue(&self) {
        let batch = self.queue.take_batch();
        if batch.is_empty() {
            return;
        }
        tracing::info!(count = batch.len(), "flushing offline request queue");

        let mut entries = batch.into_iter();
        while let Some(request) = entries.next() {
            if !self.network.is_online() {
                let remaining: Vec<_> = std::iter::once(request).chain(entries).collect();
                tracing::warn!(
                    remaining = remaining.len(),
                    "went offline mid-flush; requeueing"
                );
                self.queue.requeue_front(remaining);
                return;
            }
            let outcome = self.execute(&request.target, request.options.clone()).await;
            request.resolve(outcome);
        }
    }

    pub fn invalidate_cache(&self, pattern: &str) -> usize {
        self.cache.invalidate_pattern(pattern)
    }

    /// Read-only breaker view for status displays.
    pub fn breaker_state(&self, key: &str) -> BreakerSnapshot {
        self.breakers.state(key)
    }

    /// Read-only connectivity snapshot for status displays.
    pub fn network_status(&self) -> Arc<NetworkStatus> {
        self.network.status()
    }

    pub fn breakers(&self) -> Arc<CircuitBreakerRegistry> {
        self.breakers.clone()
    }

    pub fn cache(&self) -> Arc<ResponseCache> {
        self.cache.clone()
    }

    pub fn network(&self) -> Arc<NetworkState> {
        self.network.clone()
    }

    pub fn queue(&self) -> Arc<OfflineRequestQueue> {
        self.queue.clone()
    }

    /// The attempt loop: one verdict for the breaker per logical request.
    async fn run_attempts(
        &self,
        target: &str,
        key: &str,
        options: &RequestOptions,
    ) -> ExecutionOutcome {
        let max_retries = options.max_retries.unwrap_or(self.config.retry.max_retries);
        let deadline = options
            .request_timeout
            .unwrap_or_else(|| self.config.retry.request_timeout());

        let mut attempt: u32 = 0;
        loop {
            self.breakers.record_attempt(key);
            let result = self.attempt_once(target, options, deadline).await;
            attempt += 1;

            match result {
                Ok(data) => {
                    self.breakers.record_success(key);
                    self.network.report_success();
                    if let Some(cache_key) = options.cache_key.as_deref() {
                        if self.config.cache.enabled {
                            self.cache.set(cache_key, data.clone(), false);
                        }
                    }
                    if attempt > 1 {
                        tracing::debug!(
                            service = %key,
                            attempts = attempt,
                            "request succeeded after retries"
                        );
                    }
                    metrics::record_request_outcome(key, "success");
                    return ExecutionOutcome::success(data, attempt, ResponseSource::Network);
                }
                Err(RequestError::Aborted) => {
                    // Excluded from breaker accounting.
                    tracing::debug!(service = %key, attempts = attempt, "request aborted");
                    metrics::record_request_outcome(key, "aborted");
                    return ExecutionOutcome::failure(RequestError::Aborted, attempt);
                }
                Err(error) => {
                    if is_retryable(&error) && attempt <= max_retries {
                        let delay = options.retry_delay.delay_for(attempt - 1, &self.backoff);
                        tracing::warn!(
                            service = %key,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "attempt failed; retrying"
                        );
                        metrics::record_retry(key);
                        if self.wait_or_abort(delay, options.cancel.as_ref()).await {
                            metrics::record_request_outcome(key, "aborted");
                            return ExecutionOutcome::failure(RequestError::Aborted, attempt);
                        }
                        continue;
                    }

                    if counts_for_breaker(&error) {
                        self.breakers.record_failure(key);
                        self.network.report_failure(&error);
                    }
                    tracing::error!(
                        service = %key,
                        attempts = attempt,
                        error = %error,
                        "request failed"
                    );
                    metrics::record_request_outcome(key, error.label());
                    return ExecutionOutcome::failure(error, attempt);
                }
            }
        }
    }

    /// One transport attempt under its deadline, racing cancellation.
    async fn attempt_once(
        &self,
        target: &str,
        options: &RequestOptions,
        deadline: Duration,
    ) -> Result<Value, RequestError> {
        let call = async {
            self.transport
                .call(target, options.body.as_ref())
                .await
                .map_err(|error| classify_transport(error, deadline))
        };
        match options.cancel.as_ref() {
            Some(token) => tokio::select! {
                result = timeouts::bounded(deadline, call) => result,
                _ = token.cancelled() => Err(RequestError::Aborted),
            },
            None => timeouts::bounded(deadline, call).await,
        }
    }

    /// Cancellable backoff sleep. Returns true when aborted.
    async fn wait_or_abort(&self, delay: Duration, cancel: Option<&CancelToken>) -> bool {
        match cancel {
            Some(token) => tokio::select! {
                _ = sleep(delay) => false,
                _ = token.cancelled() => true,
            },
            None => {
                sleep(delay).await;
                false
            }
        }
    }

    /// Detached refresh after serving a stale value.
    fn spawn_revalidate(&self, target: &str, options: &RequestOptions) {
        let this = self.clone();
        let target = target.to_string();
        let mut options = options.clone();
        options.cancel = None;
        options.network_first = true;
        options.queue_if_offline = false;
        options.offline_fallback = None;
        tokio::spawn(async move {
            let _ = this.execute(&target, options).await;
        });
    }
}

/// Default breaker key: the target URL's host.
fn service_key(target: &str) -> String {
    Url::parse(target)
        .ok()
        .and_then(|url| url.host_str().map(str::to_owned))
        .unwrap_or_else(|| target.to_string())
}
