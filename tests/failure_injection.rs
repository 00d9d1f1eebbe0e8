//! Failure injection tests for the resilience engine, driven under
//! virtual time with a scripted transport.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use resilient_client::{
    CancelToken, CircuitState, EngineConfig, RequestError, RequestOptions,
    ResilientRequestExecutor, ResponseSource, RetryDelay, Shutdown, TransportError,
};

mod common;
use common::ScriptedTransport;

const TARGET: &str = "https://api.example.com/v1/chat";
const KEY: &str = "api.example.com";

/// Engine config with background noise disabled so scenarios control
/// every transition themselves.
fn quiet_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.network.ping_enabled = false;
    config.network.offline_failure_threshold = 1_000;
    config.retry.jitter_ms = 0;
    config
}

fn executor(config: EngineConfig, transport: Arc<ScriptedTransport>) -> ResilientRequestExecutor {
    ResilientRequestExecutor::builder(config)
        .transport(transport)
        .build()
}

fn no_retry() -> RequestOptions {
    RequestOptions {
        max_retries: Some(0),
        ..RequestOptions::default()
    }
}

#[tokio::test(start_paused = true)]
async fn breaker_opens_fails_fast_then_half_opens() {
    let transport = Arc::new(ScriptedTransport::new());
    for _ in 0..3 {
        transport.push_err(TransportError::Network("connection refused".into()));
    }

    let mut config = quiet_config();
    config.breaker.failure_threshold = 3;
    config.breaker.reset_timeout_ms = 1_000;
    config.breaker.success_threshold = 1;
    let executor = executor(config, transport.clone());

    for _ in 0..3 {
        let outcome = executor.execute(TARGET, no_retry()).await;
        assert!(matches!(outcome.error, Some(RequestError::Network(_))));
    }
    assert_eq!(executor.breaker_state(KEY).state, CircuitState::Open);

    // t = +500ms: fail fast without touching the transport.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let calls_before = transport.call_count();
    let outcome = executor.execute(TARGET, no_retry()).await;
    assert!(matches!(outcome.error, Some(RequestError::CircuitOpen { .. })));
    assert_eq!(outcome.attempts, 0);
    assert_eq!(transport.call_count(), calls_before);

    // t = +1001ms: half-open permits a real attempt.
    tokio::time::sleep(Duration::from_millis(501)).await;
    assert_eq!(executor.breaker_state(KEY).state, CircuitState::HalfOpen);

    transport.push_ok(json!({ "answer": 42 }));
    let outcome = executor.execute(TARGET, no_retry()).await;
    assert!(outcome.is_success());
    assert_eq!(executor.breaker_state(KEY).state, CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn half_open_requires_success_threshold() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_err(TransportError::Http(500));

    let mut config = quiet_config();
    config.breaker.failure_threshold = 1;
    config.breaker.reset_timeout_ms = 1_000;
    config.breaker.success_threshold = 2;
    let executor = executor(config, transport.clone());

    let _ = executor.execute(TARGET, no_retry()).await;
    assert_eq!(executor.breaker_state(KEY).state, CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(1_001)).await;

    transport.push_ok(json!("first"));
    let _ = executor.execute(TARGET, no_retry()).await;
    let snapshot = executor.breaker_state(KEY);
    assert_eq!(snapshot.state, CircuitState::HalfOpen);
    assert_eq!(snapshot.success_count, 1);

    transport.push_ok(json!("second"));
    let _ = executor.execute(TARGET, no_retry()).await;
    let snapshot = executor.breaker_state(KEY);
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.success_count, 0);
    assert_eq!(snapshot.failure_count, 0);
}

#[tokio::test(start_paused = true)]
async fn retries_exhaust_with_doubling_delays() {
    let transport = Arc::new(ScriptedTransport::new());
    for _ in 0..3 {
        transport.push_err(TransportError::Http(503));
    }

    let executor = executor(quiet_config(), transport.clone());
    let options = RequestOptions {
        max_retries: Some(2),
        retry_delay: RetryDelay::Base(Duration::from_millis(100)),
        ..RequestOptions::default()
    };

    let started = tokio::time::Instant::now();
    let outcome = executor.execute(TARGET, options).await;
    let elapsed = started.elapsed();

    // 1 initial + 2 retries, with delays of 100ms and 200ms between.
    assert_eq!(outcome.attempts, 3);
    assert_eq!(transport.call_count(), 3);
    assert!(matches!(outcome.error, Some(RequestError::Server { status: 503 })));
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_millis(320));
}

#[tokio::test(start_paused = true)]
async fn client_errors_are_not_retried() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_err(TransportError::Http(404));

    let executor = executor(quiet_config(), transport.clone());
    let outcome = executor.execute(TARGET, RequestOptions::default()).await;

    assert_eq!(outcome.attempts, 1);
    assert_eq!(transport.call_count(), 1);
    assert!(matches!(outcome.error, Some(RequestError::Client { status: 404 })));
    assert_eq!(executor.breaker_state(KEY).failure_count, 1);
}

#[tokio::test(start_paused = true)]
async fn stale_while_revalidate_serves_once_and_refreshes() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_ok(json!("v1"));

    let executor = executor(quiet_config(), transport.clone());
    let options = || RequestOptions {
        cache_key: Some("models".into()),
        cache_max_age: Some(Duration::from_millis(5_000)),
        stale_while_revalidate: true,
        ..RequestOptions::default()
    };

    let outcome = executor.execute(TARGET, options()).await;
    assert_eq!(outcome.data, Some(json!("v1")));
    assert_eq!(outcome.source, ResponseSource::Network);

    // Past the freshness window: the stale value comes back immediately
    // while a background refresh replaces it.
    tokio::time::sleep(Duration::from_millis(6_000)).await;
    transport.push_ok(json!("v2"));

    let outcome = executor.execute(TARGET, options()).await;
    assert_eq!(outcome.source, ResponseSource::StaleCache);
    assert_eq!(outcome.data, Some(json!("v1")));
    assert_eq!(outcome.attempts, 0);

    // Let the detached refresh land.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.call_count(), 2);

    let outcome = executor.execute(TARGET, options()).await;
    assert_eq!(outcome.source, ResponseSource::Cache);
    assert_eq!(outcome.data, Some(json!("v2")));
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn offline_queue_flushes_in_fifo_order() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_ok(json!("a-response"));
    transport.push_ok(json!("b-response"));

    let executor = executor(quiet_config(), transport.clone());
    executor.network().set_online(false);

    let queued = |_name: &str| RequestOptions {
        queue_if_offline: true,
        ..RequestOptions::default()
    };

    let a = executor
        .execute("https://api.example.com/a", queued("a"))
        .await;
    let b = executor
        .execute("https://api.example.com/b", queued("b"))
        .await;
    assert_eq!(a.source, ResponseSource::Queued);
    assert_eq!(b.source, ResponseSource::Queued);
    assert_eq!(transport.call_count(), 0);

    executor.network().set_online(true);
    executor.flush_queue().await;

    let a_outcome = a.pending.unwrap().outcome().await.unwrap();
    let b_outcome = b.pending.unwrap().outcome().await.unwrap();
    assert_eq!(a_outcome.data, Some(json!("a-response")));
    assert_eq!(b_outcome.data, Some(json!("b-response")));
}

#[tokio::test(start_paused = true)]
async fn reconnect_event_triggers_background_flush() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_ok(json!("deferred"));

    let executor = executor(quiet_config(), transport.clone());
    let shutdown = Shutdown::new();
    let tasks = executor.spawn_background(&shutdown);

    executor.network().set_online(false);
    let queued = executor
        .execute(
            TARGET,
            RequestOptions {
                queue_if_offline: true,
                ..RequestOptions::default()
            },
        )
        .await;

    executor.network().set_online(true);
    let outcome = queued.pending.unwrap().outcome().await.unwrap();
    assert_eq!(outcome.data, Some(json!("deferred")));

    shutdown.trigger();
    for task in tasks {
        let _ = task.await;
    }
}

#[tokio::test(start_paused = true)]
async fn offline_without_queue_uses_fallback_then_error() {
    let transport = Arc::new(ScriptedTransport::new());
    let executor = executor(quiet_config(), transport.clone());
    executor.network().set_online(false);

    let outcome = executor
        .execute(
            TARGET,
            RequestOptions {
                offline_fallback: Some(json!("draft")),
                ..RequestOptions::default()
            },
        )
        .await;
    assert_eq!(outcome.data, Some(json!("draft")));
    assert_eq!(outcome.source, ResponseSource::Fallback);

    let outcome = executor.execute(TARGET, RequestOptions::default()).await;
    assert!(matches!(outcome.error, Some(RequestError::Offline)));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn abort_is_excluded_from_breaker_accounting() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_delayed_ok(Duration::from_secs(10), json!("late"));

    let executor = executor(quiet_config(), transport.clone());
    let token = CancelToken::new();
    let options = RequestOptions {
        cancel: Some(token.clone()),
        ..RequestOptions::default()
    };

    let run = {
        let executor = executor.clone();
        tokio::spawn(async move { executor.execute(TARGET, options).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();

    let outcome = run.await.unwrap();
    assert!(matches!(outcome.error, Some(RequestError::Aborted)));
    assert_eq!(outcome.attempts, 1);

    let snapshot = executor.breaker_state(KEY);
    assert_eq!(snapshot.failure_count, 0);
    assert_eq!(snapshot.success_count, 0);
}

#[tokio::test(start_paused = true)]
async fn network_first_falls_back_to_cached_data() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_ok(json!("v1"));

    let executor = executor(quiet_config(), transport.clone());
    let options = || RequestOptions {
        cache_key: Some("profile".into()),
        network_first: true,
        max_retries: Some(0),
        ..RequestOptions::default()
    };

    let outcome = executor.execute(TARGET, options()).await;
    assert!(outcome.is_success());

    transport.push_err(TransportError::Http(500));
    let outcome = executor.execute(TARGET, options()).await;
    assert_eq!(outcome.source, ResponseSource::Fallback);
    assert_eq!(outcome.data, Some(json!("v1")));
    assert!(matches!(outcome.error, Some(RequestError::Server { .. })));
}

#[tokio::test(start_paused = true)]
async fn retry_entry_point_reopens_a_tripped_breaker() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_err(TransportError::Network("down".into()));

    let mut config = quiet_config();
    config.breaker.failure_threshold = 1;
    config.breaker.reset_timeout_ms = 60_000;
    config.breaker.success_threshold = 1;
    let executor = executor(config, transport.clone());

    let _ = executor.execute(TARGET, no_retry()).await;
    assert_eq!(executor.breaker_state(KEY).state, CircuitState::Open);

    // execute() still fails fast, but retry() forces a probe window.
    transport.push_ok(json!("recovered"));
    let outcome = executor.retry(TARGET, no_retry()).await;
    assert!(outcome.is_success());
    assert_eq!(executor.breaker_state(KEY).state, CircuitState::Closed);
}
