//! End-to-end recovery scenarios through the manager

use pretty_assertions::assert_eq;
use resilience_engine::error_recovery::{
    ConnectivityMonitor, DefaultNetworkClassifier, InMemoryOfflineQueue, OfflineRequest,
    RecoveryStatistics, Telemetry, TelemetryLevel, TelemetryRecord,
};
use resilience_engine::{
    ErrorRecoveryManager, RecoveryContext, RecoveryError, RecoveryStrategy, ResilienceConfig,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingTelemetry {
    records: Mutex<Vec<TelemetryRecord>>,
}

impl Telemetry for RecordingTelemetry {
    fn log_error(&self, _error: &RecoveryError, record: &TelemetryRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}

fn failing_context(key: &str) -> RecoveryContext {
    RecoveryContext::new(key).with_retry_fn(|_| async { Err(RecoveryError::internal("nope")) })
}

#[tokio::test]
async fn test_open_circuit_selects_fallback_or_degradation() {
    let manager = ErrorRecoveryManager::default();
    let error = RecoveryError::internal("crash");

    for _ in 0..5 {
        let result = manager
            .execute_strategy(RecoveryStrategy::Retry, &error, failing_context("Dashboard"))
            .await;
        assert!(!result.success);
    }

    assert!(!manager.can_attempt_recovery("Dashboard").await);

    let with_fallback = manager
        .recover_from_error(
            &error,
            failing_context("Dashboard").with_fallback(json!({"widgets": []})),
        )
        .await;
    assert_eq!(with_fallback.strategy, RecoveryStrategy::FallbackUi);
    assert_eq!(with_fallback.data, Some(json!({"widgets": []})));

    let without_fallback = manager
        .recover_from_error(&error, failing_context("Dashboard"))
        .await;
    assert_eq!(
        without_fallback.strategy,
        RecoveryStrategy::GracefulDegradation
    );
    assert!(without_fallback.success);
    assert_eq!(without_fallback.data.unwrap()["degraded"], json!(true));
}

#[tokio::test]
async fn test_state_restoration_without_snapshot() {
    let manager = ErrorRecoveryManager::default();
    let result = manager
        .execute_strategy(
            RecoveryStrategy::StateRestoration,
            &RecoveryError::component("Editor", "crash"),
            failing_context("Editor"),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("No cached state"));
}

#[tokio::test]
async fn test_snapshot_passed_unchanged_to_retry_fn() {
    let manager = ErrorRecoveryManager::default();
    let snapshot = json!({"draft": "hello", "cursor": [3, 7]});
    manager
        .save_component_state("Editor", snapshot.clone())
        .await;

    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let context = RecoveryContext::new("Editor")
        .component_error()
        .with_retry_count(1)
        .with_retry_fn(move |state: Option<Value>| {
            let sink = sink.clone();
            async move {
                *sink.lock().unwrap() = state.clone();
                Ok(json!("restored"))
            }
        });

    let result = manager
        .recover_from_error(&RecoveryError::component("Editor", "crash"), context)
        .await;

    assert_eq!(result.strategy, RecoveryStrategy::StateRestoration);
    assert!(result.success);
    assert_eq!(result.restored_state, Some(snapshot.clone()));
    assert_eq!(seen.lock().unwrap().clone(), Some(snapshot));
}

#[tokio::test]
async fn test_offline_request_is_queued() {
    let connectivity = ConnectivityMonitor::new();
    connectivity.set_online(false);
    let queue = Arc::new(InMemoryOfflineQueue::new(Default::default()));
    let manager = ErrorRecoveryManager::builder()
        .classifier(Arc::new(DefaultNetworkClassifier::new(connectivity)))
        .offline_queue(queue.clone())
        .build();

    let request = OfflineRequest::new("POST", "/api/x").with_data(json!({"a": 1}));
    let result = manager
        .recover_from_error(
            &RecoveryError::network("Network Error"),
            RecoveryContext::new("Apply").with_request(request),
        )
        .await;

    assert_eq!(result.strategy, RecoveryStrategy::OfflineQueue);
    assert!(result.success);
    assert!(result.queued);
    assert_eq!(queue.len().await, 1);
}

#[tokio::test]
async fn test_network_backoff_recovers() {
    tokio::time::pause();
    let manager = ErrorRecoveryManager::default();
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    let context = RecoveryContext::new("Jobs")
        .with_backoff(3, Duration::from_millis(100))
        .with_retry_fn(move |_| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RecoveryError::timeout("slow"))
                } else {
                    Ok(json!(["job"]))
                }
            }
        });

    let result = manager
        .recover_from_error(&RecoveryError::timeout("slow"), context)
        .await;

    assert_eq!(result.strategy, RecoveryStrategy::RetryWithBackoff);
    assert!(result.success);
    assert_eq!(result.attempts, Some(3));
}

#[tokio::test]
async fn test_backoff_exhaustion_fails() {
    tokio::time::pause();
    let manager = ErrorRecoveryManager::default();
    let context = failing_context("Search").with_backoff(3, Duration::from_millis(100));

    let result = manager
        .recover_from_error(&RecoveryError::http(502, "bad gateway"), context)
        .await;

    assert_eq!(result.strategy, RecoveryStrategy::RetryWithBackoff);
    assert!(!result.success);
    assert_eq!(result.attempts, Some(4));
}

#[tokio::test]
async fn test_cache_fallback_after_retry_budget() {
    let manager = ErrorRecoveryManager::default();
    manager
        .cache_data_for_fallback("jobs:page1", json!([1, 2]), None)
        .await;

    let context = failing_context("Jobs")
        .with_retry_count(3)
        .with_cache_key("jobs:page1")
        .with_has_cache(true);
    let result = manager
        .recover_from_error(&RecoveryError::http(500, "down"), context)
        .await;

    assert_eq!(result.strategy, RecoveryStrategy::CacheFallback);
    assert!(result.from_cache);
    assert_eq!(result.data, Some(json!([1, 2])));
}

#[tokio::test]
async fn test_expired_cache_reports_expiry() {
    tokio::time::pause();
    let manager = ErrorRecoveryManager::default();
    manager
        .cache_data_for_fallback("feed", json!("stale"), Some(Duration::from_millis(200)))
        .await;

    let context = RecoveryContext::new("Feed").with_cache_key("feed");
    let fresh = manager
        .execute_strategy(
            RecoveryStrategy::CacheFallback,
            &RecoveryError::http(500, "x"),
            context.clone(),
        )
        .await;
    assert!(fresh.success);

    tokio::time::advance(Duration::from_millis(201)).await;
    let expired = manager
        .execute_strategy(
            RecoveryStrategy::CacheFallback,
            &RecoveryError::http(500, "x"),
            context,
        )
        .await;
    assert!(!expired.success);
    assert_eq!(expired.error.as_deref(), Some("Cache expired"));
}

#[tokio::test]
async fn test_telemetry_and_callbacks() {
    let telemetry = Arc::new(RecordingTelemetry::default());
    let manager = ErrorRecoveryManager::builder()
        .telemetry(telemetry.clone())
        .build();

    let successes = Arc::new(AtomicU32::new(0));
    let failures = Arc::new(AtomicU32::new(0));
    let (s, f) = (successes.clone(), failures.clone());

    let context = failing_context("Widget")
        .with_retry_count(1)
        .on_success(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        })
        .on_failure(move |result| {
            assert!(!result.success);
            f.fetch_add(1, Ordering::SeqCst);
        });

    manager
        .recover_from_error(&RecoveryError::internal("x"), context)
        .await;

    assert_eq!(successes.load(Ordering::SeqCst), 0);
    assert_eq!(failures.load(Ordering::SeqCst), 1);

    let records = telemetry.records.lock().unwrap().clone();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].component, "Widget");
    assert_eq!(records[0].strategy, RecoveryStrategy::Retry);
    assert_eq!(records[0].level, TelemetryLevel::Warning);
    assert_eq!(records[0].retry_count, 1);
    assert!(!records[0].success);
}

#[tokio::test]
async fn test_panicking_callback_does_not_lose_result() {
    let manager = ErrorRecoveryManager::default();
    let context = RecoveryContext::new("Toast")
        .with_retry_fn(|_| async { Ok(json!("shown")) })
        .on_success(|_| panic!("callback exploded"));

    let result = manager
        .execute_strategy(RecoveryStrategy::Retry, &RecoveryError::internal("x"), context)
        .await;

    assert!(result.success);
    assert_eq!(result.data, Some(json!("shown")));
    let history = manager.key_statistics("Toast").await.history.unwrap();
    assert_eq!(history.successes, 1);
}

#[tokio::test]
async fn test_statistics_totals() {
    let manager = ErrorRecoveryManager::new(ResilienceConfig::default());
    let error = RecoveryError::internal("x");

    manager
        .execute_strategy(RecoveryStrategy::FallbackUi, &error, RecoveryContext::new("a"))
        .await;
    manager
        .execute_strategy(RecoveryStrategy::Retry, &error, failing_context("a"))
        .await;
    manager
        .execute_strategy(
            RecoveryStrategy::GracefulDegradation,
            &error,
            RecoveryContext::new("b"),
        )
        .await;

    let RecoveryStatistics::Overall(stats) = manager.get_recovery_statistics(None).await else {
        panic!("expected overall statistics");
    };

    assert_eq!(stats.total_attempts, 3);
    assert_eq!(stats.total_successes, 2);
    assert_eq!(stats.total_failures, 1);
    assert!((stats.success_rate - 2.0 / 3.0).abs() < f64::EPSILON);
    assert_eq!(stats.keys["a"].success_rate, 0.5);
    assert_eq!(stats.keys["b"].success_rate, 1.0);
}

#[tokio::test]
async fn test_concurrent_recoveries_keep_counters_consistent() {
    let manager = ErrorRecoveryManager::default();
    let mut handles = Vec::new();

    for i in 0..32u32 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            let context = RecoveryContext::new("shared").with_retry_fn(move |_| async move {
                if i % 2 == 0 {
                    Ok(json!(i))
                } else {
                    Err(RecoveryError::internal("odd"))
                }
            });
            manager
                .execute_strategy(RecoveryStrategy::Retry, &RecoveryError::internal("x"), context)
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let history = manager.key_statistics("shared").await.history.unwrap();
    assert_eq!(history.attempts, 32);
    assert_eq!(history.successes, 16);
    assert_eq!(history.failures, 16);
}
