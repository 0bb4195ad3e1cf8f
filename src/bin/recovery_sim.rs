//! recovery-sim - drive simulated failures through the recovery engine
//!
//! Prints each recovery result and the final statistics as pretty JSON.

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use resilience_engine::error_recovery::{
    ConnectivityMonitor, DefaultNetworkClassifier, ErrorRecoveryManager, InMemoryOfflineQueue,
    OfflineRequest, RecoveryContext, RequestExecutor, RequestPriority,
};
use resilience_engine::{logging, RecoveryError, ResilienceConfig};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Recovery engine simulator
#[derive(Parser, Debug)]
#[command(name = "recovery-sim")]
#[command(about = "Drive simulated failures through the error recovery engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "RECOVERY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    scenario: Scenario,
}

#[derive(Subcommand, Debug)]
enum Scenario {
    /// A network call that fails N times, then succeeds
    Flaky {
        /// Failures before the call succeeds
        #[arg(long, default_value_t = 2)]
        failures: u32,

        /// Backoff base delay in milliseconds
        #[arg(long, default_value_t = 100)]
        base_delay_ms: u64,
    },
    /// Fail until the circuit opens, then show fallback selection
    Circuit,
    /// Go offline and queue a write for later replay
    Offline,
}

/// Replays queued requests against nothing in particular
struct EchoExecutor;

#[async_trait]
impl RequestExecutor for EchoExecutor {
    async fn execute(&self, request: &OfflineRequest) -> resilience_engine::Result<Value> {
        Ok(json!({"replayed": format!("{} {}", request.method, request.url)}))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        ResilienceConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if cli.debug {
        config.logging.level = "debug".to_string();
    }
    config.logging.json |= cli.json;
    logging::init_logging(&config.logging)?;

    let report = match cli.scenario {
        Scenario::Flaky {
            failures,
            base_delay_ms,
        } => flaky(config, failures, Duration::from_millis(base_delay_ms)).await,
        Scenario::Circuit => circuit(config).await,
        Scenario::Offline => offline(config).await,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn flaky(config: ResilienceConfig, failures: u32, base_delay: Duration) -> Value {
    let max_retries = config.backoff.max_retries;
    let manager = ErrorRecoveryManager::new(config);
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    let context = RecoveryContext::new("flaky-fetch")
        .network_error()
        .with_backoff(max_retries, base_delay)
        .with_retry_fn(move |_| {
            let counter = counter.clone();
            async move {
                let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if call <= failures {
                    Err(RecoveryError::http(503, format!("attempt {call} unavailable")))
                } else {
                    Ok(json!({"call": call, "status": "ok"}))
                }
            }
        });

    info!(failures, "Running flaky scenario");
    let result = manager
        .recover_from_error(&RecoveryError::http(503, "initial failure"), context)
        .await;

    json!({
        "scenario": "flaky",
        "calls": calls.load(Ordering::SeqCst),
        "result": result,
        "statistics": manager.get_recovery_statistics(None).await,
    })
}

async fn circuit(config: ResilienceConfig) -> Value {
    let threshold = config.circuit_breaker.failure_threshold;
    let manager = ErrorRecoveryManager::new(config);
    let key = "circuit-demo";
    let error = RecoveryError::internal("handler crashed");

    let mut results = Vec::new();
    // Fresh calls stay on plain retry, so every round counts as a breaker failure
    for _ in 0..threshold {
        let context = RecoveryContext::new(key)
            .with_retry_fn(|_| async { Err(RecoveryError::internal("still crashing")) });
        results.push(manager.recover_from_error(&error, context).await);
    }

    let open = !manager.can_attempt_recovery(key).await;
    info!(open, "Circuit breaker state after failures");

    let with_fallback = manager
        .recover_from_error(
            &error,
            RecoveryContext::new(key).with_fallback(json!({"placeholder": true})),
        )
        .await;
    let without_fallback = manager
        .recover_from_error(&error, RecoveryContext::new(key))
        .await;

    json!({
        "scenario": "circuit",
        "circuit_open": open,
        "failures": results,
        "with_fallback": with_fallback,
        "without_fallback": without_fallback,
        "statistics": manager.get_recovery_statistics(Some(key)).await,
    })
}

async fn offline(config: ResilienceConfig) -> Value {
    let connectivity = ConnectivityMonitor::new();
    let queue = Arc::new(InMemoryOfflineQueue::new(config.offline_queue.clone()));
    let manager = ErrorRecoveryManager::builder()
        .config(config)
        .classifier(Arc::new(DefaultNetworkClassifier::new(connectivity.clone())))
        .offline_queue(queue.clone())
        .build();

    connectivity.set_online(false);
    let request = OfflineRequest::new("POST", "/api/applications")
        .with_data(json!({"job": 42}))
        .with_priority(RequestPriority::High);
    let result = manager
        .recover_from_error(
            &RecoveryError::network("Network Error"),
            RecoveryContext::new("apply-button").with_request(request),
        )
        .await;
    let queued = queue.snapshot().await;

    connectivity.set_online(true);
    let summary = queue.process_queue(&EchoExecutor).await;

    json!({
        "scenario": "offline",
        "result": result,
        "queued": queued,
        "replay": summary,
        "statistics": manager.get_recovery_statistics(Some("apply-button")).await,
    })
}
