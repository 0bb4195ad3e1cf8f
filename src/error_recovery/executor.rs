//! Runs a recovery strategy
//!
//! Every strategy produces a [`RecoveryResult`]; errors and panics raised by a
//! caller's retry function are converted into failed results.

use crate::config::BackoffConfig;
use crate::error::{RecoveryError, Result};
use crate::error_recovery::cache::{DataCache, StateCache};
use crate::error_recovery::context::{RecoveryContext, RecoveryResult, RetryFn};
use crate::error_recovery::offline_queue::OfflineRequestQueue;
use crate::error_recovery::strategy::RecoveryStrategy;
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const NO_RETRY_FN: &str = "No retry function provided";
pub const NO_CACHED_STATE: &str = "No cached state";
pub const NO_REQUEST: &str = "No request to queue";
pub const QUEUE_REJECTED: &str = "Failed to queue request";
pub const DEGRADED_MESSAGE: &str = "Some features are temporarily unavailable";

/// Performs a full environment reload
#[async_trait]
pub trait EnvironmentReloader: Send + Sync {
    async fn reload(&self, key: &str);
}

/// Reloader for hosts without a reloadable environment
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingReloader;

#[async_trait]
impl EnvironmentReloader for LoggingReloader {
    async fn reload(&self, key: &str) {
        warn!(key = %key, "Environment reload requested (last resort)");
    }
}

/// Executes the strategy chosen by the selector
pub struct StrategyExecutor {
    backoff: BackoffConfig,
    state_cache: Arc<StateCache>,
    data_cache: Arc<DataCache>,
    offline_queue: Arc<dyn OfflineRequestQueue>,
    reloader: Arc<dyn EnvironmentReloader>,
}

impl StrategyExecutor {
    pub fn new(
        backoff: BackoffConfig,
        state_cache: Arc<StateCache>,
        data_cache: Arc<DataCache>,
        offline_queue: Arc<dyn OfflineRequestQueue>,
        reloader: Arc<dyn EnvironmentReloader>,
    ) -> Self {
        Self {
            backoff,
            state_cache,
            data_cache,
            offline_queue,
            reloader,
        }
    }

    /// Run one strategy; never panics outward
    pub async fn execute(
        &self,
        strategy: RecoveryStrategy,
        error: &RecoveryError,
        context: &RecoveryContext,
    ) -> RecoveryResult {
        match AssertUnwindSafe(self.run(strategy, error, context))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(key = %context.key, %strategy, "Recovery strategy panicked: {}", message);
                RecoveryResult::failed(strategy, RecoveryError::Panicked(message).to_string())
            }
        }
    }

    async fn run(
        &self,
        strategy: RecoveryStrategy,
        error: &RecoveryError,
        context: &RecoveryContext,
    ) -> RecoveryResult {
        match strategy {
            RecoveryStrategy::Retry => self.retry(context).await,
            RecoveryStrategy::RetryWithBackoff => self.retry_with_backoff(context).await,
            RecoveryStrategy::FallbackUi => {
                RecoveryResult::succeeded(strategy, context.fallback_data.clone())
            }
            RecoveryStrategy::GracefulDegradation => {
                debug!(key = %context.key, "Applying graceful degradation");
                let data = json!({
                    "degraded": true,
                    "message": DEGRADED_MESSAGE,
                    "error": error.message(),
                });
                RecoveryResult::succeeded(strategy, Some(data))
            }
            RecoveryStrategy::StateRestoration => self.restore_state(context).await,
            RecoveryStrategy::CacheFallback => self.cache_fallback(context).await,
            RecoveryStrategy::OfflineQueue => self.queue_for_later(context).await,
            RecoveryStrategy::ReloadComponent => self.reload_component(context).await,
            RecoveryStrategy::ReloadPage => {
                self.reloader.reload(&context.key).await;
                RecoveryResult::succeeded(strategy, None).reloaded()
            }
        }
    }

    async fn retry(&self, context: &RecoveryContext) -> RecoveryResult {
        let strategy = RecoveryStrategy::Retry;
        let Some(f) = &context.retry_fn else {
            return RecoveryResult::failed(strategy, NO_RETRY_FN);
        };

        match invoke(f, None).await {
            Ok(data) => RecoveryResult::succeeded(strategy, Some(data)),
            Err(e) => RecoveryResult::failed(strategy, e.to_string()),
        }
    }

    async fn retry_with_backoff(&self, context: &RecoveryContext) -> RecoveryResult {
        let strategy = RecoveryStrategy::RetryWithBackoff;
        let Some(f) = &context.retry_fn else {
            return RecoveryResult::failed(strategy, NO_RETRY_FN);
        };

        let backoff = BackoffConfig {
            max_retries: context.max_retries.unwrap_or(self.backoff.max_retries),
            base_delay: context.base_delay.unwrap_or(self.backoff.base_delay),
        };

        let mut attempt = 0;
        loop {
            let attempts = attempt + 1;
            let e = match invoke(f, None).await {
                Ok(data) => {
                    return RecoveryResult::succeeded(strategy, Some(data)).with_attempts(attempts)
                }
                Err(e) => e,
            };

            if attempt >= backoff.max_retries {
                return RecoveryResult::failed(strategy, e.to_string()).with_attempts(attempts);
            }

            let delay = backoff.delay_for_attempt(attempt);
            debug!(
                key = %context.key,
                attempt = attempts,
                delay = ?delay,
                error = %e,
                "Retry attempt failed, backing off"
            );

            match &context.cancellation {
                Some(token) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {
                            info!(key = %context.key, attempts, "Backoff cancelled");
                            let cancelled = RecoveryError::cancelled("backoff cancelled by caller");
                            return RecoveryResult::failed(strategy, cancelled.to_string())
                                .with_attempts(attempts);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }

            attempt += 1;
        }
    }

    async fn restore_state(&self, context: &RecoveryContext) -> RecoveryResult {
        let strategy = RecoveryStrategy::StateRestoration;
        let Some(snapshot) = self.state_cache.get(&context.key).await else {
            debug!(key = %context.key, "No cached state to restore");
            return RecoveryResult::failed(strategy, NO_CACHED_STATE);
        };

        info!(key = %context.key, "Restoring saved state");
        match &context.retry_fn {
            Some(f) => match invoke(f, Some(snapshot.state.clone())).await {
                Ok(data) => {
                    RecoveryResult::succeeded(strategy, Some(data)).with_restored_state(snapshot.state)
                }
                Err(e) => RecoveryResult::failed(strategy, e.to_string()),
            },
            None => RecoveryResult::succeeded(strategy, Some(snapshot.state)),
        }
    }

    async fn cache_fallback(&self, context: &RecoveryContext) -> RecoveryResult {
        let strategy = RecoveryStrategy::CacheFallback;
        let cache_key = context.cache_key.as_deref().unwrap_or(&context.key);

        match self.data_cache.get(cache_key).await {
            Ok(data) => RecoveryResult::succeeded(strategy, Some(data)).from_cache(),
            Err(miss) => RecoveryResult::failed(strategy, miss.to_string()),
        }
    }

    async fn queue_for_later(&self, context: &RecoveryContext) -> RecoveryResult {
        let strategy = RecoveryStrategy::OfflineQueue;
        let Some(request) = &context.request else {
            return RecoveryResult::failed(strategy, RecoveryError::queue(NO_REQUEST).to_string());
        };

        if self.offline_queue.enqueue(request.clone()).await {
            RecoveryResult::succeeded(strategy, None).queued()
        } else {
            let error = RecoveryError::queue(QUEUE_REJECTED);
            warn!(key = %context.key, method = %request.method, url = %request.url, "{}", error);
            RecoveryResult::failed(strategy, error.to_string())
        }
    }

    async fn reload_component(&self, context: &RecoveryContext) -> RecoveryResult {
        let strategy = RecoveryStrategy::ReloadComponent;
        info!(key = %context.key, "Reloading component");
        self.state_cache.remove(&context.key).await;

        match &context.retry_fn {
            Some(f) => match invoke(f, None).await {
                Ok(data) => RecoveryResult::succeeded(strategy, Some(data)).reloaded(),
                Err(e) => RecoveryResult::failed(strategy, e.to_string()),
            },
            None => RecoveryResult::succeeded(strategy, None).reloaded(),
        }
    }
}

/// Call a retry function, turning a panic into an error
async fn invoke(f: &RetryFn, snapshot: Option<Value>) -> Result<Value> {
    let f = f.clone();
    match AssertUnwindSafe(async move { f(snapshot).await })
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => Err(RecoveryError::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
