//! Guarded execution for a single recovery key
//!
//! A [`RecoverySession`] runs an operation and, when it fails, hands the
//! failure to the manager with the session's attempt count as the retry count.
//! Callers get a value back (live, recovered, cached or fallback) or the
//! original error.

use crate::error::{RecoveryError, Result};
use crate::error_recovery::context::{retry_fn, RecoveryCallback, RecoveryContext, RecoveryResult};
use crate::error_recovery::manager::{ErrorRecoveryManager, KeyStatistics};
use crate::error_recovery::offline_queue::OfflineRequest;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, warn};

/// Default number of recovery rounds before giving up
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Per-call options for [`RecoverySession::execute_with_recovery`]
#[derive(Clone, Default)]
pub struct SessionOptions {
    /// Returned instead of an error when recovery is impossible
    pub fallback_data: Option<Value>,
    /// Successful values are cached under this key
    pub cache_key: Option<String>,
    /// Queued when the failure turns out to be connectivity
    pub request: Option<OfflineRequest>,
    /// Called with the result when a recovery attempt succeeds
    pub on_recovery_success: Option<RecoveryCallback>,
    /// Called with the result when a recovery attempt fails
    pub on_recovery_failure: Option<RecoveryCallback>,
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("fallback_data", &self.fallback_data)
            .field("cache_key", &self.cache_key)
            .field("request", &self.request)
            .field("on_recovery_success", &self.on_recovery_success.is_some())
            .field("on_recovery_failure", &self.on_recovery_failure.is_some())
            .finish()
    }
}

impl SessionOptions {
    pub fn with_fallback(mut self, data: Value) -> Self {
        self.fallback_data = Some(data);
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn with_request(mut self, request: OfflineRequest) -> Self {
        self.request = Some(request);
        self
    }

    pub fn on_recovery_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&RecoveryResult) + Send + Sync + 'static,
    {
        self.on_recovery_success = Some(Arc::new(f));
        self
    }

    pub fn on_recovery_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(&RecoveryResult) + Send + Sync + 'static,
    {
        self.on_recovery_failure = Some(Arc::new(f));
        self
    }
}

/// Recovery-aware executor bound to one key
pub struct RecoverySession {
    manager: ErrorRecoveryManager,
    key: String,
    max_retries: u32,
    attempts: AtomicU32,
    recovering: AtomicBool,
    last_error: Mutex<Option<String>>,
    last_result: Mutex<Option<RecoveryResult>>,
}

impl RecoverySession {
    pub fn new(manager: ErrorRecoveryManager, key: impl Into<String>) -> Self {
        Self::with_max_retries(manager, key, DEFAULT_MAX_RETRIES)
    }

    pub fn with_max_retries(
        manager: ErrorRecoveryManager,
        key: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            manager,
            key: key.into(),
            max_retries,
            attempts: AtomicU32::new(0),
            recovering: AtomicBool::new(false),
            last_error: Mutex::new(None),
            last_result: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Recovery rounds since the last success
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_recovering(&self) -> bool {
        self.recovering.load(Ordering::SeqCst)
    }

    pub async fn last_error(&self) -> Option<String> {
        self.last_error.lock().await.clone()
    }

    pub async fn last_result(&self) -> Option<RecoveryResult> {
        self.last_result.lock().await.clone()
    }

    /// Run `operation`, recovering through the manager on failure
    pub async fn execute_with_recovery<F, Fut>(
        &self,
        operation: F,
        options: SessionOptions,
    ) -> Result<Value>
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        if !self.can_recover().await {
            warn!(key = %self.key, "Circuit breaker open, not running operation");
            return options
                .fallback_data
                .ok_or_else(|| RecoveryError::circuit_open(self.key.clone()));
        }

        let operation = retry_fn(operation);
        let failure = match operation(None).await {
            Ok(value) => {
                if let Some(cache_key) = &options.cache_key {
                    self.cache_data(cache_key, value.clone(), None).await;
                }
                self.mark_success().await;
                return Ok(value);
            }
            Err(e) => e,
        };

        error!(key = %self.key, error = %failure, "Operation failed");
        *self.last_error.lock().await = Some(failure.to_string());

        let previous_attempts = self.attempts();
        if previous_attempts >= self.max_retries {
            error!(key = %self.key, max_retries = self.max_retries, "Max retries exceeded");
            return options.fallback_data.ok_or(failure);
        }

        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.recovering.store(true, Ordering::SeqCst);

        let has_cache = match &options.cache_key {
            Some(cache_key) => self.manager.has_cached_data(cache_key).await,
            None => false,
        };

        let mut context = RecoveryContext::new(self.key.clone())
            .with_shared_retry_fn(operation)
            .with_retry_count(previous_attempts)
            .with_has_cache(has_cache);
        if let Some(cache_key) = options.cache_key {
            context = context.with_cache_key(cache_key);
        }
        if let Some(request) = options.request {
            context = context.with_request(request);
        }
        context.on_success = options.on_recovery_success;
        context.on_failure = options.on_recovery_failure;

        let result = self.manager.recover_from_error(&failure, context).await;
        self.recovering.store(false, Ordering::SeqCst);
        *self.last_result.lock().await = Some(result.clone());

        if result.success {
            self.mark_success().await;
            return Ok(result.data.unwrap_or(Value::Null));
        }

        options.fallback_data.ok_or(failure)
    }

    pub async fn save_state(&self, state: Value) {
        self.manager.save_component_state(&self.key, state).await;
    }

    pub async fn cache_data(&self, cache_key: &str, data: Value, ttl: Option<Duration>) {
        self.manager
            .cache_data_for_fallback(cache_key, data, ttl)
            .await;
    }

    pub async fn can_recover(&self) -> bool {
        self.manager.can_attempt_recovery(&self.key).await
    }

    pub async fn statistics(&self) -> KeyStatistics {
        self.manager.key_statistics(&self.key).await
    }

    /// Clear the session's own counters; manager state is untouched
    pub async fn reset(&self) {
        self.attempts.store(0, Ordering::SeqCst);
        self.recovering.store(false, Ordering::SeqCst);
        *self.last_error.lock().await = None;
        *self.last_result.lock().await = None;
    }

    async fn mark_success(&self) {
        self.attempts.store(0, Ordering::SeqCst);
        *self.last_error.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_success_caches_value() {
        let manager = ErrorRecoveryManager::default();
        let session = RecoverySession::new(manager.clone(), "JobList");

        let value = session
            .execute_with_recovery(
                |_| async { Ok(json!(["job-1"])) },
                SessionOptions::default().with_cache_key("jobs"),
            )
            .await
            .unwrap();

        assert_eq!(value, json!(["job-1"]));
        assert!(manager.has_cached_data("jobs").await);
        assert_eq!(session.attempts(), 0);
    }

    #[tokio::test]
    async fn test_component_failure_recovered_by_retry() {
        let manager = ErrorRecoveryManager::default();
        let session = RecoverySession::new(manager, "Chart");
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let value = session
            .execute_with_recovery(
                move |_| {
                    let counter = counter.clone();
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(RecoveryError::component("Chart", "render failed"))
                        } else {
                            Ok(json!("drawn"))
                        }
                    }
                },
                SessionOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(value, json!("drawn"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(session.attempts(), 0);
        assert!(session.last_result().await.unwrap().success);
    }

    #[tokio::test]
    async fn test_recovery_callbacks_forwarded() {
        let manager = ErrorRecoveryManager::default();
        let session = RecoverySession::new(manager, "Sidebar");
        let recovered = Arc::new(AtomicU32::new(0));
        let failed = Arc::new(AtomicU32::new(0));

        let (ok, err) = (recovered.clone(), failed.clone());
        let options = SessionOptions::default()
            .on_recovery_success(move |result| {
                assert!(result.success);
                ok.fetch_add(1, Ordering::SeqCst);
            })
            .on_recovery_failure(move |_| {
                err.fetch_add(1, Ordering::SeqCst);
            });

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        session
            .execute_with_recovery(
                move |_| {
                    let counter = counter.clone();
                    async move {
                        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(RecoveryError::component("Sidebar", "render failed"))
                        } else {
                            Ok(json!("ok"))
                        }
                    }
                },
                options.clone(),
            )
            .await
            .unwrap();
        assert_eq!(recovered.load(Ordering::SeqCst), 1);
        assert_eq!(failed.load(Ordering::SeqCst), 0);

        let error = session
            .execute_with_recovery(
                |_| async { Err(RecoveryError::component("Sidebar", "broken")) },
                options,
            )
            .await
            .unwrap_err();
        assert!(error.is_component());
        assert_eq!(recovered.load(Ordering::SeqCst), 1);
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_session_returns_fallback() {
        let manager = ErrorRecoveryManager::default();
        let session = RecoverySession::with_max_retries(manager, "Feed", 0);

        let value = session
            .execute_with_recovery(
                |_| async { Err(RecoveryError::internal("broken")) },
                SessionOptions::default().with_fallback(json!([])),
            )
            .await
            .unwrap();
        assert_eq!(value, json!([]));

        let error = session
            .execute_with_recovery(
                |_| async { Err(RecoveryError::internal("broken")) },
                SessionOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, RecoveryError::Generic(_)));
        assert!(session.last_error().await.is_some());
    }
}
