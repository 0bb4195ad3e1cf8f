//! Per-call recovery input and the result shape returned for every call

use crate::error::Result;
use crate::error_recovery::offline_queue::OfflineRequest;
use crate::error_recovery::strategy::RecoveryStrategy;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Caller-supplied fallible operation; receives a restored snapshot when one is replayed
pub type RetryFn = Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Success / failure notification
pub type RecoveryCallback = Arc<dyn Fn(&RecoveryResult) + Send + Sync>;

/// Wrap an async closure as a [`RetryFn`]
pub fn retry_fn<F, Fut>(f: F) -> RetryFn
where
    F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |snapshot| f(snapshot).boxed())
}

/// Input to one recovery call
#[derive(Clone)]
pub struct RecoveryContext {
    /// Recovery key; history, breaker and snapshot are tracked under it
    pub key: String,
    pub retry_fn: Option<RetryFn>,
    pub fallback_data: Option<Value>,
    pub cache_key: Option<String>,
    pub request: Option<OfflineRequest>,
    pub retry_count: u32,
    pub has_cache: bool,
    pub has_fallback: bool,
    pub is_component_error: bool,
    pub is_network_error: bool,
    /// Overrides the configured backoff retry count
    pub max_retries: Option<u32>,
    /// Overrides the configured backoff base delay
    pub base_delay: Option<Duration>,
    pub on_success: Option<RecoveryCallback>,
    pub on_failure: Option<RecoveryCallback>,
    pub cancellation: Option<CancellationToken>,
}

impl RecoveryContext {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            retry_fn: None,
            fallback_data: None,
            cache_key: None,
            request: None,
            retry_count: 0,
            has_cache: false,
            has_fallback: false,
            is_component_error: false,
            is_network_error: false,
            max_retries: None,
            base_delay: None,
            on_success: None,
            on_failure: None,
            cancellation: None,
        }
    }

    pub fn with_retry_fn<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.retry_fn = Some(retry_fn(f));
        self
    }

    pub fn with_shared_retry_fn(mut self, f: RetryFn) -> Self {
        self.retry_fn = Some(f);
        self
    }

    /// Supply fallback data; also marks the fallback as available
    pub fn with_fallback(mut self, data: Value) -> Self {
        self.fallback_data = Some(data);
        self.has_fallback = true;
        self
    }

    pub fn with_cache_key(mut self, cache_key: impl Into<String>) -> Self {
        self.cache_key = Some(cache_key.into());
        self
    }

    pub fn with_has_cache(mut self, has_cache: bool) -> Self {
        self.has_cache = has_cache;
        self
    }

    pub fn with_request(mut self, request: OfflineRequest) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn component_error(mut self) -> Self {
        self.is_component_error = true;
        self
    }

    pub fn network_error(mut self) -> Self {
        self.is_network_error = true;
        self
    }

    pub fn with_backoff(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = Some(max_retries);
        self.base_delay = Some(base_delay);
        self
    }

    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&RecoveryResult) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: Fn(&RecoveryResult) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(f));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

impl fmt::Debug for RecoveryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryContext")
            .field("key", &self.key)
            .field("has_retry_fn", &self.retry_fn.is_some())
            .field("fallback_data", &self.fallback_data)
            .field("cache_key", &self.cache_key)
            .field("request", &self.request)
            .field("retry_count", &self.retry_count)
            .field("has_cache", &self.has_cache)
            .field("has_fallback", &self.has_fallback)
            .field("is_component_error", &self.is_component_error)
            .field("is_network_error", &self.is_network_error)
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .finish_non_exhaustive()
    }
}

/// Outcome of a recovery call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryResult {
    pub success: bool,
    pub strategy: RecoveryStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub from_cache: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub queued: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub reloaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restored_state: Option<Value>,
}

impl RecoveryResult {
    pub fn succeeded(strategy: RecoveryStrategy, data: Option<Value>) -> Self {
        Self {
            success: true,
            strategy,
            data,
            error: None,
            attempts: None,
            from_cache: false,
            queued: false,
            reloaded: false,
            restored_state: None,
        }
    }

    pub fn failed(strategy: RecoveryStrategy, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::succeeded(strategy, None)
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn from_cache(mut self) -> Self {
        self.from_cache = true;
        self
    }

    pub fn queued(mut self) -> Self {
        self.queued = true;
        self
    }

    pub fn reloaded(mut self) -> Self {
        self.reloaded = true;
        self
    }

    pub fn with_restored_state(mut self, state: Value) -> Self {
        self.restored_state = Some(state);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fallback_marks_availability() {
        let context = RecoveryContext::new("widget").with_fallback(json!({"empty": true}));
        assert!(context.has_fallback);
        assert!(!context.has_cache);
        assert_eq!(context.retry_count, 0);
    }

    #[test]
    fn test_result_serialization_skips_unset_fields() {
        let result = RecoveryResult::succeeded(RecoveryStrategy::OfflineQueue, None).queued();
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({"success": true, "strategy": "OfflineQueue", "queued": true})
        );
    }

    #[tokio::test]
    async fn test_retry_fn_receives_snapshot() {
        let f = retry_fn(|snapshot| async move { Ok(snapshot.unwrap_or(Value::Null)) });
        assert_eq!(f(Some(json!(5))).await.unwrap(), json!(5));
        assert_eq!(f(None).await.unwrap(), Value::Null);
    }
}
