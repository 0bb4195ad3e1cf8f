//! Error recovery manager
//!
//! [`ErrorRecoveryManager`] owns every per-key structure the engine needs
//! (breakers, history, state snapshots, fallback data) and ties selection,
//! execution and bookkeeping together. Construct one per application and share
//! it; clones are cheap and see the same state.

use crate::config::ResilienceConfig;
use crate::error::RecoveryError;
use crate::error_recovery::cache::{DataCache, StateCache};
use crate::error_recovery::circuit_breaker::{
    CircuitBreakerListener, CircuitBreakerManager, CircuitBreakerStats, CircuitState,
};
use crate::error_recovery::classifier::{
    DefaultNetworkClassifier, ErrorClassification, NetworkErrorClassifier,
};
use crate::error_recovery::context::{RecoveryContext, RecoveryResult};
use crate::error_recovery::executor::{EnvironmentReloader, LoggingReloader, StrategyExecutor};
use crate::error_recovery::history::{HistoryRecord, RecoveryHistory};
use crate::error_recovery::offline_queue::{InMemoryOfflineQueue, OfflineRequestQueue};
use crate::error_recovery::strategy::{RecoveryStrategy, SelectionInput, StrategySelector};
use crate::error_recovery::telemetry::{
    self, Telemetry, TelemetryLevel, TelemetryRecord, TracingTelemetry, RECOVERY_ACTION,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Statistics for one recovery key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyStatistics {
    pub key: String,
    pub history: Option<HistoryRecord>,
    pub success_rate: f64,
    pub circuit_state: CircuitState,
    pub circuit: Option<CircuitBreakerStats>,
    pub has_state_snapshot: bool,
}

/// Statistics across every known key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallStatistics {
    pub keys: BTreeMap<String, KeyStatistics>,
    pub total_attempts: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub success_rate: f64,
}

/// Result of [`ErrorRecoveryManager::get_recovery_statistics`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecoveryStatistics {
    Key(KeyStatistics),
    Overall(OverallStatistics),
}

/// Strategy-selecting recovery engine
#[derive(Clone)]
pub struct ErrorRecoveryManager {
    config: Arc<ResilienceConfig>,
    breakers: Arc<CircuitBreakerManager>,
    history: Arc<RecoveryHistory>,
    state_cache: Arc<StateCache>,
    data_cache: Arc<DataCache>,
    selector: Arc<StrategySelector>,
    executor: Arc<StrategyExecutor>,
    classifier: Arc<dyn NetworkErrorClassifier>,
    telemetry: Arc<dyn Telemetry>,
}

impl Default for ErrorRecoveryManager {
    fn default() -> Self {
        Self::new(ResilienceConfig::default())
    }
}

impl ErrorRecoveryManager {
    /// Create a manager with default collaborators
    pub fn new(config: ResilienceConfig) -> Self {
        ResilienceBuilder::new().config(config).build()
    }

    pub fn builder() -> ResilienceBuilder {
        ResilienceBuilder::new()
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// Pick and run a strategy for `error`
    pub async fn recover_from_error(
        &self,
        error: &RecoveryError,
        context: RecoveryContext,
    ) -> RecoveryResult {
        let classification = ErrorClassification::classify(
            self.classifier.as_ref(),
            error,
            context.is_network_error,
            context.is_component_error,
        );

        if let ErrorClassification::Network { kind, .. } = classification {
            debug!(
                key = %context.key,
                kind = ?kind,
                hint = kind.hint(),
                suggested_delay = ?kind.suggested_delay(),
                "Classified network failure"
            );
        }

        let circuit_allows = match self.breakers.get(&context.key).await {
            Some(breaker) => Some(breaker.can_attempt().await),
            None => None,
        };

        let input = SelectionInput {
            classification,
            retry_count: context.retry_count,
            circuit_allows,
            has_cache: context.has_cache,
            has_fallback: context.has_fallback,
            has_state_snapshot: self.state_cache.contains(&context.key).await,
        };

        let strategy = self.selector.select(&input);
        if circuit_allows == Some(false) {
            info!(key = %context.key, %strategy, "Circuit breaker open, skipping recovery attempts");
        }

        self.execute_strategy(strategy, error, context).await
    }

    /// Run a specific strategy, bypassing selection
    ///
    /// The outcome is recorded exactly as for a selected strategy.
    pub async fn execute_strategy(
        &self,
        strategy: RecoveryStrategy,
        error: &RecoveryError,
        context: RecoveryContext,
    ) -> RecoveryResult {
        info!(key = %context.key, %strategy, retry_count = context.retry_count, "Executing recovery strategy");

        let result = self.executor.execute(strategy, error, &context).await;

        self.history
            .record_attempt(&context.key, result.success)
            .await;
        let breaker = self.breakers.get_or_create(&context.key).await;
        if result.success {
            breaker.record_success().await;
        } else {
            breaker.record_failure().await;
        }

        let record = TelemetryRecord {
            component: context.key.clone(),
            action: RECOVERY_ACTION,
            level: if result.success {
                TelemetryLevel::Info
            } else {
                TelemetryLevel::Warning
            },
            strategy,
            success: result.success,
            retry_count: context.retry_count,
        };
        telemetry::emit(self.telemetry.as_ref(), error, &record);

        let callback = if result.success {
            context.on_success.as_ref()
        } else {
            context.on_failure.as_ref()
        };
        if let Some(callback) = callback {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(&result))).is_err() {
                error!(key = %context.key, "Recovery callback panicked");
            }
        }

        result
    }

    /// Explicit last-resort reload; never chosen automatically
    pub async fn reload_page(&self, error: &RecoveryError, key: &str) -> RecoveryResult {
        self.execute_strategy(RecoveryStrategy::ReloadPage, error, RecoveryContext::new(key))
            .await
    }

    /// Save a snapshot for later state restoration
    pub async fn save_component_state(&self, key: &str, state: Value) {
        self.state_cache.save(key, state).await;
    }

    /// Store fallback data; `None` uses the configured default TTL
    pub async fn cache_data_for_fallback(&self, key: &str, data: Value, ttl: Option<Duration>) {
        self.data_cache.insert(key, data, ttl).await;
    }

    /// Whether a fallback read for `key` would currently hit
    pub async fn has_cached_data(&self, key: &str) -> bool {
        self.data_cache.contains_valid(key).await
    }

    pub fn data_cache(&self) -> &DataCache {
        &self.data_cache
    }

    /// Whether the key's breaker admits an attempt, creating it if needed
    pub async fn can_attempt_recovery(&self, key: &str) -> bool {
        self.breakers.get_or_create(key).await.can_attempt().await
    }

    /// Statistics for one key, or for every key when `key` is `None`
    pub async fn get_recovery_statistics(&self, key: Option<&str>) -> RecoveryStatistics {
        match key {
            Some(key) => RecoveryStatistics::Key(self.key_statistics(key).await),
            None => RecoveryStatistics::Overall(self.overall_statistics().await),
        }
    }

    pub async fn key_statistics(&self, key: &str) -> KeyStatistics {
        let history = self.history.get(key).await;
        let circuit = match self.breakers.get(key).await {
            Some(breaker) => Some(breaker.get_stats().await),
            None => None,
        };

        KeyStatistics {
            key: key.to_string(),
            success_rate: history.as_ref().map_or(0.0, HistoryRecord::success_rate),
            history,
            circuit_state: circuit
                .as_ref()
                .map_or(CircuitState::Closed, |stats| stats.state),
            circuit,
            has_state_snapshot: self.state_cache.contains(key).await,
        }
    }

    pub async fn overall_statistics(&self) -> OverallStatistics {
        let mut names: BTreeSet<String> = self.history.snapshot().await.into_keys().collect();
        names.extend(self.breakers.keys().await);

        let mut stats = OverallStatistics {
            keys: BTreeMap::new(),
            total_attempts: 0,
            total_successes: 0,
            total_failures: 0,
            success_rate: 0.0,
        };

        for name in names {
            let key_stats = self.key_statistics(&name).await;
            if let Some(history) = &key_stats.history {
                stats.total_attempts += history.attempts;
                stats.total_successes += history.successes;
                stats.total_failures += history.failures;
            }
            stats.keys.insert(name, key_stats);
        }

        if stats.total_attempts > 0 {
            stats.success_rate = stats.total_successes as f64 / stats.total_attempts as f64;
        }

        stats
    }

    /// Forget recovery state for one key, or everything when `key` is `None`
    ///
    /// A single-key reset keeps the breaker registered but closed and leaves
    /// fallback data alone, since that is stored under cache keys.
    pub async fn reset_recovery_state(&self, key: Option<&str>) {
        match key {
            Some(key) => {
                self.history.clear(Some(key)).await;
                self.state_cache.remove(key).await;
                self.breakers.reset(key).await;
                info!(key = %key, "Reset recovery state");
            }
            None => {
                self.history.clear(None).await;
                self.state_cache.clear().await;
                self.data_cache.clear().await;
                self.breakers.clear().await;
                info!("Reset all recovery state");
            }
        }
    }

    /// Observe breaker transitions for every key
    pub async fn add_circuit_listener(&self, listener: Arc<dyn CircuitBreakerListener>) {
        self.breakers.add_listener(listener).await;
    }
}

/// Builder for [`ErrorRecoveryManager`]
pub struct ResilienceBuilder {
    config: ResilienceConfig,
    classifier: Option<Arc<dyn NetworkErrorClassifier>>,
    telemetry: Option<Arc<dyn Telemetry>>,
    offline_queue: Option<Arc<dyn OfflineRequestQueue>>,
    reloader: Option<Arc<dyn EnvironmentReloader>>,
    listeners: Vec<Arc<dyn CircuitBreakerListener>>,
}

impl Default for ResilienceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResilienceBuilder {
    pub fn new() -> Self {
        Self {
            config: ResilienceConfig::default(),
            classifier: None,
            telemetry: None,
            offline_queue: None,
            reloader: None,
            listeners: Vec::new(),
        }
    }

    pub fn config(mut self, config: ResilienceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn NetworkErrorClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn offline_queue(mut self, queue: Arc<dyn OfflineRequestQueue>) -> Self {
        self.offline_queue = Some(queue);
        self
    }

    pub fn reloader(mut self, reloader: Arc<dyn EnvironmentReloader>) -> Self {
        self.reloader = Some(reloader);
        self
    }

    pub fn circuit_listener(mut self, listener: Arc<dyn CircuitBreakerListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn build(self) -> ErrorRecoveryManager {
        let config = self.config;
        let state_cache = Arc::new(StateCache::new());
        let data_cache = Arc::new(DataCache::new(config.cache.default_ttl));

        let offline_queue = self.offline_queue.unwrap_or_else(|| {
            Arc::new(InMemoryOfflineQueue::new(config.offline_queue.clone()))
        });
        let reloader = self
            .reloader
            .unwrap_or_else(|| Arc::new(LoggingReloader));

        let executor = StrategyExecutor::new(
            config.backoff.clone(),
            state_cache.clone(),
            data_cache.clone(),
            offline_queue,
            reloader,
        );

        ErrorRecoveryManager {
            breakers: Arc::new(CircuitBreakerManager::with_listeners(
                config.circuit_breaker.clone(),
                self.listeners,
            )),
            history: Arc::new(RecoveryHistory::new()),
            state_cache,
            data_cache,
            selector: Arc::new(StrategySelector::new(config.selector.clone())),
            executor: Arc::new(executor),
            classifier: self
                .classifier
                .unwrap_or_else(|| Arc::new(DefaultNetworkClassifier::default())),
            telemetry: self.telemetry.unwrap_or_else(|| Arc::new(TracingTelemetry)),
            config: Arc::new(config),
        }
    }
}
