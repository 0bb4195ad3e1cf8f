//! Error recovery engine
//!
//! Decides how to recover from a failure (network, component, or anything
//! else) and runs that recovery: retries, exponential backoff, state
//! restoration, cached fallbacks, offline queuing and circuit breaking.

pub mod cache;
pub mod circuit_breaker;
pub mod classifier;
pub mod context;
pub mod executor;
pub mod history;
pub mod manager;
pub mod offline_queue;
pub mod session;
pub mod strategy;
pub mod telemetry;

// Re-export commonly used types
pub use cache::{CacheMiss, DataCache, StateCache, StateSnapshot};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerEvent, CircuitBreakerListener, CircuitBreakerManager,
    CircuitBreakerStats, CircuitState,
};
pub use classifier::{
    ConnectivityMonitor, DefaultNetworkClassifier, ErrorClassification, NetworkErrorClassifier,
    NetworkErrorKind,
};
pub use context::{retry_fn, RecoveryCallback, RecoveryContext, RecoveryResult, RetryFn};
pub use executor::{EnvironmentReloader, LoggingReloader, StrategyExecutor};
pub use history::{HistoryRecord, RecoveryHistory};
pub use manager::{
    ErrorRecoveryManager, KeyStatistics, OverallStatistics, RecoveryStatistics, ResilienceBuilder,
};
pub use offline_queue::{
    InMemoryOfflineQueue, OfflineRequest, OfflineRequestQueue, QueueEvent,
    QueueProcessingSummary, QueuedRequest, RequestExecutor, RequestPriority,
};
pub use session::{RecoverySession, SessionOptions};
pub use strategy::{RecoveryStrategy, SelectionInput, StrategySelector};
pub use telemetry::{Telemetry, TelemetryLevel, TelemetryRecord, TracingTelemetry};
