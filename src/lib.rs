//! Strategy-selecting error recovery engine
//!
//! Given a failure and some context about where it happened, the engine picks
//! one recovery strategy (retry, backoff, state restoration, cached or
//! fallback data, offline queuing, graceful degradation), runs it, and records
//! the outcome in per-key history and circuit breakers.
//!
//! ```no_run
//! use resilience_engine::{ErrorRecoveryManager, RecoveryContext, RecoveryError};
//! use serde_json::json;
//!
//! # async fn run() {
//! let manager = ErrorRecoveryManager::default();
//! let context = RecoveryContext::new("profile")
//!     .with_retry_fn(|_| async { Ok(json!({"name": "Ada"})) })
//!     .with_fallback(json!({}));
//!
//! let result = manager
//!     .recover_from_error(&RecoveryError::http(503, "unavailable"), context)
//!     .await;
//! assert!(result.success);
//! # }
//! ```

pub mod config;
pub mod error;
pub mod error_recovery;
pub mod logging;

// Re-export main types for convenience
pub use config::ResilienceConfig;
pub use error::{RecoveryError, Result};
pub use error_recovery::{
    ErrorRecoveryManager, RecoveryContext, RecoveryResult, RecoveryStrategy, ResilienceBuilder,
};
