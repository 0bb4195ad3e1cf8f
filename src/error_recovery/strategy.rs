//! Recovery strategies and the decision tree that picks one

use crate::config::SelectorConfig;
use crate::error_recovery::classifier::{ErrorClassification, NetworkErrorKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Remediation behaviours the executor knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecoveryStrategy {
    Retry,
    RetryWithBackoff,
    FallbackUi,
    GracefulDegradation,
    StateRestoration,
    CacheFallback,
    OfflineQueue,
    ReloadComponent,
    /// Only ever run explicitly, never selected
    ReloadPage,
}

impl RecoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::Retry => "retry",
            RecoveryStrategy::RetryWithBackoff => "retry_with_backoff",
            RecoveryStrategy::FallbackUi => "fallback_ui",
            RecoveryStrategy::GracefulDegradation => "graceful_degradation",
            RecoveryStrategy::StateRestoration => "state_restoration",
            RecoveryStrategy::CacheFallback => "cache_fallback",
            RecoveryStrategy::OfflineQueue => "offline_queue",
            RecoveryStrategy::ReloadComponent => "reload_component",
            RecoveryStrategy::ReloadPage => "reload_page",
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the decision tree looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionInput {
    pub classification: ErrorClassification,
    pub retry_count: u32,
    /// `None` when no breaker exists for the key yet
    pub circuit_allows: Option<bool>,
    pub has_cache: bool,
    pub has_fallback: bool,
    pub has_state_snapshot: bool,
}

/// Deterministic strategy selection
#[derive(Debug, Clone, Default)]
pub struct StrategySelector {
    config: SelectorConfig,
}

impl StrategySelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    pub fn select(&self, input: &SelectionInput) -> RecoveryStrategy {
        if input.circuit_allows == Some(false) {
            return Self::last_resort(input.has_fallback);
        }

        match input.classification {
            ErrorClassification::Network {
                kind: NetworkErrorKind::Offline,
                ..
            } => RecoveryStrategy::OfflineQueue,
            ErrorClassification::Network { retryable, .. } => {
                if retryable && input.retry_count < self.config.network_retry_limit {
                    RecoveryStrategy::RetryWithBackoff
                } else if input.has_cache {
                    RecoveryStrategy::CacheFallback
                } else {
                    Self::last_resort(input.has_fallback)
                }
            }
            ErrorClassification::Component => match input.retry_count {
                0 => RecoveryStrategy::Retry,
                1 if input.has_state_snapshot => RecoveryStrategy::StateRestoration,
                2 => RecoveryStrategy::ReloadComponent,
                _ => Self::last_resort(input.has_fallback),
            },
            ErrorClassification::Unclassified => {
                if input.retry_count < self.config.default_retry_limit {
                    RecoveryStrategy::Retry
                } else {
                    RecoveryStrategy::FallbackUi
                }
            }
        }
    }

    fn last_resort(has_fallback: bool) -> RecoveryStrategy {
        if has_fallback {
            RecoveryStrategy::FallbackUi
        } else {
            RecoveryStrategy::GracefulDegradation
        }
    }
}
