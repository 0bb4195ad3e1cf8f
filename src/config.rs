//! Configuration for the resilience engine
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `RECOVERY__`-prefixed environment variables (`__` separates nested keys,
//! e.g. `RECOVERY__CIRCUIT_BREAKER__FAILURE_THRESHOLD=3`).

use crate::error::{RecoveryError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "RECOVERY";

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Per-key circuit breaker thresholds
    pub circuit_breaker: CircuitBreakerConfig,
    /// Exponential backoff used by `RetryWithBackoff`
    pub backoff: BackoffConfig,
    /// Retry limits used by the strategy selector
    pub selector: SelectorConfig,
    /// Fallback data cache
    pub cache: CacheConfig,
    /// In-memory offline request queue
    pub offline_queue: OfflineQueueConfig,
    /// Logging output
    pub logging: LoggingConfig,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures before the circuit opens
    pub failure_threshold: u32,
    /// Successes in half-open before the circuit closes
    pub success_threshold: u32,
    /// How long the circuit stays open before probing
    #[serde(with = "humantime_serde")]
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Trip early and probe quickly
    pub fn critical_service() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
        }
    }

    /// Tolerate more failures, back off longer
    pub fn non_critical_service() -> Self {
        Self {
            failure_threshold: 10,
            success_threshold: 1,
            open_timeout: Duration::from_secs(120),
        }
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the second attempt; doubled for each later one
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl BackoffConfig {
    /// Delay slept after failed attempt number `attempt` (zero-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Strategy selector limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Retry count below which retryable network errors use backoff
    pub network_retry_limit: u32,
    /// Retry count below which unclassified errors are retried
    pub default_retry_limit: u32,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            network_retry_limit: 3,
            default_retry_limit: 2,
        }
    }
}

/// Fallback data cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied when a caller does not give one
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_millis(300_000),
        }
    }
}

/// Offline request queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineQueueConfig {
    /// Maximum queued requests; the oldest is dropped when full
    pub max_size: usize,
    /// Requests older than this are discarded
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
    /// Replay attempts before a request is dropped
    pub max_attempts: u32,
    /// Base delay between replays, doubled per retry
    #[serde(with = "humantime_serde")]
    pub initial_retry_delay: Duration,
}

impl Default for OfflineQueueConfig {
    fn default() -> Self {
        Self {
            max_size: 50,
            max_age: Duration::from_secs(24 * 60 * 60),
            max_attempts: 3,
            initial_retry_delay: Duration::from_secs(1),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or an EnvFilter directive
    pub level: String,
    /// Enable structured JSON logging
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ResilienceConfig {
    /// Load configuration from defaults, an optional TOML file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            if !path.exists() {
                return Err(RecoveryError::config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            builder = builder
                .add_source(config::File::from(path).format(config::FileFormat::Toml));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;

        tracing::debug!(
            failure_threshold = config.circuit_breaker.failure_threshold,
            max_retries = config.backoff.max_retries,
            "Loaded resilience configuration"
        );

        Ok(config)
    }

    /// Parse a TOML document on top of the defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| RecoveryError::config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(RecoveryError::config(
                "circuit_breaker.failure_threshold must be greater than zero",
            ));
        }

        if self.circuit_breaker.success_threshold == 0 {
            return Err(RecoveryError::config(
                "circuit_breaker.success_threshold must be greater than zero",
            ));
        }

        if self.circuit_breaker.open_timeout.is_zero() {
            return Err(RecoveryError::config(
                "circuit_breaker.open_timeout must be greater than zero",
            ));
        }

        if self.selector.network_retry_limit == 0 {
            return Err(RecoveryError::config(
                "selector.network_retry_limit must be greater than zero",
            ));
        }

        if self.selector.default_retry_limit == 0 {
            return Err(RecoveryError::config(
                "selector.default_retry_limit must be greater than zero",
            ));
        }

        if self.cache.default_ttl.is_zero() {
            return Err(RecoveryError::config(
                "cache.default_ttl must be greater than zero",
            ));
        }

        if self.offline_queue.max_size == 0 {
            return Err(RecoveryError::config(
                "offline_queue.max_size must be greater than zero",
            ));
        }

        if self.offline_queue.max_attempts == 0 {
            return Err(RecoveryError::config(
                "offline_queue.max_attempts must be greater than zero",
            ));
        }

        Ok(())
    }

    /// Create configuration for critical, user-facing services
    pub fn critical_service() -> Self {
        Self {
            circuit_breaker: CircuitBreakerConfig::critical_service(),
            backoff: BackoffConfig {
                max_retries: 2,
                base_delay: Duration::from_millis(500),
            },
            cache: CacheConfig {
                default_ttl: Duration::from_secs(60),
            },
            ..Self::default()
        }
    }

    /// Create configuration for background services
    pub fn background_service() -> Self {
        Self {
            circuit_breaker: CircuitBreakerConfig::non_critical_service(),
            backoff: BackoffConfig {
                max_retries: 5,
                base_delay: Duration::from_secs(2),
            },
            cache: CacheConfig {
                default_ttl: Duration::from_secs(600),
            },
            ..Self::default()
        }
    }
}
