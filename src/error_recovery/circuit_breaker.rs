//! Per-key circuit breakers
//!
//! A breaker stops recovery attempts against a key that keeps failing. It
//! opens after `failure_threshold` failures, refuses attempts until
//! `open_timeout` has elapsed, then lets probes through in half-open state
//! until `success_threshold` successes close it again. A single failure while
//! half-open reopens it.

use crate::config::CircuitBreakerConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Circuit is closed - normal operation
    Closed,
    /// Circuit is open - attempts blocked
    Open,
    /// Circuit is half-open - probing whether the target recovered
    HalfOpen,
}

/// Circuit breaker statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    /// Current state
    pub state: CircuitState,
    /// Failures counted towards opening
    pub failure_count: u32,
    /// Successes counted towards closing
    pub success_count: u32,
    /// Failures before opening
    pub failure_threshold: u32,
    /// Half-open successes before closing
    pub success_threshold: u32,
    /// Lifetime successes recorded
    pub total_successes: u64,
    /// Lifetime failures recorded
    pub total_failures: u64,
    /// Attempts refused while open
    pub blocked_attempts: u64,
    /// Times the circuit opened
    pub circuit_open_count: u64,
    /// Last failure time
    pub last_failure: Option<DateTime<Utc>>,
    /// Last success time
    pub last_success: Option<DateTime<Utc>>,
    /// Time left before an open circuit admits a probe
    #[serde(default, with = "humantime_serde")]
    pub time_until_attempt: Option<Duration>,
}

/// State transition notification
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerEvent {
    /// Key the breaker guards
    pub key: String,
    /// Previous state
    pub previous_state: CircuitState,
    /// New state
    pub new_state: CircuitState,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

/// Circuit breaker listener trait
#[async_trait::async_trait]
pub trait CircuitBreakerListener: Send + Sync {
    /// Called after every state transition
    async fn on_event(&self, event: &CircuitBreakerEvent);
}

/// Internal circuit breaker state
struct BreakerState {
    current_state: CircuitState,
    failure_count: u32,
    success_count: u32,
    next_attempt_at: Option<Instant>,
    stats: CircuitBreakerStats,
}

/// Circuit breaker for a single recovery key
pub struct CircuitBreaker {
    key: String,
    config: CircuitBreakerConfig,
    state: RwLock<BreakerState>,
    event_listeners: RwLock<Vec<Arc<dyn CircuitBreakerListener>>>,
}

impl CircuitBreaker {
    /// Create new circuit breaker
    pub fn new(key: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let stats = CircuitBreakerStats {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            failure_threshold: config.failure_threshold,
            success_threshold: config.success_threshold,
            total_successes: 0,
            total_failures: 0,
            blocked_attempts: 0,
            circuit_open_count: 0,
            last_failure: None,
            last_success: None,
            time_until_attempt: None,
        };

        Self {
            key: key.into(),
            config,
            state: RwLock::new(BreakerState {
                current_state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                next_attempt_at: None,
                stats,
            }),
            event_listeners: RwLock::new(Vec::new()),
        }
    }

    /// Key this breaker guards
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Check whether an attempt may proceed
    ///
    /// An open circuit whose timeout has elapsed moves to half-open on this
    /// call, so the transition happens exactly once.
    pub async fn can_attempt(&self) -> bool {
        let mut state = self.state.write().await;
        let current = state.current_state;

        match current {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let ready = state
                    .next_attempt_at
                    .map_or(true, |at| Instant::now() >= at);

                if ready {
                    state.success_count = 0;
                    let event = self.transition_state(&mut state, CircuitState::HalfOpen);
                    drop(state);

                    info!(key = %self.key, "Circuit breaker transitioning to half-open");
                    self.emit_event(event).await;
                    true
                } else {
                    state.stats.blocked_attempts += 1;
                    debug!(key = %self.key, "Circuit breaker open, blocking attempt");
                    false
                }
            }
        }
    }

    /// Record successful operation
    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        state.failure_count = 0;
        state.stats.total_successes += 1;
        state.stats.last_success = Some(Utc::now());

        let mut event = None;
        if state.current_state == CircuitState::HalfOpen {
            state.success_count += 1;
            if state.success_count >= self.config.success_threshold {
                state.success_count = 0;
                event = Some(self.transition_state(&mut state, CircuitState::Closed));
                info!(key = %self.key, "Circuit breaker closed after successful recovery");
            }
        }
        drop(state);

        if let Some(event) = event {
            self.emit_event(event).await;
        }
    }

    /// Record failed operation
    pub async fn record_failure(&self) {
        let mut state = self.state.write().await;
        state.success_count = 0;
        state.failure_count = state.failure_count.saturating_add(1);
        state.stats.total_failures += 1;
        state.stats.last_failure = Some(Utc::now());

        if state.current_state == CircuitState::HalfOpen {
            state.failure_count = state.failure_count.max(self.config.failure_threshold);
        }

        let mut event = None;
        if state.failure_count >= self.config.failure_threshold {
            state.next_attempt_at = Some(Instant::now() + self.config.open_timeout);

            if state.current_state == CircuitState::Open {
                debug!(key = %self.key, "Failure recorded while circuit is open, extending timeout");
            } else {
                state.stats.circuit_open_count += 1;
                warn!(
                    key = %self.key,
                    failures = state.failure_count,
                    open_for = ?self.config.open_timeout,
                    "Circuit breaker opened"
                );
                event = Some(self.transition_state(&mut state, CircuitState::Open));
            }
        }
        drop(state);

        if let Some(event) = event {
            self.emit_event(event).await;
        }
    }

    /// Current state
    pub async fn state(&self) -> CircuitState {
        self.state.read().await.current_state
    }

    /// Get current statistics
    pub async fn get_stats(&self) -> CircuitBreakerStats {
        let state = self.state.read().await;
        let mut stats = state.stats.clone();
        stats.state = state.current_state;
        stats.failure_count = state.failure_count;
        stats.success_count = state.success_count;

        if state.current_state == CircuitState::Open {
            stats.time_until_attempt = state
                .next_attempt_at
                .map(|at| at.saturating_duration_since(Instant::now()));
        }

        stats
    }

    /// Force the breaker closed and zero both counters
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        state.failure_count = 0;
        state.success_count = 0;
        state.next_attempt_at = None;

        let event = (state.current_state != CircuitState::Closed)
            .then(|| self.transition_state(&mut state, CircuitState::Closed));
        drop(state);

        info!(key = %self.key, "Circuit breaker reset to closed state");
        if let Some(event) = event {
            self.emit_event(event).await;
        }
    }

    /// Add event listener
    pub async fn add_listener(&self, listener: Arc<dyn CircuitBreakerListener>) {
        self.event_listeners.write().await.push(listener);
    }

    fn transition_state(
        &self,
        state: &mut BreakerState,
        new_state: CircuitState,
    ) -> CircuitBreakerEvent {
        let previous_state = state.current_state;
        state.current_state = new_state;
        state.stats.state = new_state;

        CircuitBreakerEvent {
            key: self.key.clone(),
            previous_state,
            new_state,
            timestamp: Utc::now(),
        }
    }

    async fn emit_event(&self, event: CircuitBreakerEvent) {
        let listeners = self.event_listeners.read().await;
        for listener in listeners.iter() {
            listener.on_event(&event).await;
        }
    }
}

/// Circuit breaker registry keyed by recovery key
pub struct CircuitBreakerManager {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    default_config: CircuitBreakerConfig,
    listeners: RwLock<Vec<Arc<dyn CircuitBreakerListener>>>,
}

impl CircuitBreakerManager {
    /// Create new circuit breaker manager
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self::with_listeners(default_config, Vec::new())
    }

    /// Create a manager whose breakers all report to `listeners`
    pub fn with_listeners(
        default_config: CircuitBreakerConfig,
        listeners: Vec<Arc<dyn CircuitBreakerListener>>,
    ) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            default_config,
            listeners: RwLock::new(listeners),
        }
    }

    /// Breaker for a key, if one was ever created
    pub async fn get(&self, key: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().await.get(key).cloned()
    }

    /// Get or create circuit breaker for a key
    pub async fn get_or_create(&self, key: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.get(key).await {
            return breaker;
        }

        let mut breakers = self.breakers.write().await;
        if let Some(breaker) = breakers.get(key) {
            return breaker.clone();
        }

        let breaker = Arc::new(CircuitBreaker::new(key, self.default_config.clone()));
        for listener in self.listeners.read().await.iter() {
            breaker.add_listener(listener.clone()).await;
        }
        breakers.insert(key.to_string(), breaker.clone());

        debug!(key = %key, "Created new circuit breaker");
        breaker
    }

    /// Install a listener on every existing and future breaker
    pub async fn add_listener(&self, listener: Arc<dyn CircuitBreakerListener>) {
        self.listeners.write().await.push(listener.clone());
        for breaker in self.breakers.read().await.values() {
            breaker.add_listener(listener.clone()).await;
        }
    }

    /// Get all circuit breaker statistics
    pub async fn get_all_stats(&self) -> HashMap<String, CircuitBreakerStats> {
        let breakers = self.breakers.read().await;
        let mut stats = HashMap::new();

        for (key, breaker) in breakers.iter() {
            stats.insert(key.clone(), breaker.get_stats().await);
        }

        stats
    }

    /// Reset one breaker, keeping it registered
    pub async fn reset(&self, key: &str) {
        if let Some(breaker) = self.get(key).await {
            breaker.reset().await;
        }
    }

    /// Drop every breaker
    pub async fn clear(&self) {
        let mut breakers = self.breakers.write().await;
        let count = breakers.len();
        breakers.clear();
        info!(count, "Removed all circuit breakers");
    }

    /// Keys with a registered breaker
    pub async fn keys(&self) -> Vec<String> {
        self.breakers.read().await.keys().cloned().collect()
    }
}
