//! Per-key recovery attempt counters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Attempt counters for one recovery key
///
/// `attempts == successes + failures` always holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl HistoryRecord {
    /// Fraction of attempts that succeeded, 0 when nothing was attempted
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

/// Recovery history keyed by recovery key
#[derive(Default)]
pub struct RecoveryHistory {
    records: RwLock<HashMap<String, HistoryRecord>>,
}

impl RecoveryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one attempt and its outcome
    pub async fn record_attempt(&self, key: &str, success: bool) {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let record = records.entry(key.to_string()).or_default();

        record.attempts += 1;
        record.last_attempt_at = Some(now);
        if success {
            record.successes += 1;
            record.last_success_at = Some(now);
        } else {
            record.failures += 1;
            record.last_failure_at = Some(now);
        }

        debug!(
            key = %key,
            success,
            attempts = record.attempts,
            "Recorded recovery attempt"
        );
    }

    pub async fn get(&self, key: &str) -> Option<HistoryRecord> {
        self.records.read().await.get(key).cloned()
    }

    /// Success rate for a key; 0 for unknown keys
    pub async fn success_rate(&self, key: &str) -> f64 {
        self.records
            .read()
            .await
            .get(key)
            .map_or(0.0, HistoryRecord::success_rate)
    }

    pub async fn snapshot(&self) -> HashMap<String, HistoryRecord> {
        self.records.read().await.clone()
    }

    /// Remove one record, or all of them when `key` is `None`
    pub async fn clear(&self, key: Option<&str>) {
        let mut records = self.records.write().await;
        match key {
            Some(key) => {
                records.remove(key);
            }
            None => records.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_rate() {
        let history = RecoveryHistory::new();
        assert_eq!(history.success_rate("dashboard").await, 0.0);

        history.record_attempt("dashboard", true).await;
        history.record_attempt("dashboard", false).await;
        history.record_attempt("dashboard", false).await;
        history.record_attempt("dashboard", true).await;

        let record = history.get("dashboard").await.unwrap();
        assert_eq!(record.attempts, 4);
        assert_eq!(record.attempts, record.successes + record.failures);
        assert_eq!(history.success_rate("dashboard").await, 0.5);
        assert!(record.last_failure_at.is_some());
    }

    #[tokio::test]
    async fn test_clear_single_and_all() {
        let history = RecoveryHistory::new();
        history.record_attempt("a", true).await;
        history.record_attempt("b", false).await;

        history.clear(Some("a")).await;
        assert!(history.get("a").await.is_none());
        assert!(history.get("b").await.is_some());

        history.clear(None).await;
        assert!(history.snapshot().await.is_empty());
    }
}
