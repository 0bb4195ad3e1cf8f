//! State snapshots and TTL'd fallback data
//!
//! [`StateCache`] keeps the last snapshot saved for a recovery key so a failed
//! component can be restored. [`DataCache`] keeps payloads usable as stale
//! fallbacks; expired entries are evicted lazily when read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Saved component state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub state: Value,
    pub saved_at: DateTime<Utc>,
}

/// Last-write-wins snapshot store
#[derive(Default)]
pub struct StateCache {
    snapshots: RwLock<HashMap<String, StateSnapshot>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save a snapshot, replacing any previous one for the key
    pub async fn save(&self, key: &str, state: Value) {
        let snapshot = StateSnapshot {
            state,
            saved_at: Utc::now(),
        };
        self.snapshots
            .write()
            .await
            .insert(key.to_string(), snapshot);
        debug!(key = %key, "Saved component state");
    }

    pub async fn get(&self, key: &str) -> Option<StateSnapshot> {
        self.snapshots.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.snapshots.read().await.contains_key(key)
    }

    pub async fn remove(&self, key: &str) -> Option<StateSnapshot> {
        self.snapshots.write().await.remove(key)
    }

    pub async fn clear(&self) {
        self.snapshots.write().await.clear();
    }
}

/// Why a fallback read produced nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CacheMiss {
    #[error("No cached data")]
    Missing,
    #[error("Cache expired")]
    Expired,
}

/// Cached payload with its lifetime
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Value,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    /// Valid while no more than `ttl` has elapsed since it was stored
    pub fn is_valid(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) <= self.ttl
    }
}

/// Fallback payloads keyed by cache key
pub struct DataCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl DataCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Store a payload; `None` uses the default TTL
    pub async fn insert(&self, key: &str, data: Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let entry = CacheEntry {
            data,
            stored_at: Instant::now(),
            ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        debug!(key = %key, ttl = ?ttl, "Cached fallback data");
    }

    /// Read a payload, evicting it if it has expired
    pub async fn get(&self, key: &str) -> Result<Value, CacheMiss> {
        let mut entries = self.entries.write().await;
        let entry = entries.get(key).ok_or(CacheMiss::Missing)?;

        if entry.is_valid(Instant::now()) {
            debug!(key = %key, "Fallback cache hit");
            return Ok(entry.data.clone());
        }

        entries.remove(key);
        debug!(key = %key, "Fallback cache entry expired");
        Err(CacheMiss::Expired)
    }

    /// Whether a read would currently hit; never evicts
    pub async fn contains_valid(&self, key: &str) -> bool {
        self.entries
            .read()
            .await
            .get(key)
            .is_some_and(|entry| entry.is_valid(Instant::now()))
    }

    pub async fn remove(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    /// Drop every expired entry, returning how many went
    ///
    /// Never called by the engine itself.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid(now));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
