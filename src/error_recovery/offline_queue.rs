//! Offline request queue
//!
//! Mutating requests that fail while the host is offline are held here and
//! replayed later through a caller-supplied [`RequestExecutor`].

use crate::config::OfflineQueueConfig;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const QUEUEABLE_METHODS: [&str; 4] = ["POST", "PUT", "PATCH", "DELETE"];

/// Replay priority; higher runs first
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum RequestPriority {
    Low = 1,
    #[default]
    Medium = 2,
    High = 3,
    Urgent = 4,
}

/// Request descriptor handed to the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineRequest {
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Sent again on replay; not part of the dedup id
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub priority: RequestPriority,
}

impl OfflineRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            data: None,
            headers: BTreeMap::new(),
            priority: RequestPriority::default(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: RequestPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Only mutating methods are worth replaying
    pub fn is_queueable(&self) -> bool {
        QUEUEABLE_METHODS
            .iter()
            .any(|method| method.eq_ignore_ascii_case(&self.method))
    }

    /// Deduplication id: method, url and payload with non-alphanumerics as `_`
    pub fn dedup_id(&self) -> String {
        let data = self
            .data
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_default();

        format!("{}_{}_{}", self.method, self.url, data)
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }
}

/// A request waiting in the queue
#[derive(Debug, Clone, Serialize)]
pub struct QueuedRequest {
    pub id: String,
    pub request: OfflineRequest,
    pub queued_at: DateTime<Utc>,
    pub retry_count: u32,
    #[serde(skip)]
    enqueued: Instant,
}

/// Counts from one replay pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueProcessingSummary {
    pub succeeded: u32,
    pub failed: u32,
    pub retrying: u32,
}

/// Replay progress notifications
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    Started { queue_size: usize },
    Succeeded { id: String },
    Retrying { id: String, retry_count: u32 },
    Dropped { id: String },
    Completed(QueueProcessingSummary),
}

/// Where the recovery engine hands requests it could not send
#[async_trait]
pub trait OfflineRequestQueue: Send + Sync {
    /// Returns `false` when the request was not accepted
    async fn enqueue(&self, request: OfflineRequest) -> bool;
}

/// Sends a replayed request
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn execute(&self, request: &OfflineRequest) -> Result<Value>;
}

/// Bounded, priority-ordered in-memory queue
pub struct InMemoryOfflineQueue {
    config: OfflineQueueConfig,
    entries: Mutex<Vec<QueuedRequest>>,
    processing: AtomicBool,
    events: broadcast::Sender<QueueEvent>,
}

impl InMemoryOfflineQueue {
    pub fn new(config: OfflineQueueConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            config,
            entries: Mutex::new(Vec::new()),
            processing: AtomicBool::new(false),
            events,
        }
    }

    /// Receive replay progress events
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub async fn len(&self) -> usize {
        let mut entries = self.entries.lock().await;
        self.discard_stale(&mut entries);
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Queued requests in replay order
    pub async fn snapshot(&self) -> Vec<QueuedRequest> {
        let mut entries = self.entries.lock().await;
        self.discard_stale(&mut entries);
        entries.clone()
    }

    pub async fn dequeue(&self, id: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        before != entries.len()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
        info!("Offline queue cleared");
    }

    /// Replay every queued request once, in priority order
    ///
    /// A concurrent call returns an empty summary without doing anything.
    pub async fn process_queue(&self, executor: &dyn RequestExecutor) -> QueueProcessingSummary {
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Offline queue already processing");
            return QueueProcessingSummary::default();
        }
        let _guard = ProcessingGuard(&self.processing);

        let pending = self.snapshot().await;
        if pending.is_empty() {
            return QueueProcessingSummary::default();
        }

        info!(queue_size = pending.len(), "Processing offline queue");
        self.notify(QueueEvent::Started {
            queue_size: pending.len(),
        });

        let mut summary = QueueProcessingSummary::default();
        for (index, entry) in pending.into_iter().enumerate() {
            if index > 0 {
                let factor = 2u32.checked_pow(entry.retry_count).unwrap_or(u32::MAX);
                let delay = self.config.initial_retry_delay.saturating_mul(factor);
                tokio::time::sleep(delay).await;
            }

            match executor.execute(&entry.request).await {
                Ok(_) => {
                    self.dequeue(&entry.id).await;
                    summary.succeeded += 1;
                    debug!(id = %entry.id, "Queued request succeeded");
                    self.notify(QueueEvent::Succeeded { id: entry.id });
                }
                Err(e) if entry.retry_count + 1 < self.config.max_attempts => {
                    let retry_count = self.bump_retry_count(&entry.id).await;
                    summary.retrying += 1;
                    warn!(id = %entry.id, retry_count, error = %e, "Queued request failed, will retry");
                    self.notify(QueueEvent::Retrying {
                        id: entry.id,
                        retry_count,
                    });
                }
                Err(e) => {
                    self.dequeue(&entry.id).await;
                    summary.failed += 1;
                    warn!(id = %entry.id, error = %e, "Queued request exhausted its attempts, dropping");
                    self.notify(QueueEvent::Dropped { id: entry.id });
                }
            }
        }

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            retrying = summary.retrying,
            "Offline queue processing complete"
        );
        self.notify(QueueEvent::Completed(summary));
        summary
    }

    async fn bump_retry_count(&self, id: &str) -> u32 {
        let mut entries = self.entries.lock().await;
        match entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                entry.retry_count += 1;
                entry.retry_count
            }
            None => 0,
        }
    }

    fn discard_stale(&self, entries: &mut Vec<QueuedRequest>) {
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|entry| now.saturating_duration_since(entry.enqueued) < self.config.max_age);

        let discarded = before - entries.len();
        if discarded > 0 {
            debug!(discarded, "Discarded stale offline requests");
        }
    }

    fn notify(&self, event: QueueEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl OfflineRequestQueue for InMemoryOfflineQueue {
    async fn enqueue(&self, request: OfflineRequest) -> bool {
        if !request.is_queueable() {
            debug!(method = %request.method, "Request method not queueable");
            return false;
        }

        let id = request.dedup_id();
        let mut entries = self.entries.lock().await;
        self.discard_stale(&mut entries);

        if let Some(existing) = entries.iter_mut().find(|entry| entry.id == id) {
            existing.request = request;
            existing.queued_at = Utc::now();
            existing.enqueued = Instant::now();
            existing.retry_count = 0;
            debug!(id = %id, "Request already queued, refreshed");
        } else {
            if entries.len() >= self.config.max_size {
                if let Some(oldest) = entries
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, entry)| entry.enqueued)
                    .map(|(index, _)| index)
                {
                    let dropped = entries.remove(oldest);
                    warn!(id = %dropped.id, "Offline queue full, dropped oldest request");
                }
            }

            entries.push(QueuedRequest {
                id: id.clone(),
                request,
                queued_at: Utc::now(),
                retry_count: 0,
                enqueued: Instant::now(),
            });
            info!(id = %id, "Request queued for later");
        }

        entries.sort_by(|a, b| b.request.priority.cmp(&a.request.priority));
        true
    }
}

struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
