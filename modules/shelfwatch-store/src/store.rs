//! CatalogStore — the durable record of items, poll history, and notification
//! history. The single source of truth; every other component holds only
//! derived, in-memory views.
//!
//! The working set lives in memory behind one mutex. Every mutating call
//! commits to a staged copy, serializes the FULL state to disk, and only then
//! swaps the copy in, so a successful return implies durability and a failed
//! one leaves memory untouched. Snapshots are written to a sibling temp file
//! and renamed over the live file: a crash mid-write can never leave a
//! truncated snapshot behind.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use shelfwatch_common::types::{
    CatalogItem, ItemNotificationCount, NotificationQuery, NotificationRecord, NotificationStats,
    NotificationStatus, PollAttempt, PollRecord,
};

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Invalid item: {0}")]
    InvalidItem(String),
}

/// Filters for catalog item queries.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub available: Option<bool>,
    pub handle: Option<String>,
    pub limit: Option<usize>,
}

/// The full persisted state: items keyed by id, plus the two append-only
/// histories. Serialized wholesale after every mutation.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreState {
    items: BTreeMap<String, CatalogItem>,
    polls: Vec<PollRecord>,
    notifications: Vec<NotificationRecord>,
}

#[derive(Clone)]
pub struct CatalogStore {
    inner: Arc<Mutex<StoreState>>,
    path: PathBuf,
}

impl CatalogStore {
    /// Open the store at `path`, loading an existing snapshot or starting
    /// empty. The parent directory is created if needed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let state: StoreState = serde_json::from_slice(&bytes)?;
                info!(
                    path = %path.display(),
                    items = state.items.len(),
                    polls = state.polls.len(),
                    notifications = state.notifications.len(),
                    "Loaded catalog snapshot"
                );
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No existing snapshot, starting empty");
                StoreState::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            inner: Arc::new(Mutex::new(state)),
            path,
        })
    }

    /// Serialize the full state to a temp file and atomically rename it over
    /// the live snapshot.
    async fn persist(&self, state: &StoreState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "Snapshot written");
        Ok(())
    }

    // --- Items ---

    /// Insert-or-replace a batch of items as a single transaction, keyed by
    /// id. `first_seen_at` is preserved on conflict; `last_seen_at` and all
    /// mutable fields are refreshed. Any item failure rolls the whole batch
    /// back: no partial commits.
    pub async fn upsert_items(&self, items: &[CatalogItem]) -> Result<usize> {
        let mut guard = self.inner.lock().await;

        let mut staged = guard.items.clone();
        for item in items {
            if item.id.is_empty() {
                return Err(StoreError::InvalidItem(format!(
                    "empty id on item titled {:?}",
                    item.title
                )));
            }
            let mut record = item.clone();
            if let Some(existing) = staged.get(&item.id) {
                record.first_seen_at = existing.first_seen_at;
                // last_seen_at never goes backwards
                if record.last_seen_at < existing.last_seen_at {
                    record.last_seen_at = existing.last_seen_at;
                }
            }
            staged.insert(record.id.clone(), record);
        }

        let candidate = StoreState {
            items: staged,
            polls: guard.polls.clone(),
            notifications: guard.notifications.clone(),
        };
        self.persist(&candidate).await?;
        *guard = candidate;

        Ok(items.len())
    }

    pub async fn get_item(&self, id: &str) -> Result<Option<CatalogItem>> {
        let guard = self.inner.lock().await;
        Ok(guard.items.get(id).cloned())
    }

    pub async fn query_items(&self, filter: &ItemFilter) -> Result<Vec<CatalogItem>> {
        let guard = self.inner.lock().await;
        let items = guard
            .items
            .values()
            .filter(|i| filter.available.map_or(true, |a| i.available == a))
            .filter(|i| filter.handle.as_deref().map_or(true, |h| i.handle == h))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(items)
    }

    /// The prior snapshot as seen by the differ.
    pub async fn all_items(&self) -> Result<Vec<CatalogItem>> {
        self.query_items(&ItemFilter::default()).await
    }

    // --- Poll history ---

    /// Append one poll attempt. Returns the assigned sequence number.
    pub async fn append_poll(&self, attempt: PollAttempt) -> Result<u64> {
        let mut guard = self.inner.lock().await;

        let seq = guard.polls.last().map(|p| p.seq + 1).unwrap_or(1);
        let record = PollRecord {
            seq,
            timestamp: attempt.timestamp,
            item_count: attempt.item_count,
            new_count: attempt.new_count,
            duration_ms: attempt.duration_ms,
            success: attempt.success,
            error: attempt.error,
        };

        let mut polls = guard.polls.clone();
        polls.push(record);
        let candidate = StoreState {
            items: guard.items.clone(),
            polls,
            notifications: guard.notifications.clone(),
        };
        self.persist(&candidate).await?;
        *guard = candidate;

        Ok(seq)
    }

    /// The most recent poll records, newest first.
    pub async fn recent_polls(&self, limit: usize) -> Result<Vec<PollRecord>> {
        let guard = self.inner.lock().await;
        Ok(guard.polls.iter().rev().take(limit).cloned().collect())
    }

    // --- Notification history ---

    pub async fn append_notification(&self, record: NotificationRecord) -> Result<()> {
        let mut guard = self.inner.lock().await;

        let mut notifications = guard.notifications.clone();
        notifications.push(record);
        let candidate = StoreState {
            items: guard.items.clone(),
            polls: guard.polls.clone(),
            notifications,
        };
        self.persist(&candidate).await?;
        *guard = candidate;

        Ok(())
    }

    /// Query the notification audit trail, newest first.
    pub async fn query_notifications(
        &self,
        query: &NotificationQuery,
    ) -> Result<Vec<NotificationRecord>> {
        let guard = self.inner.lock().await;
        let matches = guard
            .notifications
            .iter()
            .rev()
            .filter(|n| query.date_from.map_or(true, |t| n.timestamp >= t))
            .filter(|n| query.date_to.map_or(true, |t| n.timestamp <= t))
            .filter(|n| query.item_id.as_deref().map_or(true, |id| n.item_id == id))
            .filter(|n| match query.status {
                None => true,
                Some(NotificationStatus::Sent) => n.sent,
                Some(NotificationStatus::Failed) => !n.sent,
            })
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(matches)
    }

    pub async fn notification_stats(&self) -> Result<NotificationStats> {
        let guard = self.inner.lock().await;

        let mut total_sent = 0u64;
        let mut total_failed = 0u64;
        let mut by_item: BTreeMap<String, ItemNotificationCount> = BTreeMap::new();

        for record in &guard.notifications {
            let entry = by_item
                .entry(record.item_id.clone())
                .or_insert_with(|| ItemNotificationCount {
                    item_id: record.item_id.clone(),
                    title: None,
                    sent: 0,
                    failed: 0,
                });
            if entry.title.is_none() {
                entry.title = record.title.clone();
            }
            if record.sent {
                total_sent += 1;
                entry.sent += 1;
            } else {
                total_failed += 1;
                entry.failed += 1;
            }
        }

        let mut count_by_item: Vec<ItemNotificationCount> = by_item.into_values().collect();
        count_by_item.sort_by(|a, b| (b.sent + b.failed).cmp(&(a.sent + a.failed)));

        Ok(NotificationStats {
            total_sent,
            total_failed,
            count_by_item,
        })
    }

    /// The most recent successful notification per item, over records newer
    /// than `since`. Authoritative input for rebuilding the rate-limit cache.
    pub async fn recent_successful_notifications(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, DateTime<Utc>)>> {
        let guard = self.inner.lock().await;

        let mut latest: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
        for record in &guard.notifications {
            if !record.sent || record.timestamp <= since {
                continue;
            }
            let entry = latest.entry(record.item_id.clone()).or_insert(record.timestamp);
            if record.timestamp > *entry {
                *entry = record.timestamp;
            }
        }

        Ok(latest.into_iter().collect())
    }

    /// Remove notification records older than `cutoff`. Returns the number
    /// removed. Maintenance-only: poll history is never touched.
    pub async fn prune_notifications(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut guard = self.inner.lock().await;

        let notifications: Vec<NotificationRecord> = guard
            .notifications
            .iter()
            .filter(|n| n.timestamp >= cutoff)
            .cloned()
            .collect();
        let removed = guard.notifications.len() - notifications.len();
        if removed == 0 {
            return Ok(0);
        }

        let candidate = StoreState {
            items: guard.items.clone(),
            polls: guard.polls.clone(),
            notifications,
        };
        self.persist(&candidate).await?;
        *guard = candidate;

        Ok(removed)
    }
}
