//! Notification dispatch: filtering, per-item rate limiting, delivery, and
//! the audit trail that makes rate limits survive restarts.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use shelfwatch_common::{CatalogItem, NotificationRecord};
use shelfwatch_store::CatalogStore;

use crate::traits::{AlertMessage, AlertSink};

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Which items are worth alerting on. Both filters are optional and combine
/// independently; no configured filter passes everything.
#[derive(Debug, Clone, Default)]
pub struct NotifyFilter {
    /// Items pass when their cheapest variant is at or below this cap.
    pub max_price: Option<f64>,
    /// Items pass when any keyword is a case-insensitive substring of the title.
    pub keywords: Vec<String>,
}

pub fn should_notify(item: &CatalogItem, filter: &NotifyFilter) -> bool {
    if let Some(cap) = filter.max_price {
        let cheapest = item
            .variants
            .iter()
            .map(|v| v.price)
            .fold(item.price, f64::min);
        if cheapest > cap {
            return false;
        }
    }

    if !filter.keywords.is_empty() {
        let title = item.title.to_lowercase();
        if !filter
            .keywords
            .iter()
            .any(|k| title.contains(&k.to_lowercase()))
        {
            return false;
        }
    }

    true
}

// ---------------------------------------------------------------------------
// Rate-limit cache
// ---------------------------------------------------------------------------

/// Derived map of item id to its most recent successful notification. Not
/// authoritative: fully reconstructible from the audit trail at any time.
/// Entries expire implicitly because checks are always relative to now.
#[derive(Debug, Default)]
pub struct RateLimitCache {
    last_sent: HashMap<String, DateTime<Utc>>,
}

impl RateLimitCache {
    pub fn from_entries(entries: impl IntoIterator<Item = (String, DateTime<Utc>)>) -> Self {
        Self {
            last_sent: entries.into_iter().collect(),
        }
    }

    /// True when no successful notification for this item falls within the
    /// window ending at `now`.
    pub fn allows(&self, item_id: &str, now: DateTime<Utc>, window: Duration) -> bool {
        match self.last_sent.get(item_id) {
            Some(last) => now - *last >= window,
            None => true,
        }
    }

    pub fn record(&mut self, item_id: &str, sent_at: DateTime<Utc>) {
        self.last_sent.insert(item_id.to_string(), sent_at);
    }

    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Delivered and audited.
    Sent,
    /// Refused by the per-item rate limit. Not audited: only attempted
    /// deliveries enter the notification history.
    RateLimited,
    /// Delivery attempted and failed. Audited with sent=false; the cache is
    /// not updated, so an immediate retry is allowed.
    Failed,
}

pub struct Notifier {
    store: CatalogStore,
    sink: Arc<dyn AlertSink>,
    filter: NotifyFilter,
    window: Duration,
    cache: Mutex<RateLimitCache>,
}

impl Notifier {
    /// Build a notifier, rebuilding the rate-limit cache from the persisted
    /// audit trail. A failed rebuild logs a warning and starts empty
    /// (fail-open): the audit query is the source of truth, the cache only
    /// accelerates it.
    pub async fn recover(
        store: CatalogStore,
        sink: Arc<dyn AlertSink>,
        filter: NotifyFilter,
        window: Duration,
    ) -> Self {
        let cache = match store.recent_successful_notifications(Utc::now() - window).await {
            Ok(entries) => {
                let cache = RateLimitCache::from_entries(entries);
                if !cache.is_empty() {
                    info!(entries = cache.len(), "Rate-limit cache rebuilt from notification history");
                }
                cache
            }
            Err(e) => {
                warn!(error = %e, "Rate-limit cache rebuild failed, starting empty");
                RateLimitCache::default()
            }
        };

        Self {
            store,
            sink,
            filter,
            window,
            cache: Mutex::new(cache),
        }
    }

    pub fn should_notify(&self, item: &CatalogItem) -> bool {
        should_notify(item, &self.filter)
    }

    /// Attempt one notification for `item`. Never returns an error: every
    /// failure mode is absorbed into the outcome and the audit trail.
    pub async fn dispatch(&self, item: &CatalogItem, change: Option<String>) -> DispatchOutcome {
        let now = Utc::now();

        {
            let cache = self.cache.lock().await;
            if !cache.allows(&item.id, now, self.window) {
                debug!(item_id = %item.id, "Notification suppressed by rate limit");
                return DispatchOutcome::RateLimited;
            }
        }

        let message = AlertMessage::for_item(item, change.as_deref());
        match self.sink.deliver(&message).await {
            Ok(()) => {
                self.cache.lock().await.record(&item.id, now);
                let record = NotificationRecord {
                    item_id: item.id.clone(),
                    timestamp: now,
                    sent: true,
                    title: Some(item.title.clone()),
                    change,
                    error: None,
                };
                if let Err(e) = self.store.append_notification(record).await {
                    // Delivery already happened; the audit row is best-effort.
                    warn!(item_id = %item.id, error = %e, "Failed to record notification audit entry");
                }
                info!(item_id = %item.id, title = %item.title, "Notification sent");
                DispatchOutcome::Sent
            }
            Err(e) => {
                let record = NotificationRecord {
                    item_id: item.id.clone(),
                    timestamp: now,
                    sent: false,
                    title: Some(item.title.clone()),
                    change,
                    error: Some(e.to_string()),
                };
                if let Err(audit_err) = self.store.append_notification(record).await {
                    warn!(item_id = %item.id, error = %audit_err, "Failed to record notification audit entry");
                }
                warn!(item_id = %item.id, error = %e, "Notification delivery failed");
                DispatchOutcome::Failed
            }
        }
    }
}
