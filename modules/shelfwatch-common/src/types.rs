//! Core domain types shared across the workspace.
//!
//! Everything that crosses a serialization boundary (the disk snapshot, the
//! gateway socket) uses camelCase field names, matching the wire protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Catalog ---

/// A single monitored product in the remote catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    /// Stable external identifier. Unique and immutable.
    pub id: String,
    pub title: String,
    pub handle: String,
    /// Minimum price across all variants.
    pub price: f64,
    /// True if any variant has positive stock.
    pub available: bool,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(default)]
    pub description: String,
    pub url: String,
    /// Stamped on first persistence, never changes afterwards.
    pub first_seen_at: DateTime<Utc>,
    /// Refreshed on every poll that re-observes the item. Never decreases.
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub id: String,
    pub title: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    pub available: bool,
    #[serde(default)]
    pub stock: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub id: String,
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

// --- Poll history ---

/// A poll attempt to be appended. The caller builds this; the store assigns
/// the sequence number.
#[derive(Debug, Clone)]
pub struct PollAttempt {
    pub timestamp: DateTime<Utc>,
    pub item_count: u32,
    pub new_count: u32,
    pub duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// One poll attempt as stored. Append-only: never mutated, pruning is an
/// operator decision only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollRecord {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub item_count: u32,
    pub new_count: u32,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// --- Notification history ---

/// Audit entry for one dispatch attempt. Doubles as the durable source of
/// truth for rebuilding the rate-limit cache after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub item_id: String,
    pub timestamp: DateTime<Utc>,
    pub sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Human-readable description of what changed, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Sent,
    Failed,
}

/// Filters for notification-history queries, shared between the store API
/// and the gateway wire protocol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationQuery {
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub item_id: Option<String>,
    pub status: Option<NotificationStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStats {
    pub total_sent: u64,
    pub total_failed: u64,
    pub count_by_item: Vec<ItemNotificationCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemNotificationCount {
    pub item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub sent: u64,
    pub failed: u64,
}

// --- Differ output ---

/// Categorized changes between two catalog snapshots. Not persisted.
///
/// An item with both a price and an availability change appears once in
/// `updated_items` and in both detail lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Items whose id was absent from the prior snapshot, in feed order.
    pub new_items: Vec<CatalogItem>,
    /// Items present in both snapshots with a price or availability
    /// difference, in feed order.
    pub updated_items: Vec<CatalogItem>,
    pub price_changes: Vec<PriceChange>,
    pub availability_changes: Vec<AvailabilityChange>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.new_items.is_empty() && self.updated_items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceChange {
    pub item_id: String,
    pub title: String,
    pub old_price: f64,
    pub new_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityChange {
    pub item_id: String,
    pub title: String,
    pub was: bool,
    pub now: bool,
}
