//! Gateway wire vocabulary and the process-wide event bus.
//!
//! Broadcasts and request responses are tagged JSON objects. The tag lives in
//! the `event` field for server-to-client traffic and the `request` field for
//! client-to-server traffic; responses are correlated to their request by the
//! fixed `<request>-result` naming convention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{CatalogItem, NotificationQuery, NotificationRecord, NotificationStats};

/// Events pushed to connected gateway clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum GatewayEvent {
    /// Emitted after every poll attempt, success or failure.
    Heartbeat { timestamp: DateTime<Utc> },

    ItemsUpdated {
        items: Vec<CatalogItem>,
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// One per newly discovered item.
    ItemNew {
        item: CatalogItem,
        timestamp: DateTime<Utc>,
    },

    Error {
        error: String,
        timestamp: DateTime<Utc>,
    },

    Log {
        level: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Immediate acknowledgement of a force-poll request, distinct from the
    /// eventual heartbeat/items-updated broadcasts the poll itself produces.
    ForcePollReceived { timestamp: DateTime<Utc> },

    GetNotificationHistoryResult {
        success: bool,
        history: Vec<NotificationRecord>,
        count: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },

    GetNotificationStatsResult {
        success: bool,
        stats: NotificationStats,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

/// Requests a gateway client may issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "kebab-case")]
pub enum GatewayRequest {
    ForcePoll,
    GetNotificationHistory {
        #[serde(flatten)]
        query: NotificationQuery,
    },
    GetNotificationStats,
}

/// Thin wrapper over a broadcast channel: one producer, N gateway clients.
///
/// Emitting with zero subscribers is a silent no-op, never an error.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GatewayEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: GatewayEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NotificationStatus;

    #[test]
    fn events_serialize_with_kebab_case_names() {
        let event = GatewayEvent::Heartbeat {
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "heartbeat");

        let event = GatewayEvent::ForcePollReceived {
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "force-poll-received");
    }

    #[test]
    fn response_names_follow_result_convention() {
        let event = GatewayEvent::GetNotificationHistoryResult {
            success: true,
            history: vec![],
            count: 0,
            error: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "get-notification-history-result");
        // Absent error is omitted from the wire entirely
        assert!(json.get("error").is_none());

        let event = GatewayEvent::GetNotificationStatsResult {
            success: true,
            stats: NotificationStats::default(),
            error: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "get-notification-stats-result");
        assert_eq!(json["stats"]["totalSent"], 0);
    }

    #[test]
    fn requests_parse_from_wire_json() {
        let request: GatewayRequest = serde_json::from_str(r#"{"request":"force-poll"}"#).unwrap();
        assert!(matches!(request, GatewayRequest::ForcePoll));

        let request: GatewayRequest = serde_json::from_str(
            r#"{"request":"get-notification-history","itemId":"42","status":"failed","limit":10}"#,
        )
        .unwrap();
        match request {
            GatewayRequest::GetNotificationHistory { query } => {
                assert_eq!(query.item_id.as_deref(), Some("42"));
                assert_eq!(query.status, Some(NotificationStatus::Failed));
                assert_eq!(query.limit, Some(10));
                assert!(query.date_from.is_none());
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn emit_without_subscribers_is_a_no_op() {
        let bus = EventBus::new(8);
        bus.emit(GatewayEvent::Heartbeat {
            timestamp: Utc::now(),
        });

        // A late subscriber sees only what is emitted after subscribing.
        let mut rx = bus.subscribe();
        bus.emit(GatewayEvent::Log {
            level: "info".into(),
            message: "hello".into(),
            timestamp: Utc::now(),
        });
        let received = rx.try_recv().unwrap();
        assert!(matches!(received, GatewayEvent::Log { .. }));
    }
}
