//! Gateway behavior over a real Unix socket: request round-trips, event
//! broadcast fan-out, and stale socket recovery.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::OwnedReadHalf;
use tokio::net::UnixStream;
use tokio::sync::broadcast;

use shelfwatch_common::{
    CatalogItem, EventBus, GatewayEvent, NotificationRecord,
};
use shelfwatch_engine::traits::CatalogSource;
use shelfwatch_engine::{LogAlerter, Notifier, NotifyFilter, Poller};
use shelfwatch_gateway::Gateway;
use shelfwatch_store::CatalogStore;

struct StaticSource {
    items: Vec<CatalogItem>,
    delay: Option<Duration>,
}

impl StaticSource {
    fn new(items: Vec<CatalogItem>) -> Self {
        Self { items, delay: None }
    }

    fn slow(items: Vec<CatalogItem>, delay: Duration) -> Self {
        Self {
            items,
            delay: Some(delay),
        }
    }
}

#[async_trait]
impl CatalogSource for StaticSource {
    async fn fetch_catalog(&self) -> anyhow::Result<Vec<CatalogItem>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.items.clone())
    }
}

fn item(id: &str) -> CatalogItem {
    let now = Utc::now();
    CatalogItem {
        id: id.to_string(),
        title: format!("Item {id}"),
        handle: format!("item-{id}"),
        price: 25.0,
        available: true,
        variants: vec![],
        images: vec![],
        description: String::new(),
        url: format!("https://shop.example/products/item-{id}"),
        first_seen_at: now,
        last_seen_at: now,
    }
}

struct Harness {
    socket_path: PathBuf,
    store: CatalogStore,
    events: EventBus,
    shutdown: broadcast::Sender<()>,
    gateway_task: tokio::task::JoinHandle<anyhow::Result<()>>,
    _dir: tempfile::TempDir,
}

async fn start_gateway(source: StaticSource) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("gateway.sock");

    let store = CatalogStore::open(dir.path().join("catalog.json"))
        .await
        .unwrap();
    let notifier = Notifier::recover(
        store.clone(),
        Arc::new(LogAlerter),
        NotifyFilter::default(),
        chrono::Duration::minutes(60),
    )
    .await;
    let events = EventBus::new(64);
    let poller = Arc::new(Poller::new(
        Arc::new(source),
        store.clone(),
        notifier,
        events.clone(),
    ));

    let (shutdown, _) = broadcast::channel(1);
    let gateway = Gateway::new(&socket_path, store.clone(), events.clone(), poller);
    let rx = shutdown.subscribe();
    let gateway_task = tokio::spawn(gateway.run(rx));

    Harness {
        socket_path,
        store,
        events,
        shutdown,
        gateway_task,
        _dir: dir,
    }
}

// The write half must stay alive for the session's lifetime; dropping it
// signals EOF and the gateway hangs up.
async fn connect_raw(path: &Path) -> (Lines<BufReader<OwnedReadHalf>>, tokio::net::unix::OwnedWriteHalf) {
    for _ in 0..100 {
        if let Ok(stream) = UnixStream::connect(path).await {
            let (read, write) = stream.into_split();
            return (BufReader::new(read).lines(), write);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("gateway never accepted a connection");
}

async fn next_event(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> GatewayEvent {
    let line = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("timed out waiting for gateway event")
        .unwrap()
        .expect("gateway closed the connection");
    serde_json::from_str(&line).expect("gateway sent invalid JSON")
}

#[tokio::test]
async fn force_poll_is_acknowledged_then_reported() {
    let harness = start_gateway(StaticSource::new(vec![item("1")])).await;
    let (mut lines, mut write) = connect_raw(&harness.socket_path).await;

    write.write_all(b"{\"request\":\"force-poll\"}\n").await.unwrap();

    // Immediate ack, before the poll finishes
    assert!(matches!(
        next_event(&mut lines).await,
        GatewayEvent::ForcePollReceived { .. }
    ));

    // The poll itself reports through the broadcast stream
    let mut saw_new = false;
    let mut saw_heartbeat = false;
    while !saw_heartbeat {
        match next_event(&mut lines).await {
            GatewayEvent::ItemNew { ref item, .. } => {
                assert_eq!(item.id, "1");
                saw_new = true;
            }
            GatewayEvent::ItemsUpdated { count, .. } => assert_eq!(count, 1),
            GatewayEvent::Heartbeat { .. } => saw_heartbeat = true,
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert!(saw_new);

    let polls = harness.store.recent_polls(1).await.unwrap();
    assert_eq!(polls.len(), 1);

    let _ = harness.shutdown.send(());
}

#[tokio::test]
async fn notification_history_query_round_trips() {
    let harness = start_gateway(StaticSource::new(vec![])).await;
    harness
        .store
        .append_notification(NotificationRecord {
            item_id: "42".into(),
            timestamp: Utc::now(),
            sent: true,
            title: Some("Item 42".into()),
            change: None,
            error: None,
        })
        .await
        .unwrap();
    harness
        .store
        .append_notification(NotificationRecord {
            item_id: "7".into(),
            timestamp: Utc::now(),
            sent: false,
            title: Some("Item 7".into()),
            change: None,
            error: Some("delivery failed".into()),
        })
        .await
        .unwrap();

    let (mut lines, mut write) = connect_raw(&harness.socket_path).await;
    write
        .write_all(b"{\"request\":\"get-notification-history\",\"itemId\":\"42\"}\n")
        .await
        .unwrap();

    match next_event(&mut lines).await {
        GatewayEvent::GetNotificationHistoryResult {
            success,
            history,
            count,
            error,
            ..
        } => {
            assert!(success);
            assert!(error.is_none());
            assert_eq!(count, 1);
            assert_eq!(history[0].item_id, "42");
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    let _ = harness.shutdown.send(());
}

#[tokio::test]
async fn notification_stats_query_round_trips() {
    let harness = start_gateway(StaticSource::new(vec![])).await;
    harness
        .store
        .append_notification(NotificationRecord {
            item_id: "1".into(),
            timestamp: Utc::now(),
            sent: true,
            title: Some("Item 1".into()),
            change: None,
            error: None,
        })
        .await
        .unwrap();

    let (mut lines, mut write) = connect_raw(&harness.socket_path).await;
    write
        .write_all(b"{\"request\":\"get-notification-stats\"}\n")
        .await
        .unwrap();

    match next_event(&mut lines).await {
        GatewayEvent::GetNotificationStatsResult { success, stats, .. } => {
            assert!(success);
            assert_eq!(stats.total_sent, 1);
            assert_eq!(stats.total_failed, 0);
            assert_eq!(stats.count_by_item.len(), 1);
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    let _ = harness.shutdown.send(());
}

#[tokio::test]
async fn unrecognized_request_gets_an_error_not_a_disconnect() {
    let harness = start_gateway(StaticSource::new(vec![])).await;
    let (mut lines, mut write) = connect_raw(&harness.socket_path).await;

    write.write_all(b"{\"request\":\"no-such-thing\"}\n").await.unwrap();
    assert!(matches!(
        next_event(&mut lines).await,
        GatewayEvent::Error { .. }
    ));

    // Connection survives; a valid request still works
    write
        .write_all(b"{\"request\":\"get-notification-stats\"}\n")
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut lines).await,
        GatewayEvent::GetNotificationStatsResult { .. }
    ));

    let _ = harness.shutdown.send(());
}

#[tokio::test]
async fn events_fan_out_to_every_connected_client() {
    let harness = start_gateway(StaticSource::new(vec![])).await;
    let (mut first, _first_write) = connect_raw(&harness.socket_path).await;
    let (mut second, _second_write) = connect_raw(&harness.socket_path).await;

    // Give both sessions a moment to subscribe before emitting
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.events.emit(GatewayEvent::Heartbeat {
        timestamp: Utc::now(),
    });

    assert!(matches!(
        next_event(&mut first).await,
        GatewayEvent::Heartbeat { .. }
    ));
    assert!(matches!(
        next_event(&mut second).await,
        GatewayEvent::Heartbeat { .. }
    ));

    let _ = harness.shutdown.send(());
}

#[tokio::test]
async fn stale_socket_file_is_replaced_on_startup() {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("gateway.sock");

    // Leftover from a crashed run: a path nobody is listening on
    tokio::fs::write(&socket_path, b"").await.unwrap();

    let store = CatalogStore::open(dir.path().join("catalog.json"))
        .await
        .unwrap();
    let notifier = Notifier::recover(
        store.clone(),
        Arc::new(LogAlerter),
        NotifyFilter::default(),
        chrono::Duration::minutes(60),
    )
    .await;
    let events = EventBus::new(8);
    let poller = Arc::new(Poller::new(
        Arc::new(StaticSource::new(vec![])),
        store.clone(),
        notifier,
        events.clone(),
    ));

    let (shutdown, rx) = broadcast::channel(1);
    let gateway = Gateway::new(&socket_path, store, events.clone(), poller);
    tokio::spawn(gateway.run(rx));

    // The stale file was swept aside and the gateway accepts clients
    let (mut lines, _write) = connect_raw(&socket_path).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    events.emit(GatewayEvent::Heartbeat {
        timestamp: Utc::now(),
    });
    assert!(matches!(
        next_event(&mut lines).await,
        GatewayEvent::Heartbeat { .. }
    ));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn rejected_force_poll_is_reported_over_the_broadcast() {
    let harness = start_gateway(StaticSource::slow(
        vec![item("1")],
        Duration::from_millis(300),
    ))
    .await;
    let (mut lines, mut write) = connect_raw(&harness.socket_path).await;

    // Two back-to-back requests: the second hits the single-flight guard
    write.write_all(b"{\"request\":\"force-poll\"}\n").await.unwrap();
    write.write_all(b"{\"request\":\"force-poll\"}\n").await.unwrap();

    let mut acks = 0;
    let mut refusals = 0;
    let mut saw_heartbeat = false;
    while !saw_heartbeat {
        match next_event(&mut lines).await {
            GatewayEvent::ForcePollReceived { .. } => acks += 1,
            GatewayEvent::Log { ref message, .. } => {
                assert!(message.contains("already in progress"));
                refusals += 1;
            }
            GatewayEvent::Heartbeat { .. } => saw_heartbeat = true,
            GatewayEvent::ItemNew { .. } | GatewayEvent::ItemsUpdated { .. } => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(acks, 2);
    assert_eq!(refusals, 1);

    // Only the accepted request entered poll history
    let polls = harness.store.recent_polls(10).await.unwrap();
    assert_eq!(polls.len(), 1);

    let _ = harness.shutdown.send(());
}

#[tokio::test]
async fn shutdown_waits_for_an_inflight_force_poll() {
    let harness = start_gateway(StaticSource::slow(
        vec![item("1")],
        Duration::from_millis(300),
    ))
    .await;
    let (mut lines, mut write) = connect_raw(&harness.socket_path).await;

    write.write_all(b"{\"request\":\"force-poll\"}\n").await.unwrap();
    assert!(matches!(
        next_event(&mut lines).await,
        GatewayEvent::ForcePollReceived { .. }
    ));

    // Shut down while the fetch is still sleeping
    tokio::time::sleep(Duration::from_millis(50)).await;
    let _ = harness.shutdown.send(());
    tokio::time::timeout(Duration::from_secs(5), harness.gateway_task)
        .await
        .expect("gateway did not shut down")
        .unwrap()
        .unwrap();

    // The poll finished and persisted before the gateway exited
    let polls = harness.store.recent_polls(1).await.unwrap();
    assert_eq!(polls.len(), 1);
    assert!(polls[0].success);
    assert!(harness.store.get_item("1").await.unwrap().is_some());
}
