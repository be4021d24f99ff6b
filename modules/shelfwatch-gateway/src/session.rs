//! One connected client: a line-oriented request reader multiplexed with the
//! broadcast event stream. Query responses go only to the requesting client;
//! broadcast events reach every client.

use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use shelfwatch_common::{EventBus, GatewayEvent, GatewayRequest, NotificationStats};
use shelfwatch_engine::{PollOutcome, Poller};
use shelfwatch_store::CatalogStore;

pub(crate) async fn serve_client(
    stream: UnixStream,
    store: CatalogStore,
    events: EventBus,
    poller: Arc<Poller>,
    force_polls: Arc<Mutex<JoinSet<()>>>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut rx = events.subscribe();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let reply =
                            handle_request(&line, &store, &events, &poller, &force_polls).await;
                        if write_event(&mut write_half, &reply).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("Gateway client disconnected");
                        break;
                    }
                    Err(e) => {
                        debug!(error = %e, "Gateway client read failed");
                        break;
                    }
                }
            }
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        if write_event(&mut write_half, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Slow consumer; keep the connection, drop the backlog
                        warn!(skipped, "Gateway client lagged behind the event stream");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}

/// Parse and execute one request line, producing the reply for this client.
async fn handle_request(
    line: &str,
    store: &CatalogStore,
    events: &EventBus,
    poller: &Arc<Poller>,
    force_polls: &Arc<Mutex<JoinSet<()>>>,
) -> GatewayEvent {
    let request: GatewayRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Unparseable gateway request");
            return GatewayEvent::Error {
                error: format!("unrecognized request: {e}"),
                timestamp: Utc::now(),
            };
        }
    };

    match request {
        GatewayRequest::ForcePoll => {
            // Acknowledge immediately; the poll itself reports through the
            // broadcast stream when it finishes. The task lands in the shared
            // JoinSet so shutdown can wait for an in-flight poll.
            let poller = Arc::clone(poller);
            let events = events.clone();
            let mut set = force_polls.lock().await;
            while set.try_join_next().is_some() {}
            set.spawn(async move {
                if let PollOutcome::AlreadyInProgress = poller.execute_poll(None).await {
                    events.emit(GatewayEvent::Log {
                        level: "info".to_string(),
                        message: "force poll refused: a poll is already in progress".to_string(),
                        timestamp: Utc::now(),
                    });
                }
            });
            GatewayEvent::ForcePollReceived {
                timestamp: Utc::now(),
            }
        }
        GatewayRequest::GetNotificationHistory { query } => {
            match store.query_notifications(&query).await {
                Ok(history) => GatewayEvent::GetNotificationHistoryResult {
                    success: true,
                    count: history.len(),
                    history,
                    error: None,
                    timestamp: Utc::now(),
                },
                Err(e) => GatewayEvent::GetNotificationHistoryResult {
                    success: false,
                    history: vec![],
                    count: 0,
                    error: Some(e.to_string()),
                    timestamp: Utc::now(),
                },
            }
        }
        GatewayRequest::GetNotificationStats => match store.notification_stats().await {
            Ok(stats) => GatewayEvent::GetNotificationStatsResult {
                success: true,
                stats,
                error: None,
                timestamp: Utc::now(),
            },
            Err(e) => GatewayEvent::GetNotificationStatsResult {
                success: false,
                stats: NotificationStats::default(),
                error: Some(e.to_string()),
                timestamp: Utc::now(),
            },
        },
    }
}

/// One event per line, JSON then newline.
async fn write_event(write_half: &mut OwnedWriteHalf, event: &GatewayEvent) -> std::io::Result<()> {
    let mut bytes = serde_json::to_vec(event).map_err(std::io::Error::other)?;
    bytes.push(b'\n');
    write_half.write_all(&bytes).await
}
