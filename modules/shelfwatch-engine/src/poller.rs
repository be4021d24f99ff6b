//! The poll orchestrator: fetch, diff, persist, notify, broadcast.
//!
//! Exactly one poll runs at a time. Concurrent requests are rejected with a
//! distinguishable outcome, never queued; a rejected caller retries on its
//! own schedule.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use shelfwatch_common::{
    ChangeSet, EventBus, GatewayEvent, PollAttempt, ShelfwatchError,
};
use shelfwatch_store::CatalogStore;

use crate::differ::compare;
use crate::notifier::{DispatchOutcome, Notifier};
use crate::traits::CatalogSource;

/// The result of one completed poll attempt. `success` stays true even when
/// individual notifications failed; only fetch/validation errors flip it.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSummary {
    pub success: bool,
    pub item_count: u32,
    pub new_count: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(PollSummary),
    /// Rejected by the single-flight guard. Expected under normal operation,
    /// so it is not logged at error level and leaves no poll record.
    AlreadyInProgress,
}

pub struct Poller {
    source: Arc<dyn CatalogSource>,
    store: CatalogStore,
    notifier: Notifier,
    events: EventBus,
    in_flight: AtomicBool,
}

/// Releases the single-flight flag when dropped, so the guard holds through
/// every early return and error path.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Poller {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        store: CatalogStore,
        notifier: Notifier,
        events: EventBus,
    ) -> Self {
        Self {
            source,
            store,
            notifier,
            events,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run one fetch-diff-persist-notify cycle, optionally restricted to a
    /// single item id. Exactly one poll record is appended per completed
    /// attempt, success or failure.
    pub async fn execute_poll(&self, target_id: Option<&str>) -> PollOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Poll request rejected: already in progress");
            return PollOutcome::AlreadyInProgress;
        }
        let _guard = FlightGuard(&self.in_flight);

        let started = Instant::now();
        let started_at = Utc::now();

        let summary = match self.poll_inner(target_id, started_at).await {
            Ok((item_count, new_count)) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(item_count, new_count, duration_ms, "Poll complete");
                PollSummary {
                    success: true,
                    item_count,
                    new_count,
                    duration_ms,
                    error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "Poll failed");
                self.events.emit(GatewayEvent::Error {
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                PollSummary {
                    success: false,
                    item_count: 0,
                    new_count: 0,
                    duration_ms: started.elapsed().as_millis() as u64,
                    error: Some(e.to_string()),
                }
            }
        };

        let attempt = PollAttempt {
            timestamp: started_at,
            item_count: summary.item_count,
            new_count: summary.new_count,
            duration_ms: summary.duration_ms,
            success: summary.success,
            error: summary.error.clone(),
        };
        if let Err(e) = self.store.append_poll(attempt).await {
            warn!(error = %e, "Failed to append poll record");
        }

        // Heartbeat after every attempt, success or failure
        self.events.emit(GatewayEvent::Heartbeat {
            timestamp: Utc::now(),
        });

        PollOutcome::Completed(summary)
    }

    async fn poll_inner(
        &self,
        target_id: Option<&str>,
        observed_at: DateTime<Utc>,
    ) -> Result<(u32, u32), ShelfwatchError> {
        let mut fresh = self
            .source
            .fetch_catalog()
            .await
            .map_err(|e| ShelfwatchError::Fetch(e.to_string()))?;

        if let Some(id) = target_id {
            fresh.retain(|i| i.id == id);
            if fresh.is_empty() {
                return Err(ShelfwatchError::TargetNotFound(id.to_string()));
            }
        }

        // Every observation in this poll carries the poll's timestamp; the
        // store preserves first_seen_at for items it already knows.
        for item in &mut fresh {
            item.first_seen_at = observed_at;
            item.last_seen_at = observed_at;
        }

        let prior = self
            .store
            .all_items()
            .await
            .map_err(|e| ShelfwatchError::Store(e.to_string()))?;
        let cold_start = prior.is_empty();

        let changes = compare(&prior, &fresh);

        self.store
            .upsert_items(&fresh)
            .await
            .map_err(|e| ShelfwatchError::Store(e.to_string()))?;

        let new_count = changes.new_items.len() as u32;

        if cold_start {
            if new_count > 0 {
                info!(new_count, "Cold start: suppressing notifications for initial catalog");
            }
        } else {
            self.notify_changes(&changes).await;
        }

        self.broadcast_changes(&changes);

        Ok((fresh.len() as u32, new_count))
    }

    /// Dispatch notifications for the change set, sequentially in feed
    /// order. One item's failure never aborts the batch.
    async fn notify_changes(&self, changes: &ChangeSet) {
        for item in &changes.new_items {
            if !self.notifier.should_notify(item) {
                continue;
            }
            let outcome = self.notifier.dispatch(item, Some("new item".to_string())).await;
            if outcome == DispatchOutcome::Failed {
                debug!(item_id = %item.id, "Notification for new item failed, continuing");
            }
        }

        for item in &changes.updated_items {
            if !self.notifier.should_notify(item) {
                continue;
            }
            let note = change_note(changes, &item.id);
            let outcome = self.notifier.dispatch(item, note).await;
            if outcome == DispatchOutcome::Failed {
                debug!(item_id = %item.id, "Notification for updated item failed, continuing");
            }
        }
    }

    fn broadcast_changes(&self, changes: &ChangeSet) {
        let now = Utc::now();

        for item in &changes.new_items {
            self.events.emit(GatewayEvent::ItemNew {
                item: item.clone(),
                timestamp: now,
            });
        }

        if !changes.is_empty() {
            let items: Vec<_> = changes
                .new_items
                .iter()
                .chain(changes.updated_items.iter())
                .cloned()
                .collect();
            let count = items.len();
            self.events.emit(GatewayEvent::ItemsUpdated {
                items,
                count,
                timestamp: now,
            });
        }
    }

    /// The recurring poll loop plus the daily notification-history prune.
    /// Runs until the shutdown signal resolves; an in-flight poll always
    /// finishes before the loop exits.
    pub async fn run(
        self: Arc<Self>,
        poll_interval: std::time::Duration,
        retention: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut poll_tick = tokio::time::interval(poll_interval);
        poll_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut prune_tick =
            tokio::time::interval(std::time::Duration::from_secs(24 * 60 * 60));
        prune_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = poll_interval.as_secs(),
            retention_days = retention.num_days(),
            "Poll loop started"
        );

        loop {
            tokio::select! {
                _ = poll_tick.tick() => {
                    if let PollOutcome::AlreadyInProgress = self.execute_poll(None).await {
                        debug!("Scheduled poll skipped: previous poll still running");
                    }
                }
                _ = prune_tick.tick() => {
                    let cutoff = Utc::now() - retention;
                    match self.store.prune_notifications(cutoff).await {
                        Ok(removed) if removed > 0 => {
                            info!(removed, "Pruned old notification records");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Notification prune failed"),
                    }
                }
                _ = shutdown.recv() => {
                    info!("Poll loop shutting down");
                    break;
                }
            }
        }
    }
}

fn change_note(changes: &ChangeSet, item_id: &str) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(pc) = changes.price_changes.iter().find(|c| c.item_id == item_id) {
        parts.push(format!("price {:.2} -> {:.2}", pc.old_price, pc.new_price));
    }
    if let Some(ac) = changes
        .availability_changes
        .iter()
        .find(|c| c.item_id == item_id)
    {
        parts.push(if ac.now { "back in stock" } else { "out of stock" }.to_string());
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}
