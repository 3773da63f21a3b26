//! Periodic drain-and-broadcast loop
//!
//! A single scheduler task wakes on a fixed period, drains every non-empty
//! relay queue, filters each room's entries against its watermark, and
//! publishes the surviving entries as the authoritative rank-ordered batch.
//! Broadcast latency is therefore bounded by the period, independent of join
//! volume.
//!
//! The drain never takes room locks. A join committing mid-cycle is simply
//! picked up by the next tick. Failures are isolated per entry (malformed
//! entries are logged and skipped) and per room (one room's backend error
//! never aborts the others).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::broadcast::Broadcaster;
use crate::error::Result;
use crate::metrics;
use crate::models::{ParticipationRecord, RoomId};
use crate::queue::RelayQueue;

/// Outcome of one drain cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Rooms whose queues were drained this cycle
    pub rooms_drained: usize,
    /// Entries published in authoritative batches
    pub entries_broadcast: usize,
    /// Entries skipped because they failed to parse
    pub malformed_entries: u64,
    /// Rooms whose drain failed on a backend error
    pub rooms_failed: usize,
}

#[derive(Debug, Default)]
struct RoomDrain {
    broadcast: usize,
    malformed: u64,
}

/// Fixed-interval scheduler draining all relay queues
pub struct DrainScheduler {
    queue: Arc<dyn RelayQueue>,
    broadcaster: Arc<dyn Broadcaster>,
    interval: Duration,
    shutdown: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl DrainScheduler {
    pub fn new(
        queue: Arc<dyn RelayQueue>,
        broadcaster: Arc<dyn Broadcaster>,
        interval: Duration,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        Self {
            queue,
            broadcaster,
            interval,
            shutdown,
            shutdown_rx,
        }
    }

    /// Execute one drain cycle immediately
    pub async fn run_once(&self) -> DrainStats {
        Self::run_cycle(&self.queue, &self.broadcaster).await
    }

    async fn run_cycle(
        queue: &Arc<dyn RelayQueue>,
        broadcaster: &Arc<dyn Broadcaster>,
    ) -> DrainStats {
        let mut stats = DrainStats::default();

        let rooms = match queue.active_rooms().await {
            Ok(rooms) => rooms,
            Err(e) => {
                tracing::error!(error = %e, "Failed to enumerate relay queues");
                return stats;
            }
        };

        if rooms.is_empty() {
            tracing::debug!("No pending relay queues");
            metrics::record_drain_cycle(0);
            return stats;
        }

        for room_id in rooms {
            match Self::drain_room(queue, broadcaster, room_id).await {
                Ok(room) => {
                    stats.rooms_drained += 1;
                    stats.entries_broadcast += room.broadcast;
                    stats.malformed_entries += room.malformed;
                }
                Err(e) => {
                    stats.rooms_failed += 1;
                    tracing::error!(room_id, error = %e, "Drain failed for room");
                }
            }
        }

        metrics::record_drain_cycle(stats.malformed_entries);
        stats
    }

    async fn drain_room(
        queue: &Arc<dyn RelayQueue>,
        broadcaster: &Arc<dyn Broadcaster>,
        room_id: RoomId,
    ) -> Result<RoomDrain> {
        let raw = queue.drain_all(room_id).await?;
        if raw.is_empty() {
            return Ok(RoomDrain::default());
        }

        let watermark = queue.watermark(room_id).await?;
        let mut room = RoomDrain::default();
        let mut batch: Vec<ParticipationRecord> = Vec::with_capacity(raw.len());

        for entry in &raw {
            match serde_json::from_str::<ParticipationRecord>(entry) {
                Ok(record) if record.rank > watermark => batch.push(record),
                Ok(record) => {
                    // Already included in a prior authoritative batch
                    tracing::debug!(room_id, rank = record.rank, "Entry below watermark dropped");
                }
                Err(e) => {
                    room.malformed += 1;
                    tracing::warn!(room_id, error = %e, "Skipping malformed relay entry");
                }
            }
        }

        if batch.is_empty() {
            return Ok(room);
        }

        batch.sort_by_key(|r| r.rank);
        let max_rank = batch.last().map(|r| r.rank).unwrap_or(watermark);

        broadcaster.publish(room_id, &batch).await?;
        queue.set_watermark(room_id, max_rank).await?;

        metrics::record_broadcast("authoritative", batch.len());
        tracing::info!(
            room_id,
            entries = batch.len(),
            watermark = max_rank,
            "Broadcast authoritative batch"
        );

        room.broadcast = batch.len();
        Ok(room)
    }

    /// Spawn the periodic drain task
    pub fn spawn(&self) -> DrainHandle {
        let queue = self.queue.clone();
        let broadcaster = self.broadcaster.clone();
        let interval_duration = self.interval;
        let mut shutdown_rx = self.shutdown_rx.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(interval_duration);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let stats = Self::run_cycle(&queue, &broadcaster).await;
                        if stats.rooms_drained > 0 || stats.rooms_failed > 0 {
                            tracing::debug!(
                                rooms = stats.rooms_drained,
                                entries = stats.entries_broadcast,
                                malformed = stats.malformed_entries,
                                failed = stats.rooms_failed,
                                "Drain cycle completed"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::info!("Drain scheduler shutting down");
                        break;
                    }
                }
            }
        });

        DrainHandle {
            handle,
            shutdown: self.shutdown.clone(),
        }
    }

    /// Trigger shutdown without waiting
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

// ============================================================================
// Drain Handle
// ============================================================================

/// Handle to the running drain task
pub struct DrainHandle {
    handle: tokio::task::JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl DrainHandle {
    /// Wait for the task to complete
    pub async fn wait(self) {
        let _ = self.handle.await;
    }

    /// Trigger shutdown and wait
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        self.wait().await;
    }

    /// Check if the task is still running
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}
