//! Transient per-room relay of pending join notifications
//!
//! Each room has an ordered queue of serialized participation snapshots,
//! appended by the join path and consumed only by the drain cycle. The queue
//! is relay state, not an audit log: once drained, entries are gone whether
//! or not the broadcast that follows succeeds.
//!
//! The per-room watermark (highest rank already included in an authoritative
//! broadcast) lives with the queue backend, since it is exclusively
//! drain-cycle state. Rooms are discovered by enumerating live queue keys, so
//! a room with no joins since the last drain contributes no work.

mod redis;

pub use self::redis::RedisRelayQueue;

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::RoomId;

/// Redis key prefix for relay queues
pub const QUEUE_KEY_PREFIX: &str = "participation-queue:";

/// Redis key prefix for drain watermarks
pub const WATERMARK_KEY_PREFIX: &str = "last-processed:";

/// Ordered per-room buffer plus drain watermark
#[async_trait]
pub trait RelayQueue: Send + Sync {
    /// Append an entry to the tail of the room's queue
    async fn push(&self, room_id: RoomId, entry: &str) -> Result<()>;

    /// Non-destructive snapshot of the room's queued entries, head first.
    /// Used by the join path's optimistic broadcast.
    async fn entries(&self, room_id: RoomId) -> Result<Vec<String>>;

    /// Remove and return every entry in the room's queue, head first
    async fn drain_all(&self, room_id: RoomId) -> Result<Vec<String>>;

    /// Rooms that currently have a non-empty queue
    async fn active_rooms(&self) -> Result<Vec<RoomId>>;

    /// Highest rank already broadcast for the room (0 if none)
    async fn watermark(&self, room_id: RoomId) -> Result<i64>;

    /// Advance the room's watermark
    async fn set_watermark(&self, room_id: RoomId, rank: i64) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryQueueState {
    queues: HashMap<RoomId, VecDeque<String>>,
    watermarks: HashMap<RoomId, i64>,
}

/// In-process queue for single-process deployments and tests
#[derive(Debug, Default)]
pub struct MemoryRelayQueue {
    state: Mutex<MemoryQueueState>,
}

impl MemoryRelayQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RelayQueue for MemoryRelayQueue {
    async fn push(&self, room_id: RoomId, entry: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .queues
            .entry(room_id)
            .or_default()
            .push_back(entry.to_string());
        Ok(())
    }

    async fn entries(&self, room_id: RoomId) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .queues
            .get(&room_id)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn drain_all(&self, room_id: RoomId) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .queues
            .remove(&room_id)
            .map(Vec::from)
            .unwrap_or_default())
    }

    async fn active_rooms(&self) -> Result<Vec<RoomId>> {
        let state = self.state.lock().unwrap();
        let mut rooms: Vec<RoomId> = state
            .queues
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(room_id, _)| *room_id)
            .collect();
        rooms.sort_unstable();
        Ok(rooms)
    }

    async fn watermark(&self, room_id: RoomId) -> Result<i64> {
        let state = self.state.lock().unwrap();
        Ok(state.watermarks.get(&room_id).copied().unwrap_or(0))
    }

    async fn set_watermark(&self, room_id: RoomId, rank: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.watermarks.insert(room_id, rank);
        Ok(())
    }
}
