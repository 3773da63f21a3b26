//! Publish-only fan-out to room subscribers
//!
//! Delivery is fire-and-forget: no acknowledgment, nothing is queued for
//! subscribers that are not currently connected. Two call sites publish to
//! the same per-room topic: the join path (an optimistic early notice of
//! lower-ranked entries) and the drain cycle (the authoritative rank-ordered
//! batch). Consumers must therefore treat messages as at-least-once and
//! de-duplicate by rank; seeing a given rank twice is expected.

mod redis;

pub use self::redis::RedisBroadcaster;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;
use crate::models::{ParticipationRecord, RoomId};

/// Topic a room's subscribers listen on
pub fn room_topic(room_id: RoomId) -> String {
    format!("/result/sub/participations/{room_id}")
}

/// A published batch as seen by in-process subscribers
#[derive(Debug, Clone)]
pub struct BroadcastMessage {
    pub topic: String,
    pub room_id: RoomId,
    pub batch: Vec<ParticipationRecord>,
}

/// Fire-and-forget fan-out channel
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Publish a rank-ordered batch to the room's topic
    async fn publish(&self, room_id: RoomId, batch: &[ParticipationRecord]) -> Result<()>;
}

/// In-process fan-out over a tokio broadcast channel
///
/// Used by single-process deployments and the test suite; lagging or absent
/// subscribers simply miss messages, matching the delivery contract.
pub struct ChannelBroadcaster {
    sender: broadcast::Sender<BroadcastMessage>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to every room's published batches
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastMessage> {
        self.sender.subscribe()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Broadcaster for ChannelBroadcaster {
    async fn publish(&self, room_id: RoomId, batch: &[ParticipationRecord]) -> Result<()> {
        let message = BroadcastMessage {
            topic: room_topic(room_id),
            room_id,
            batch: batch.to_vec(),
        };

        // A send error only means nobody is subscribed right now
        if self.sender.send(message).is_err() {
            tracing::debug!(room_id, "No subscribers for broadcast");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(rank: i64) -> ParticipationRecord {
        ParticipationRecord {
            room_id: 1,
            member_id: rank,
            joined_at: Utc::now(),
            rank,
            is_winner: false,
            winner_name: "n".to_string(),
        }
    }

    #[test]
    fn test_room_topic() {
        assert_eq!(room_topic(9), "/result/sub/participations/9");
    }

    #[tokio::test]
    async fn test_subscriber_receives_batch() {
        let broadcaster = ChannelBroadcaster::default();
        let mut rx = broadcaster.subscribe();

        broadcaster
            .publish(1, &[record(1), record(2)])
            .await
            .unwrap();

        let message = rx.recv().await.unwrap();
        assert_eq!(message.room_id, 1);
        assert_eq!(message.topic, "/result/sub/participations/1");
        assert_eq!(message.batch.len(), 2);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let broadcaster = ChannelBroadcaster::default();
        assert!(broadcaster.publish(1, &[record(1)]).await.is_ok());
    }
}
