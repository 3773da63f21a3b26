//! Redis pub/sub broadcaster

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;

use crate::error::Result;
use crate::models::{ParticipationRecord, RoomId};

use super::{room_topic, Broadcaster};

/// Fan-out over Redis PUBLISH
///
/// Redis pub/sub gives exactly the promised delivery semantics: connected
/// subscribers get the message, disconnected ones miss it, nobody acks.
pub struct RedisBroadcaster {
    pool: Pool,
}

impl RedisBroadcaster {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Broadcaster for RedisBroadcaster {
    async fn publish(&self, room_id: RoomId, batch: &[ParticipationRecord]) -> Result<()> {
        let payload = serde_json::to_string(batch)?;
        let mut conn = self.pool.get().await?;

        let receivers: i64 = conn.publish(room_topic(room_id), payload).await?;
        tracing::debug!(room_id, receivers, entries = batch.len(), "Published batch");

        Ok(())
    }
}
