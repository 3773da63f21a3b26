//! Redis-backed relay queue
//!
//! Queues are Redis lists at `participation-queue:{room_id}`, watermarks are
//! scalars at `last-processed:{room_id}`. Active rooms are discovered with a
//! cursor SCAN over the queue prefix rather than KEYS, so discovery does not
//! stall the backend under load.

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;

use crate::error::Result;
use crate::models::RoomId;

use super::{RelayQueue, QUEUE_KEY_PREFIX, WATERMARK_KEY_PREFIX};

pub struct RedisRelayQueue {
    pool: Pool,
}

impl RedisRelayQueue {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    fn queue_key(room_id: RoomId) -> String {
        format!("{QUEUE_KEY_PREFIX}{room_id}")
    }

    fn watermark_key(room_id: RoomId) -> String {
        format!("{WATERMARK_KEY_PREFIX}{room_id}")
    }

    /// Parse the room id out of a queue key, e.g. `participation-queue:42`
    fn room_from_key(key: &str) -> Option<RoomId> {
        key.strip_prefix(QUEUE_KEY_PREFIX)?.parse().ok()
    }
}

#[async_trait]
impl RelayQueue for RedisRelayQueue {
    async fn push(&self, room_id: RoomId, entry: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.rpush(Self::queue_key(room_id), entry).await?;
        Ok(())
    }

    async fn entries(&self, room_id: RoomId) -> Result<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let entries: Vec<String> = conn.lrange(Self::queue_key(room_id), 0, -1).await?;
        Ok(entries)
    }

    async fn drain_all(&self, room_id: RoomId) -> Result<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let key = Self::queue_key(room_id);
        let mut drained = Vec::new();

        // Pop one at a time so entries pushed mid-drain are either taken now
        // or left intact for the next cycle, never lost.
        loop {
            let entry: Option<String> = conn.lpop(&key, None).await?;
            match entry {
                Some(entry) => drained.push(entry),
                None => break,
            }
        }

        Ok(drained)
    }

    async fn active_rooms(&self) -> Result<Vec<RoomId>> {
        let mut conn = self.pool.get().await?;
        let pattern = format!("{QUEUE_KEY_PREFIX}*");
        let mut rooms = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut *conn)
                .await?;

            for key in keys {
                match Self::room_from_key(&key) {
                    Some(room_id) => rooms.push(room_id),
                    None => {
                        tracing::warn!(key = %key, "Queue key with unparseable room id skipped")
                    }
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        // SCAN may report a key more than once
        rooms.sort_unstable();
        rooms.dedup();
        Ok(rooms)
    }

    async fn watermark(&self, room_id: RoomId) -> Result<i64> {
        let mut conn = self.pool.get().await?;
        let watermark: Option<i64> = conn.get(Self::watermark_key(room_id)).await?;
        Ok(watermark.unwrap_or(0))
    }

    async fn set_watermark(&self, room_id: RoomId, rank: i64) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.set(Self::watermark_key(room_id), rank).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_namespaces() {
        assert_eq!(RedisRelayQueue::queue_key(3), "participation-queue:3");
        assert_eq!(RedisRelayQueue::watermark_key(3), "last-processed:3");
    }

    #[test]
    fn test_room_from_key() {
        assert_eq!(
            RedisRelayQueue::room_from_key("participation-queue:42"),
            Some(42)
        );
        assert_eq!(
            RedisRelayQueue::room_from_key("participation-queue:not-a-room"),
            None
        );
        assert_eq!(RedisRelayQueue::room_from_key("other-key:42"), None);
    }
}
