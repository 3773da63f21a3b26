//! Atomic rank issuance per room
//!
//! The allocator is the single source of truth for the next rank to issue.
//! It must only be called while holding the room's lock; the lock serializes
//! every call for a room, so the allocator itself only needs atomicity on the
//! backing counter, not mutual exclusion.
//!
//! [`RedisRankAllocator`] keeps the counter in Redis (`INCR`), so ranks
//! survive process restarts and are shared by every service instance.
//! [`LocalRankAllocator`] owns its counters explicitly per instance, for
//! dry-run deployments and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;

use crate::error::Result;
use crate::models::RoomId;

/// Redis key prefix for rank counters
pub const RANKING_KEY_PREFIX: &str = "ranking:";

/// Monotonically increasing rank issuance, keyed by room
#[async_trait]
pub trait RankAllocator: Send + Sync {
    /// Issue the next rank for the room, starting at 1. Call only while
    /// holding the room's lock.
    async fn next_rank(&self, room_id: RoomId) -> Result<i64>;

    /// Delete the room's counter so the next rank starts at 1 again.
    /// Admin/test support; never part of the join path.
    async fn reset(&self, room_id: RoomId) -> Result<()>;
}

fn ranking_key(room_id: RoomId) -> String {
    format!("{RANKING_KEY_PREFIX}{room_id}")
}

/// Rank counter on a shared durable Redis backend
pub struct RedisRankAllocator {
    pool: Pool,
}

impl RedisRankAllocator {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RankAllocator for RedisRankAllocator {
    async fn next_rank(&self, room_id: RoomId) -> Result<i64> {
        let mut conn = self.pool.get().await?;
        let rank: i64 = conn.incr(ranking_key(room_id), 1).await?;
        Ok(rank)
    }

    async fn reset(&self, room_id: RoomId) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.del(ranking_key(room_id)).await?;
        tracing::info!(room_id, "Rank counter deleted");
        Ok(())
    }
}

/// Allocator-owned in-process counters for dry-run deployments and tests
///
/// The counters live on the allocator instance, not in module-level state,
/// so every construction starts from a clean slate.
#[derive(Debug, Default)]
pub struct LocalRankAllocator {
    counters: Mutex<HashMap<RoomId, i64>>,
}

impl LocalRankAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RankAllocator for LocalRankAllocator {
    async fn next_rank(&self, room_id: RoomId) -> Result<i64> {
        let mut counters = self.counters.lock().unwrap();
        let counter = counters.entry(room_id).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn reset(&self, room_id: RoomId) -> Result<()> {
        self.counters.lock().unwrap().remove(&room_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranking_key_namespace() {
        assert_eq!(ranking_key(7), "ranking:7");
    }

    #[tokio::test]
    async fn test_ranks_start_at_one_and_increase() {
        let allocator = LocalRankAllocator::new();

        assert_eq!(allocator.next_rank(1).await.unwrap(), 1);
        assert_eq!(allocator.next_rank(1).await.unwrap(), 2);
        assert_eq!(allocator.next_rank(1).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_rooms_count_independently() {
        let allocator = LocalRankAllocator::new();

        assert_eq!(allocator.next_rank(1).await.unwrap(), 1);
        assert_eq!(allocator.next_rank(2).await.unwrap(), 1);
        assert_eq!(allocator.next_rank(1).await.unwrap(), 2);
        assert_eq!(allocator.next_rank(2).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reset_restarts_from_one() {
        let allocator = LocalRankAllocator::new();

        allocator.next_rank(1).await.unwrap();
        allocator.next_rank(1).await.unwrap();
        allocator.reset(1).await.unwrap();

        assert_eq!(allocator.next_rank(1).await.unwrap(), 1);
    }
}
