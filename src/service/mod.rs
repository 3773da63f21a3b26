//! Participation service: the join critical section and read paths
//!
//! A join runs entirely inside its room's lock: member/room lookup, timing
//! and duplicate validation, rank issuance, persistence, and the relay queue
//! push. Rank issuance is therefore totally ordered per room. The lock is
//! released on every path out of the critical section; if the release itself
//! fails, the lease expiry bounds the damage.
//!
//! Immediately after its own save, a join publishes the currently-queued
//! entries ranked below it as an optimistic early notice. The authoritative
//! broadcast is the drain cycle's job ([`crate::drain`]).

use std::sync::Arc;
use std::time::Instant;

use deadpool_redis::{Config as PoolConfig, Pool, Runtime};

use crate::broadcast::{Broadcaster, ChannelBroadcaster, RedisBroadcaster};
use crate::config::{Config, LockConfig};
use crate::directory::{Clock, MemberDirectory, RoomDirectory, SystemClock};
use crate::error::{Error, Result};
use crate::lock::{LocalLockCoordinator, LockCoordinator, RedisLockCoordinator};
use crate::metrics;
use crate::models::{MemberId, ParticipationRecord, RoomId};
use crate::queue::{MemoryRelayQueue, RedisRelayQueue, RelayQueue};
use crate::ranking::{LocalRankAllocator, RankAllocator, RedisRankAllocator};
use crate::store::{MemoryParticipationStore, ParticipationStore, SqliteParticipationStore};

// ============================================================================
// Backend Wiring
// ============================================================================

/// The injectable backend strategy for the participation core
///
/// Production wiring shares lock, counter, queue, and broadcast state through
/// Redis; the in-memory wiring is the dry-run mode, chosen at construction
/// time rather than through parallel code paths.
#[derive(Clone)]
pub struct Backends {
    pub locks: Arc<dyn LockCoordinator>,
    pub ranks: Arc<dyn RankAllocator>,
    pub store: Arc<dyn ParticipationStore>,
    pub queue: Arc<dyn RelayQueue>,
    pub broadcaster: Arc<dyn Broadcaster>,
}

impl Backends {
    /// Redis-coordinated backends plus the SQLite store
    pub async fn redis(config: &Config) -> Result<Self> {
        let pool = create_redis_pool(config)?;

        // Fail fast if the coordination backend is unreachable
        let mut conn = pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        drop(conn);
        tracing::info!(url = %config.redis.url, "Connected to Redis");

        let store = SqliteParticipationStore::new(&config.database.sqlite_path)?;

        Ok(Self {
            locks: Arc::new(RedisLockCoordinator::new(pool.clone())),
            ranks: Arc::new(RedisRankAllocator::new(pool.clone())),
            store: Arc::new(store),
            queue: Arc::new(RedisRelayQueue::new(pool.clone())),
            broadcaster: Arc::new(RedisBroadcaster::new(pool)),
        })
    }

    /// In-process backends for dry-run deployments and tests
    ///
    /// Returns the channel broadcaster alongside so callers can subscribe to
    /// the published batches.
    pub fn in_memory() -> (Self, Arc<ChannelBroadcaster>) {
        let broadcaster = Arc::new(ChannelBroadcaster::default());
        let backends = Self {
            locks: Arc::new(LocalLockCoordinator::new()),
            ranks: Arc::new(LocalRankAllocator::new()),
            store: Arc::new(MemoryParticipationStore::new()),
            queue: Arc::new(MemoryRelayQueue::new()),
            broadcaster: broadcaster.clone(),
        };
        (backends, broadcaster)
    }
}

fn create_redis_pool(config: &Config) -> Result<Pool> {
    PoolConfig::from_url(&config.redis.url)
        .builder()
        .map_err(|e| Error::config(format!("failed to create Redis pool builder: {e}")))?
        .max_size(config.redis.pool_size)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| Error::config(format!("failed to create Redis pool: {e}")))
}

// ============================================================================
// Participation Service
// ============================================================================

/// Join and read operations for event-room participation
pub struct ParticipationService {
    backends: Backends,
    rooms: Arc<dyn RoomDirectory>,
    members: Arc<dyn MemberDirectory>,
    clock: Arc<dyn Clock>,
    lock_config: LockConfig,
}

impl ParticipationService {
    pub fn new(
        backends: Backends,
        rooms: Arc<dyn RoomDirectory>,
        members: Arc<dyn MemberDirectory>,
        lock_config: LockConfig,
    ) -> Self {
        Self::with_clock(backends, rooms, members, lock_config, Arc::new(SystemClock))
    }

    /// Construct with an explicit time source (tests, simulations)
    pub fn with_clock(
        backends: Backends,
        rooms: Arc<dyn RoomDirectory>,
        members: Arc<dyn MemberDirectory>,
        lock_config: LockConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backends,
            rooms,
            members,
            clock,
            lock_config,
        }
    }

    /// Shared access to the backend wiring (drain scheduler, admin paths)
    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    /// Join a room: issue the member's rank and fan out the early notice
    ///
    /// Terminal rejections (`LockTimeout`, `RoomNotFound`, `MemberNotFound`,
    /// `EventNotStarted`, `AlreadyParticipated`) leave counter, store, and
    /// queue untouched.
    pub async fn join(
        &self,
        room_id: RoomId,
        member_id: MemberId,
    ) -> Result<ParticipationRecord> {
        let started = Instant::now();
        let result = self.join_with_lock(room_id, member_id).await;

        match &result {
            Ok(record) => {
                metrics::record_join(started.elapsed().as_secs_f64());
                tracing::info!(
                    room_id,
                    member_id,
                    rank = record.rank,
                    is_winner = record.is_winner,
                    "Participation saved"
                );
            }
            Err(e) if e.is_rejection() => {
                metrics::record_join_rejection(e.reason());
                tracing::debug!(room_id, member_id, reason = e.reason(), "Join rejected");
            }
            Err(e) => {
                metrics::record_join_rejection(e.reason());
                tracing::error!(room_id, member_id, error = %e, "Join failed");
            }
        }

        result
    }

    async fn join_with_lock(
        &self,
        room_id: RoomId,
        member_id: MemberId,
    ) -> Result<ParticipationRecord> {
        let lock = self
            .backends
            .locks
            .acquire(
                room_id,
                self.lock_config.wait_timeout(),
                self.lock_config.lease_timeout(),
            )
            .await?;

        let result = self.join_locked(room_id, member_id).await;

        if let Err(e) = self.backends.locks.release(lock).await {
            tracing::warn!(
                room_id,
                error = %e,
                "Failed to release room lock; lease expiry will free it"
            );
        }

        result
    }

    async fn join_locked(
        &self,
        room_id: RoomId,
        member_id: MemberId,
    ) -> Result<ParticipationRecord> {
        let member = self
            .members
            .find(member_id)
            .await?
            .ok_or(Error::MemberNotFound(member_id))?;
        let room = self
            .rooms
            .find(room_id)
            .await?
            .ok_or(Error::RoomNotFound(room_id))?;

        let now = self.clock.now();
        if !room.has_started(now) {
            return Err(Error::EventNotStarted {
                room_id,
                starts_at: room.start_time,
            });
        }

        if self.backends.store.exists(room_id, member_id).await? {
            return Err(Error::AlreadyParticipated { room_id, member_id });
        }

        let rank = self.backends.ranks.next_rank(room_id).await?;
        let record = ParticipationRecord::issued(&room, &member, rank, now);

        if let Err(e) = self.backends.store.save(&record).await {
            // The issued rank is abandoned; the resulting gap is permanent
            tracing::error!(
                room_id,
                member_id,
                rank,
                error = %e,
                "Persistence failed after rank issuance"
            );
            return Err(e);
        }

        self.backends
            .queue
            .push(room_id, &serde_json::to_string(&record)?)
            .await?;

        self.publish_lower_ranked(room_id, rank).await;

        Ok(record)
    }

    /// Optimistic early notice: currently-queued entries below the new rank
    ///
    /// Best-effort only; the drain cycle's authoritative batch supersedes it.
    async fn publish_lower_ranked(&self, room_id: RoomId, rank: i64) {
        let result: Result<()> = async {
            let entries = self.backends.queue.entries(room_id).await?;
            let mut lower: Vec<ParticipationRecord> = entries
                .iter()
                .filter_map(|entry| serde_json::from_str(entry).ok())
                .filter(|r: &ParticipationRecord| r.rank < rank)
                .collect();
            lower.sort_by_key(|r| r.rank);

            self.backends.broadcaster.publish(room_id, &lower).await?;
            metrics::record_broadcast("optimistic", lower.len());
            Ok(())
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(room_id, error = %e, "Optimistic broadcast failed");
        }
    }

    /// All participations for a room, ordered by rank ascending
    pub async fn list_participations(
        &self,
        room_id: RoomId,
    ) -> Result<Vec<ParticipationRecord>> {
        self.backends.store.list_by_room(room_id).await
    }

    /// Delete the room's rank counter (admin/test support)
    pub async fn reset_rank(&self, room_id: RoomId) -> Result<()> {
        self.backends.ranks.reset(room_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{FixedClock, MemoryMemberDirectory, MemoryRoomDirectory};
    use crate::models::{EventRoom, Member};
    use chrono::{TimeZone, Utc};

    fn lock_config() -> LockConfig {
        LockConfig {
            wait_timeout_ms: 1000,
            lease_timeout_ms: 5000,
        }
    }

    fn harness(winner_num: i64) -> (ParticipationService, Arc<ChannelBroadcaster>) {
        let (backends, broadcaster) = Backends::in_memory();
        let rooms = Arc::new(MemoryRoomDirectory::new());
        let members = Arc::new(MemoryMemberDirectory::new());

        let start = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        rooms.insert(EventRoom {
            id: 1,
            title: "event".to_string(),
            start_time: start,
            end_time: start + chrono::Duration::hours(1),
            winner_num,
            unlock_count: 0,
        });
        for member_id in 1..=5 {
            members.insert(Member {
                id: member_id,
                creator_name: format!("member-{member_id}"),
            });
        }

        let clock = Arc::new(FixedClock::new(start));
        let service =
            ParticipationService::with_clock(backends, rooms, members, lock_config(), clock);
        (service, broadcaster)
    }

    #[tokio::test]
    async fn test_join_issues_dense_ranks() {
        let (service, _broadcaster) = harness(2);

        let a = service.join(1, 1).await.unwrap();
        let b = service.join(1, 2).await.unwrap();
        let c = service.join(1, 3).await.unwrap();

        assert_eq!((a.rank, b.rank, c.rank), (1, 2, 3));
        assert!(a.is_winner);
        assert!(b.is_winner);
        assert!(!c.is_winner);
    }

    #[tokio::test]
    async fn test_join_publishes_lower_ranked_entries() {
        let (service, broadcaster) = harness(2);
        let mut rx = broadcaster.subscribe();

        service.join(1, 1).await.unwrap();
        service.join(1, 2).await.unwrap();

        // First joiner sees nobody below rank 1
        let first = rx.recv().await.unwrap();
        assert!(first.batch.is_empty());

        // Second joiner sees rank 1 queued below it
        let second = rx.recv().await.unwrap();
        assert_eq!(second.batch.len(), 1);
        assert_eq!(second.batch[0].rank, 1);
    }

    #[tokio::test]
    async fn test_unknown_member_rejected_before_rank_issuance() {
        let (service, _broadcaster) = harness(1);

        let err = service.join(1, 999).await.unwrap_err();
        assert!(matches!(err, Error::MemberNotFound(999)));

        // The rejection consumed no rank
        let record = service.join(1, 1).await.unwrap();
        assert_eq!(record.rank, 1);
    }

    #[tokio::test]
    async fn test_unknown_room_rejected() {
        let (service, _broadcaster) = harness(1);
        let err = service.join(77, 1).await.unwrap_err();
        assert!(matches!(err, Error::RoomNotFound(77)));
    }
}
