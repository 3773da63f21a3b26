//! Per-room distributed mutual exclusion
//!
//! A join request must hold its room's lock for the whole critical section:
//! validation, rank issuance, persistence, and the queue push. Ownership is
//! lease-based so a crashed holder cannot deadlock the room: the lock
//! auto-expires after `lease_timeout` and the next waiter gets in.
//!
//! Two implementations are provided behind [`LockCoordinator`]:
//!
//! - [`RedisLockCoordinator`]: `SET key token NX PX lease` with a bounded
//!   retry loop, released by a compare-owner-then-delete script. Correct
//!   across all processes sharing the Redis backend.
//! - [`LocalLockCoordinator`]: an in-process lease table for single-process
//!   deployments and tests.
//!
//! Releasing an unheld or foreign lock is a no-op, never a panic.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::RoomId;

/// Redis key prefix for room locks
pub const LOCK_KEY_PREFIX: &str = "participation-lock:";

/// Delay between acquisition attempts while waiting for a held lock
const RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

/// Proof of lock ownership
///
/// The token ties a release to the acquisition that produced it; a holder
/// whose lease already expired cannot release a successor's lock.
#[derive(Debug, Clone)]
pub struct RoomLock {
    pub room_id: RoomId,
    pub token: String,
}

/// Cross-process mutual exclusion keyed by room
#[async_trait]
pub trait LockCoordinator: Send + Sync {
    /// Block up to `wait_timeout` attempting to obtain exclusive ownership
    /// of the room. Held ownership auto-expires after `lease_timeout`.
    async fn acquire(
        &self,
        room_id: RoomId,
        wait_timeout: Duration,
        lease_timeout: Duration,
    ) -> Result<RoomLock>;

    /// Release a held lock. No-op if the lease already expired or the lock
    /// is owned by someone else.
    async fn release(&self, lock: RoomLock) -> Result<()>;
}

fn lock_key(room_id: RoomId) -> String {
    format!("{LOCK_KEY_PREFIX}{room_id}")
}

fn retry_delay() -> Duration {
    // Small jitter so waiters do not hammer the backend in lockstep
    RETRY_BASE_DELAY + Duration::from_millis(rand::thread_rng().gen_range(0..25))
}

// ============================================================================
// Redis Implementation
// ============================================================================

/// Compare-owner-then-delete, atomic on the Redis side
const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Lease-based lock on a shared Redis backend
pub struct RedisLockCoordinator {
    pool: Pool,
    release_script: redis::Script,
}

impl RedisLockCoordinator {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            release_script: redis::Script::new(RELEASE_SCRIPT),
        }
    }

    async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        lease_timeout: Duration,
    ) -> Result<bool> {
        let mut conn = self.pool.get().await?;

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(lease_timeout.as_millis() as u64)
            .query_async(&mut *conn)
            .await?;

        Ok(reply.is_some())
    }
}

#[async_trait]
impl LockCoordinator for RedisLockCoordinator {
    async fn acquire(
        &self,
        room_id: RoomId,
        wait_timeout: Duration,
        lease_timeout: Duration,
    ) -> Result<RoomLock> {
        let key = lock_key(room_id);
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + wait_timeout;

        loop {
            if self.try_acquire(&key, &token, lease_timeout).await? {
                tracing::debug!(room_id, token = %token, "Acquired room lock");
                return Ok(RoomLock { room_id, token });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::LockTimeout {
                    room_id,
                    waited_ms: wait_timeout.as_millis() as u64,
                });
            }

            tokio::time::sleep(retry_delay().min(remaining)).await;
        }
    }

    async fn release(&self, lock: RoomLock) -> Result<()> {
        let mut conn = self.pool.get().await?;

        let deleted: i64 = self
            .release_script
            .key(lock_key(lock.room_id))
            .arg(&lock.token)
            .invoke_async(&mut *conn)
            .await?;

        if deleted == 0 {
            // Lease expired or a later holder owns the key now
            tracing::warn!(
                room_id = lock.room_id,
                token = %lock.token,
                "Released lock was no longer held"
            );
        } else {
            tracing::debug!(room_id = lock.room_id, "Released room lock");
        }

        Ok(())
    }
}

// ============================================================================
// Local Implementation
// ============================================================================

#[derive(Debug)]
struct LocalLease {
    token: String,
    expires_at: Instant,
}

/// In-process lease table for single-process deployments and tests
#[derive(Debug, Default)]
pub struct LocalLockCoordinator {
    leases: Mutex<HashMap<RoomId, LocalLease>>,
}

impl LocalLockCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    async fn try_acquire(
        &self,
        room_id: RoomId,
        token: &str,
        lease_timeout: Duration,
    ) -> bool {
        let mut leases = self.leases.lock().await;
        let now = Instant::now();

        match leases.get(&room_id) {
            Some(lease) if lease.expires_at > now => false,
            _ => {
                leases.insert(
                    room_id,
                    LocalLease {
                        token: token.to_string(),
                        expires_at: now + lease_timeout,
                    },
                );
                true
            }
        }
    }
}

#[async_trait]
impl LockCoordinator for LocalLockCoordinator {
    async fn acquire(
        &self,
        room_id: RoomId,
        wait_timeout: Duration,
        lease_timeout: Duration,
    ) -> Result<RoomLock> {
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + wait_timeout;

        loop {
            if self.try_acquire(room_id, &token, lease_timeout).await {
                return Ok(RoomLock { room_id, token });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::LockTimeout {
                    room_id,
                    waited_ms: wait_timeout.as_millis() as u64,
                });
            }

            tokio::time::sleep(retry_delay().min(remaining)).await;
        }
    }

    async fn release(&self, lock: RoomLock) -> Result<()> {
        let mut leases = self.leases.lock().await;

        match leases.get(&lock.room_id) {
            Some(lease) if lease.token == lock.token => {
                leases.remove(&lock.room_id);
            }
            _ => {
                tracing::debug!(
                    room_id = lock.room_id,
                    "Release of unheld or foreign lock ignored"
                );
            }
        }

        Ok(())
    }
}
