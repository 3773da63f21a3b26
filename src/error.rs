//! Unified error handling for the seonchak crate
//!
//! Join-path rejections (`LockTimeout`, `RoomNotFound`, `MemberNotFound`,
//! `EventNotStarted`, `AlreadyParticipated`) are detected before any state
//! mutation and propagate directly to the caller. Backend errors wrap the
//! underlying Redis, pool, SQLite, or serialization failure. A
//! `MalformedQueueEntry` is never terminal: the drain cycle logs it and
//! continues with the remaining entries.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{MemberId, RoomId};

/// Unified error type for the seonchak crate
#[derive(Error, Debug)]
pub enum Error {
    /// Room lock not acquired within the wait timeout; no rank was consumed
    #[error("could not acquire participation lock for room {room_id} within {waited_ms} ms")]
    LockTimeout { room_id: RoomId, waited_ms: u64 },

    /// Room does not exist
    #[error("event room {0} not found")]
    RoomNotFound(RoomId),

    /// Member does not exist
    #[error("member {0} not found")]
    MemberNotFound(MemberId),

    /// Join attempted before the room's start time
    #[error("event room {room_id} has not started (starts at {starts_at})")]
    EventNotStarted {
        room_id: RoomId,
        starts_at: DateTime<Utc>,
    },

    /// The member already holds a rank in this room
    #[error("member {member_id} already participated in room {room_id}")]
    AlreadyParticipated {
        room_id: RoomId,
        member_id: MemberId,
    },

    /// A relay queue entry failed to deserialize; skipped during drain
    #[error("malformed relay queue entry: {reason}")]
    MalformedQueueEntry { reason: String },

    /// Redis command errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Redis connection pool errors
    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    /// SQLite errors
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this is a validation rejection rather than a backend failure
    ///
    /// Rejections are detected before any state mutation and leave the
    /// counter, store, and queue untouched.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. }
                | Self::RoomNotFound(_)
                | Self::MemberNotFound(_)
                | Self::EventNotStarted { .. }
                | Self::AlreadyParticipated { .. }
        )
    }

    /// Whether the operation may succeed if retried by the caller
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::LockTimeout { .. } => true,
            Self::Redis(_) | Self::Pool(_) | Self::Io(_) => true,
            _ => false,
        }
    }

    /// Stable label for the rejection reason, used in logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Self::LockTimeout { .. } => "lock_timeout",
            Self::RoomNotFound(_) => "room_not_found",
            Self::MemberNotFound(_) => "member_not_found",
            Self::EventNotStarted { .. } => "event_not_started",
            Self::AlreadyParticipated { .. } => "already_participated",
            Self::MalformedQueueEntry { .. } => "malformed_entry",
            Self::Redis(_) | Self::Pool(_) => "redis",
            Self::Database(_) => "database",
            Self::Json(_) => "json",
            Self::Io(_) => "io",
            Self::Config(_) => "config",
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
