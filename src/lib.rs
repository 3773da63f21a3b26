//! seonchak - First-come event participation service
//!
//! Assigns a globally unique, strictly increasing rank to every participant
//! joining a time-boxed event room under heavy concurrent write pressure, and
//! propagates newly-assigned ranks to room spectators in near-real time.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`lock`] - Per-room distributed mutual exclusion with bounded wait/lease
//! - [`ranking`] - Atomic, monotonically increasing rank issuance per room
//! - [`store`] - Durable persistence of participation records
//! - [`queue`] - Transient per-room relay of pending join notifications
//! - [`drain`] - Fixed-interval drain-and-broadcast loop
//! - [`broadcast`] - Publish-only fan-out to room subscribers
//! - [`service`] - The join critical section tying the components together
//! - [`directory`] - Collaborator lookup contracts (rooms, members, clock)
//! - [`server`] - HTTP surface (axum)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use seonchak::config::Config;
//! use seonchak::directory::{MemoryMemberDirectory, MemoryRoomDirectory};
//! use seonchak::service::{Backends, ParticipationService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let backends = Backends::redis(&config).await?;
//!     let service = ParticipationService::new(
//!         backends,
//!         Arc::new(MemoryRoomDirectory::new()),
//!         Arc::new(MemoryMemberDirectory::new()),
//!         config.lock.clone(),
//!     );
//!     let record = service.join(1, 42).await?;
//!     println!("rank {}", record.rank);
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod directory;
pub mod drain;
pub mod error;
pub mod lock;
pub mod metrics;
pub mod models;
pub mod queue;
pub mod ranking;
pub mod server;
pub mod service;
pub mod store;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::broadcast::{BroadcastMessage, Broadcaster, ChannelBroadcaster};
    pub use crate::config::Config;
    pub use crate::drain::{DrainScheduler, DrainStats};
    pub use crate::error::{Error, Result};
    pub use crate::models::{EventRoom, Member, MemberId, ParticipationRecord, RoomId};
    pub use crate::service::{Backends, ParticipationService};
}

// Direct re-exports for convenience
pub use models::{EventRoom, Member, ParticipationRecord};
