//! Durable persistence of participation records
//!
//! The store is written only under the room lock, after rank issuance. If a
//! save fails after a rank was issued, the rank is abandoned and a permanent
//! gap remains; rank density is not an invariant the system repairs.
//!
//! [`SqliteParticipationStore`] is the durable implementation;
//! [`MemoryParticipationStore`] backs dry-run deployments and tests.

mod sqlite;

pub use sqlite::SqliteParticipationStore;

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{MemberId, ParticipationRecord, RoomId};

/// Persistence contract for participation records
#[async_trait]
pub trait ParticipationStore: Send + Sync {
    /// Whether the member already holds a rank in the room
    async fn exists(&self, room_id: RoomId, member_id: MemberId) -> Result<bool>;

    /// Persist a new record. Fails with [`Error::AlreadyParticipated`] if the
    /// `(room_id, member_id)` pair is already present.
    async fn save(&self, record: &ParticipationRecord) -> Result<()>;

    /// All records for the room, ordered by rank ascending
    async fn list_by_room(&self, room_id: RoomId) -> Result<Vec<ParticipationRecord>>;

    /// Number of records persisted for the room
    async fn count_by_room(&self, room_id: RoomId) -> Result<u64>;
}

/// HashMap-backed store for dry-run deployments and tests
#[derive(Debug, Default)]
pub struct MemoryParticipationStore {
    records: Mutex<HashMap<RoomId, Vec<ParticipationRecord>>>,
}

impl MemoryParticipationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ParticipationStore for MemoryParticipationStore {
    async fn exists(&self, room_id: RoomId, member_id: MemberId) -> Result<bool> {
        let records = self.records.lock().unwrap();
        Ok(records
            .get(&room_id)
            .is_some_and(|room| room.iter().any(|r| r.member_id == member_id)))
    }

    async fn save(&self, record: &ParticipationRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        let room = records.entry(record.room_id).or_default();

        if room.iter().any(|r| r.member_id == record.member_id) {
            return Err(Error::AlreadyParticipated {
                room_id: record.room_id,
                member_id: record.member_id,
            });
        }

        room.push(record.clone());
        Ok(())
    }

    async fn list_by_room(&self, room_id: RoomId) -> Result<Vec<ParticipationRecord>> {
        let records = self.records.lock().unwrap();
        let mut room = records.get(&room_id).cloned().unwrap_or_default();
        room.sort_by_key(|r| r.rank);
        Ok(room)
    }

    async fn count_by_room(&self, room_id: RoomId) -> Result<u64> {
        let records = self.records.lock().unwrap();
        Ok(records.get(&room_id).map_or(0, |room| room.len() as u64))
    }
}
