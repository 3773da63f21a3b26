//! Collaborator lookup contracts
//!
//! Event-room and member CRUD live in external services; this core consumes
//! them through narrow read-only lookup traits. The in-memory implementations
//! back dry-run deployments and the test suite. The [`Clock`] trait makes the
//! current time source injectable so timing validation is testable.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{EventRoom, Member, MemberId, RoomId};

/// Read-only lookup of event rooms by id
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    async fn find(&self, room_id: RoomId) -> Result<Option<EventRoom>>;
}

/// Read-only lookup of members by id
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn find(&self, member_id: MemberId) -> Result<Option<Member>>;
}

/// Injectable time source
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time source used in production
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable time source for tests and simulations
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// In-memory room directory
#[derive(Debug, Default)]
pub struct MemoryRoomDirectory {
    rooms: Mutex<HashMap<RoomId, EventRoom>>,
}

impl MemoryRoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, room: EventRoom) {
        self.rooms.lock().unwrap().insert(room.id, room);
    }
}

#[async_trait]
impl RoomDirectory for MemoryRoomDirectory {
    async fn find(&self, room_id: RoomId) -> Result<Option<EventRoom>> {
        Ok(self.rooms.lock().unwrap().get(&room_id).cloned())
    }
}

/// In-memory member directory
#[derive(Debug, Default)]
pub struct MemoryMemberDirectory {
    members: Mutex<HashMap<MemberId, Member>>,
}

impl MemoryMemberDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, member: Member) {
        self.members.lock().unwrap().insert(member.id, member);
    }
}

#[async_trait]
impl MemberDirectory for MemoryMemberDirectory {
    async fn find(&self, member_id: MemberId) -> Result<Option<Member>> {
        Ok(self.members.lock().unwrap().get(&member_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_memory_directories() {
        let rooms = MemoryRoomDirectory::new();
        let members = MemoryMemberDirectory::new();

        assert!(rooms.find(1).await.unwrap().is_none());
        assert!(members.find(1).await.unwrap().is_none());

        rooms.insert(EventRoom {
            id: 1,
            title: "room".to_string(),
            start_time: Utc::now(),
            end_time: Utc::now(),
            winner_num: 1,
            unlock_count: 0,
        });
        members.insert(Member {
            id: 7,
            creator_name: "creator".to_string(),
        });

        assert_eq!(rooms.find(1).await.unwrap().unwrap().id, 1);
        assert_eq!(
            members.find(7).await.unwrap().unwrap().creator_name,
            "creator"
        );
    }

    #[test]
    fn test_fixed_clock() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();

        let clock = FixedClock::new(t0);
        assert_eq!(clock.now(), t0);

        clock.set(t1);
        assert_eq!(clock.now(), t1);
    }
}
