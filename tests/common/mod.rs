//! Common test utilities
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use seonchak::broadcast::ChannelBroadcaster;
use seonchak::config::LockConfig;
use seonchak::directory::{FixedClock, MemoryMemberDirectory, MemoryRoomDirectory};
use seonchak::models::{EventRoom, Member, MemberId, RoomId};
use seonchak::service::{Backends, ParticipationService};

pub const ROOM_ID: RoomId = 1;

/// Start time of the seeded test room
pub fn event_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

/// Fully wired in-memory service with a seeded room and members
pub struct Harness {
    pub service: Arc<ParticipationService>,
    pub backends: Backends,
    pub broadcaster: Arc<ChannelBroadcaster>,
    pub clock: Arc<FixedClock>,
    pub rooms: Arc<MemoryRoomDirectory>,
    pub members: Arc<MemoryMemberDirectory>,
}

pub fn harness(winner_num: i64, member_count: MemberId) -> Harness {
    harness_with_lock(
        winner_num,
        member_count,
        LockConfig {
            wait_timeout_ms: 2000,
            lease_timeout_ms: 10000,
        },
    )
}

pub fn harness_with_lock(
    winner_num: i64,
    member_count: MemberId,
    lock_config: LockConfig,
) -> Harness {
    let (backends, broadcaster) = Backends::in_memory();
    let rooms = Arc::new(MemoryRoomDirectory::new());
    let members = Arc::new(MemoryMemberDirectory::new());
    let clock = Arc::new(FixedClock::new(event_start()));

    rooms.insert(test_room(ROOM_ID, winner_num));
    for member_id in 1..=member_count {
        members.insert(test_member(member_id));
    }

    let service = Arc::new(ParticipationService::with_clock(
        backends.clone(),
        rooms.clone(),
        members.clone(),
        lock_config,
        clock.clone(),
    ));

    Harness {
        service,
        backends,
        broadcaster,
        clock,
        rooms,
        members,
    }
}

pub fn test_room(room_id: RoomId, winner_num: i64) -> EventRoom {
    EventRoom {
        id: room_id,
        title: format!("test room {room_id}"),
        start_time: event_start(),
        end_time: event_start() + chrono::Duration::hours(1),
        winner_num,
        unlock_count: 0,
    }
}

pub fn test_member(member_id: MemberId) -> Member {
    Member {
        id: member_id,
        creator_name: format!("member-{member_id}"),
    }
}
