// Core data structures for the seonchak participation service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Room identifier, unique across the deployment
pub type RoomId = i64;

/// Member identifier, unique across the deployment
pub type MemberId = i64;

/// A time-boxed event room
///
/// Rooms are created and mutated by the room-management service; this core
/// only reads them through [`crate::directory::RoomDirectory`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRoom {
    pub id: RoomId,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Number of ranks eligible to win (ranks 1..=winner_num)
    pub winner_num: i64,
    /// Monotonic unlock counter, mutated outside this core
    pub unlock_count: i64,
}

impl EventRoom {
    /// Whether the event has started at the given instant
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_time
    }
}

/// A member able to join event rooms
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    /// Display name used as `winnerName` in broadcast payloads
    pub creator_name: String,
}

/// An issued participation, immutable once created
///
/// This is both the persisted record and the wire snapshot pushed onto the
/// relay queue and broadcast to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipationRecord {
    pub room_id: RoomId,
    pub member_id: MemberId,
    pub joined_at: DateTime<Utc>,
    /// 1-based, dense within a room, assigned in join order
    pub rank: i64,
    /// Fixed at assignment time as `rank <= winner_num`, never recomputed
    pub is_winner: bool,
    pub winner_name: String,
}

impl ParticipationRecord {
    /// Build a record for a freshly issued rank
    pub fn issued(
        room: &EventRoom,
        member: &Member,
        rank: i64,
        joined_at: DateTime<Utc>,
    ) -> Self {
        Self {
            room_id: room.id,
            member_id: member.id,
            joined_at,
            rank,
            is_winner: rank <= room.winner_num,
            winner_name: member.creator_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn room(winner_num: i64) -> EventRoom {
        EventRoom {
            id: 1,
            title: "launch event".to_string(),
            start_time: Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 1, 1, 13, 0, 0).unwrap(),
            winner_num,
            unlock_count: 0,
        }
    }

    fn member() -> Member {
        Member {
            id: 42,
            creator_name: "tester".to_string(),
        }
    }

    #[test]
    fn test_has_started() {
        let room = room(3);
        let before = Utc.with_ymd_and_hms(2025, 1, 1, 11, 59, 59).unwrap();
        assert!(!room.has_started(before));
        assert!(room.has_started(room.start_time));
    }

    #[test]
    fn test_is_winner_boundaries() {
        let room = room(2);
        let m = member();
        let now = room.start_time;

        assert!(ParticipationRecord::issued(&room, &m, 1, now).is_winner);
        assert!(ParticipationRecord::issued(&room, &m, 2, now).is_winner);
        assert!(!ParticipationRecord::issued(&room, &m, 3, now).is_winner);
    }

    #[test]
    fn test_record_wire_format() {
        let room = room(1);
        let m = member();
        let record = ParticipationRecord::issued(&room, &m, 1, room.start_time);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["roomId"], 1);
        assert_eq!(json["memberId"], 42);
        assert_eq!(json["rank"], 1);
        assert_eq!(json["isWinner"], true);
        assert_eq!(json["winnerName"], "tester");
        assert!(json["joinedAt"].is_string());
    }
}
