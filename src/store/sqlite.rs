//! SQLite-backed participation store

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{MemberId, ParticipationRecord, RoomId};

use super::ParticipationStore;

/// Durable store on a local SQLite database
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection. The
/// `UNIQUE(room_id, member_id)` constraint backstops the duplicate check the
/// service performs under the room lock.
pub struct SqliteParticipationStore {
    conn: Mutex<Connection>,
}

impl SqliteParticipationStore {
    /// Open (or create) the database at the given path
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory database, used by the test suite
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS participations (
                room_id     INTEGER NOT NULL,
                member_id   INTEGER NOT NULL,
                joined_at   TEXT    NOT NULL,
                ranking     INTEGER NOT NULL,
                is_winner   INTEGER NOT NULL,
                winner_name TEXT    NOT NULL,
                PRIMARY KEY (room_id, member_id)
            );
            CREATE INDEX IF NOT EXISTS idx_participations_room_ranking
                ON participations (room_id, ranking);",
        )?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ParticipationRecord> {
        let joined_at: String = row.get("joined_at")?;
        let joined_at = DateTime::parse_from_rfc3339(&joined_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;

        Ok(ParticipationRecord {
            room_id: row.get("room_id")?,
            member_id: row.get("member_id")?,
            joined_at,
            rank: row.get("ranking")?,
            is_winner: row.get("is_winner")?,
            winner_name: row.get("winner_name")?,
        })
    }
}

#[async_trait]
impl ParticipationStore for SqliteParticipationStore {
    async fn exists(&self, room_id: RoomId, member_id: MemberId) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM participations WHERE room_id = ?1 AND member_id = ?2)",
            params![room_id, member_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    async fn save(&self, record: &ParticipationRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO participations
                (room_id, member_id, joined_at, ranking, is_winner, winner_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.room_id,
                record.member_id,
                record.joined_at.to_rfc3339(),
                record.rank,
                record.is_winner,
                record.winner_name,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) => {
                Err(Error::AlreadyParticipated {
                    room_id: record.room_id,
                    member_id: record.member_id,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_by_room(&self, room_id: RoomId) -> Result<Vec<ParticipationRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT room_id, member_id, joined_at, ranking, is_winner, winner_name
             FROM participations
             WHERE room_id = ?1
             ORDER BY ranking ASC",
        )?;

        let records = stmt
            .query_map(params![room_id], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    async fn count_by_room(&self, room_id: RoomId) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM participations WHERE room_id = ?1",
            params![room_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(room_id: RoomId, member_id: MemberId, rank: i64) -> ParticipationRecord {
        ParticipationRecord {
            room_id,
            member_id,
            joined_at: Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
            rank,
            is_winner: rank <= 2,
            winner_name: format!("member-{member_id}"),
        }
    }

    #[tokio::test]
    async fn test_roundtrip_preserves_fields() {
        let store = SqliteParticipationStore::in_memory().unwrap();

        let original = record(1, 10, 1);
        store.save(&original).await.unwrap();

        let listed = store.list_by_room(1).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], original);
    }

    #[tokio::test]
    async fn test_list_ordered_by_rank() {
        let store = SqliteParticipationStore::in_memory().unwrap();

        store.save(&record(1, 30, 3)).await.unwrap();
        store.save(&record(1, 10, 1)).await.unwrap();
        store.save(&record(1, 20, 2)).await.unwrap();

        let ranks: Vec<i64> = store
            .list_by_room(1)
            .await
            .unwrap()
            .iter()
            .map(|r| r.rank)
            .collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_duplicate_pair_maps_to_already_participated() {
        let store = SqliteParticipationStore::in_memory().unwrap();

        store.save(&record(1, 10, 1)).await.unwrap();
        let err = store.save(&record(1, 10, 2)).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyParticipated { .. }));
    }

    #[tokio::test]
    async fn test_exists_and_count() {
        let store = SqliteParticipationStore::in_memory().unwrap();

        assert!(!store.exists(1, 10).await.unwrap());
        store.save(&record(1, 10, 1)).await.unwrap();
        store.save(&record(2, 10, 1)).await.unwrap();

        assert!(store.exists(1, 10).await.unwrap());
        assert_eq!(store.count_by_room(1).await.unwrap(), 1);
        assert_eq!(store.count_by_room(2).await.unwrap(), 1);
        assert_eq!(store.count_by_room(3).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("participations.db");

        {
            let store = SqliteParticipationStore::new(&path).unwrap();
            store.save(&record(1, 10, 1)).await.unwrap();
        }

        let store = SqliteParticipationStore::new(&path).unwrap();
        assert_eq!(store.count_by_room(1).await.unwrap(), 1);
    }
}
