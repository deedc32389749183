//! Session repository.
//!
//! A session row covers one topic segment. The open session for a room is
//! the one with `end_time IS NULL`; the coordinator guarantees at most one.

use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use crate::errors::{Result, StoreError};
use crate::rows::SessionRow;

/// Session repository — stateless, every method takes `&Connection`.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a new open session for a room.
    pub fn create(
        conn: &Connection,
        room_id: &str,
        user_a_id: &str,
        user_b_id: &str,
        topic: &str,
    ) -> Result<SessionRow> {
        let id = format!("sess_{}", Uuid::now_v7());
        let now = chrono::Utc::now().to_rfc3339();

        let _ = conn.execute(
            "INSERT INTO sessions (id, room_id, user_a_id, user_b_id, topic, start_time, end_time, extension_used)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, 0)",
            params![id, room_id, user_a_id, user_b_id, topic, now],
        )?;

        Ok(SessionRow {
            id,
            room_id: room_id.to_owned(),
            user_a_id: user_a_id.to_owned(),
            user_b_id: user_b_id.to_owned(),
            topic: topic.to_owned(),
            start_time: now,
            end_time: None,
            extension_used: false,
        })
    }

    /// The open session for a room, if any.
    pub fn active_for_room(conn: &Connection, room_id: &str) -> Result<Option<SessionRow>> {
        let row = conn
            .query_row(
                "SELECT id, room_id, user_a_id, user_b_id, topic, start_time, end_time, extension_used
                 FROM sessions
                 WHERE room_id = ?1 AND end_time IS NULL
                 ORDER BY start_time DESC
                 LIMIT 1",
                params![room_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Look up a session by ID.
    pub fn get(conn: &Connection, id: &str) -> Result<Option<SessionRow>> {
        let row = conn
            .query_row(
                "SELECT id, room_id, user_a_id, user_b_id, topic, start_time, end_time, extension_used
                 FROM sessions WHERE id = ?1",
                params![id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Record the one allowed extension: set the flag and restart the clock.
    ///
    /// Returns the new start time.
    pub fn mark_extended(conn: &Connection, id: &str) -> Result<String> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE sessions SET extension_used = 1, start_time = ?2
             WHERE id = ?1 AND end_time IS NULL",
            params![id, now],
        )?;
        if changed == 0 {
            return Err(StoreError::SessionNotFound(id.to_owned()));
        }
        Ok(now)
    }

    /// Close a session by stamping its end time. Idempotent on re-close.
    pub fn close(conn: &Connection, id: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE sessions SET end_time = ?2 WHERE id = ?1 AND end_time IS NULL",
            params![id, now],
        )?;
        if changed == 0 {
            // Already closed is fine; a missing row is not.
            let exists = Self::get(conn, id)?.is_some();
            if !exists {
                return Err(StoreError::SessionNotFound(id.to_owned()));
            }
        }
        Ok(())
    }

    /// Number of open sessions across all rooms.
    pub fn count_open(conn: &Connection) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE end_time IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<SessionRow> {
        Ok(SessionRow {
            id: row.get(0)?,
            room_id: row.get(1)?,
            user_a_id: row.get(2)?,
            user_b_id: row.get(3)?,
            topic: row.get(4)?,
            start_time: row.get(5)?,
            end_time: row.get(6)?,
            extension_used: row.get::<_, i64>(7)? != 0,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
