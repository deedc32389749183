//! Room repository.
//!
//! A couple has at most one active room; creation reuses the newest active
//! room for the couple when one exists.

use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use crate::errors::{Result, StoreError};
use crate::rows::RoomRow;

/// Room repository — stateless, every method takes `&Connection`.
pub struct RoomRepo;

impl RoomRepo {
    /// Insert a new active room for a couple.
    pub fn create(conn: &Connection, name: &str, couple_id: i64) -> Result<RoomRow> {
        let id = format!("room_{}", Uuid::now_v7());
        let now = chrono::Utc::now().to_rfc3339();

        let _ = conn.execute(
            "INSERT INTO rooms (id, name, couple_id, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?4)",
            params![id, name, couple_id, now],
        )?;

        Ok(RoomRow {
            id,
            name: name.to_owned(),
            couple_id,
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// The newest active room for a couple, if any.
    pub fn find_active_by_couple(conn: &Connection, couple_id: i64) -> Result<Option<RoomRow>> {
        let row = conn
            .query_row(
                "SELECT id, name, couple_id, is_active, created_at, updated_at
                 FROM rooms
                 WHERE couple_id = ?1 AND is_active = 1
                 ORDER BY created_at DESC
                 LIMIT 1",
                params![couple_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Look up a room by ID.
    pub fn get(conn: &Connection, id: &str) -> Result<Option<RoomRow>> {
        let row = conn
            .query_row(
                "SELECT id, name, couple_id, is_active, created_at, updated_at
                 FROM rooms WHERE id = ?1",
                params![id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Mark a room inactive.
    pub fn deactivate(conn: &Connection, id: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE rooms SET is_active = 0, updated_at = ?2 WHERE id = ?1",
            params![id, now],
        )?;
        if changed == 0 {
            return Err(StoreError::RoomNotFound(id.to_owned()));
        }
        Ok(())
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<RoomRow> {
        Ok(RoomRow {
            id: row.get(0)?,
            name: row.get(1)?,
            couple_id: row.get(2)?,
            is_active: row.get::<_, i64>(3)? != 0,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
