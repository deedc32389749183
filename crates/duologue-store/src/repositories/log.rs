//! Chat log repository.
//!
//! Logs are append-only; history reads span every session a room has had,
//! ordered by timestamp with the rowid as tiebreaker.

use rusqlite::{Connection, Row, params};

use crate::errors::Result;
use crate::rows::LogRow;

/// Log repository — stateless, every method takes `&Connection`.
pub struct LogRepo;

impl LogRepo {
    /// Append one chat line.
    pub fn append(
        conn: &Connection,
        room_id: &str,
        session_id: Option<&str>,
        role: &str,
        speaker: &str,
        content: &str,
    ) -> Result<LogRow> {
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO logs (room_id, session_id, role, speaker, content, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![room_id, session_id, role, speaker, content, now],
        )?;
        let id = conn.last_insert_rowid();

        Ok(LogRow {
            id,
            room_id: room_id.to_owned(),
            session_id: session_id.map(str::to_owned),
            role: role.to_owned(),
            speaker: speaker.to_owned(),
            content: content.to_owned(),
            timestamp: now,
        })
    }

    /// Full history for a room, oldest first.
    pub fn history_for_room(conn: &Connection, room_id: &str) -> Result<Vec<LogRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, room_id, session_id, role, speaker, content, timestamp
             FROM logs
             WHERE room_id = ?1
             ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![room_id], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<LogRow> {
        Ok(LogRow {
            id: row.get(0)?,
            room_id: row.get(1)?,
            session_id: row.get(2)?,
            role: row.get(3)?,
            speaker: row.get(4)?,
            content: row.get(5)?,
            timestamp: row.get(6)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::new_in_memory;
    use crate::migrations::run_migrations;
    use crate::repositories::room::RoomRepo;
    use crate::repositories::session::SessionRepo;

    fn setup_room() -> (crate::connection::ConnectionPool, String) {
        let pool = new_in_memory().unwrap();
        let room_id = {
            let conn = pool.get().unwrap();
            let _ = run_migrations(&conn).unwrap();
            RoomRepo::create(&conn, "r", 1).unwrap().id
        };
        (pool, room_id)
    }

    #[test]
    fn append_and_read_back_in_order() {
        let (pool, room) = setup_room();
        let conn = pool.get().unwrap();
        let _ = LogRepo::append(&conn, &room, None, "user", "UNKNOWN", "first").unwrap();
        let _ = LogRepo::append(&conn, &room, None, "user", "UNKNOWN", "second").unwrap();
        let _ = LogRepo::append(&conn, &room, None, "assistant", "AI", "third").unwrap();

        let history = LogRepo::history_for_room(&conn, &room).unwrap();
        let contents: Vec<&str> = history.iter().map(|l| l.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn history_spans_sessions() {
        let (pool, room) = setup_room();
        let conn = pool.get().unwrap();
        let s1 = SessionRepo::create(&conn, &room, "10", "20", "topic_1_situation").unwrap();
        let _ = LogRepo::append(&conn, &room, Some(&s1.id), "user", "A", "in s1").unwrap();
        SessionRepo::close(&conn, &s1.id).unwrap();
        let s2 = SessionRepo::create(&conn, &room, "10", "20", "topic_2_emotion").unwrap();
        let _ = LogRepo::append(&conn, &room, Some(&s2.id), "user", "B", "in s2").unwrap();

        let history = LogRepo::history_for_room(&conn, &room).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].session_id.as_deref(), Some(s1.id.as_str()));
        assert_eq!(history[1].session_id.as_deref(), Some(s2.id.as_str()));
    }

    #[test]
    fn history_is_scoped_to_room() {
        let (pool, room_a) = setup_room();
        let conn = pool.get().unwrap();
        let room_b = RoomRepo::create(&conn, "other", 2).unwrap().id;
        let _ = LogRepo::append(&conn, &room_a, None, "user", "UNKNOWN", "a").unwrap();
        let _ = LogRepo::append(&conn, &room_b, None, "user", "UNKNOWN", "b").unwrap();

        let history = LogRepo::history_for_room(&conn, &room_a).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "a");
    }
}
