//! The [`ChatStore`] facade the orchestration core talks to.
//!
//! Owns the connection pool and exposes typed operations over the stateless
//! repositories. Callers never see `rusqlite` types.

use duologue_core::{ParticipantId, Role, RoomId, SessionId, Speaker, Topic};

use crate::connection::{self, ConnectionConfig, ConnectionPool};
use crate::errors::Result;
use crate::migrations;
use crate::repositories::{LogRepo, RoomRepo, SessionRepo};
use crate::rows::{LogRow, RoomRow, SessionRow};

/// Persistence facade over rooms, sessions, and logs.
pub struct ChatStore {
    pool: ConnectionPool,
}

impl ChatStore {
    /// Open a file-backed store and run pending migrations.
    pub fn open(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let pool = connection::new_file(path, config)?;
        let conn = pool.get()?;
        let _ = migrations::run_migrations(&conn)?;
        drop(conn);
        Ok(Self { pool })
    }

    /// Open an in-memory store (for testing) and run pending migrations.
    pub fn in_memory() -> Result<Self> {
        let pool = connection::new_in_memory()?;
        let conn = pool.get()?;
        let _ = migrations::run_migrations(&conn)?;
        drop(conn);
        Ok(Self { pool })
    }

    // ─── Rooms ───────────────────────────────────────────────────────────────

    /// Create a room for a couple, reusing an existing active one.
    ///
    /// Returns the room and whether it already existed.
    pub fn create_room(&self, name: &str, couple_id: i64) -> Result<(RoomRow, bool)> {
        let conn = self.pool.get()?;
        if let Some(existing) = RoomRepo::find_active_by_couple(&conn, couple_id)? {
            return Ok((existing, true));
        }
        let room = RoomRepo::create(&conn, name, couple_id)?;
        Ok((room, false))
    }

    /// Look up a room by ID.
    pub fn get_room(&self, room_id: &RoomId) -> Result<Option<RoomRow>> {
        let conn = self.pool.get()?;
        RoomRepo::get(&conn, room_id.as_str())
    }

    /// Mark a room inactive.
    pub fn deactivate_room(&self, room_id: &RoomId) -> Result<()> {
        let conn = self.pool.get()?;
        RoomRepo::deactivate(&conn, room_id.as_str())
    }

    // ─── Sessions ────────────────────────────────────────────────────────────

    /// Open a new session for a room on the given topic.
    pub fn create_session(
        &self,
        room_id: &RoomId,
        user_a: &ParticipantId,
        user_b: &ParticipantId,
        topic: Topic,
    ) -> Result<SessionRow> {
        let conn = self.pool.get()?;
        SessionRepo::create(
            &conn,
            room_id.as_str(),
            user_a.as_str(),
            user_b.as_str(),
            topic.as_str(),
        )
    }

    /// The open session for a room, if any.
    pub fn active_session(&self, room_id: &RoomId) -> Result<Option<SessionRow>> {
        let conn = self.pool.get()?;
        SessionRepo::active_for_room(&conn, room_id.as_str())
    }

    /// Record the one allowed extension; returns the new start time.
    pub fn mark_extended(&self, session_id: &SessionId) -> Result<String> {
        let conn = self.pool.get()?;
        SessionRepo::mark_extended(&conn, session_id.as_str())
    }

    /// Close a session. Idempotent on re-close.
    pub fn close_session(&self, session_id: &SessionId) -> Result<()> {
        let conn = self.pool.get()?;
        SessionRepo::close(&conn, session_id.as_str())
    }

    /// Number of open sessions across all rooms.
    pub fn open_session_count(&self) -> Result<i64> {
        let conn = self.pool.get()?;
        SessionRepo::count_open(&conn)
    }

    // ─── Logs ────────────────────────────────────────────────────────────────

    /// Append one chat line.
    pub fn append_log(
        &self,
        room_id: &RoomId,
        session_id: Option<&SessionId>,
        role: Role,
        speaker: Speaker,
        content: &str,
    ) -> Result<LogRow> {
        let conn = self.pool.get()?;
        LogRepo::append(
            &conn,
            room_id.as_str(),
            session_id.map(SessionId::as_str),
            role.as_str(),
            speaker.as_str(),
            content,
        )
    }

    /// Full history for a room, oldest first, across all sessions.
    pub fn history(&self, room_id: &RoomId) -> Result<Vec<LogRow>> {
        let conn = self.pool.get()?;
        LogRepo::history_for_room(&conn, room_id.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_room() -> (ChatStore, RoomId) {
        let store = ChatStore::in_memory().unwrap();
        let (room, _) = store.create_room("r", 1).unwrap();
        (store, RoomId::from(room.id))
    }

    #[test]
    fn open_file_backed_store_runs_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        let store =
            ChatStore::open(path.to_str().unwrap(), &ConnectionConfig::default()).unwrap();
        let (room, existed) = store.create_room("r", 5).unwrap();
        assert!(!existed);
        assert!(room.id.starts_with("room_"));
    }

    #[test]
    fn create_room_reuses_active_for_couple() {
        let store = ChatStore::in_memory().unwrap();
        let (first, existed) = store.create_room("first", 9).unwrap();
        assert!(!existed);
        let (second, existed) = store.create_room("second name ignored", 9).unwrap();
        assert!(existed);
        assert_eq!(second.id, first.id);
    }

    #[test]
    fn create_room_after_deactivation_makes_new() {
        let store = ChatStore::in_memory().unwrap();
        let (first, _) = store.create_room("r", 3).unwrap();
        store.deactivate_room(&RoomId::from(first.id.clone())).unwrap();
        let (second, existed) = store.create_room("r", 3).unwrap();
        assert!(!existed);
        assert_ne!(second.id, first.id);
    }

    #[test]
    fn session_lifecycle() {
        let (store, room) = store_with_room();
        let a = ParticipantId::from("10");
        let b = ParticipantId::from("20");

        let sess = store
            .create_session(&room, &a, &b, Topic::Situation)
            .unwrap();
        assert_eq!(sess.topic, "topic_1_situation");
        assert_eq!(store.open_session_count().unwrap(), 1);

        let sid = SessionId::from(sess.id.clone());
        let new_start = store.mark_extended(&sid).unwrap();
        assert!(new_start >= sess.start_time);

        store.close_session(&sid).unwrap();
        assert!(store.active_session(&room).unwrap().is_none());
        assert_eq!(store.open_session_count().unwrap(), 0);
    }

    #[test]
    fn logs_round_trip_through_history() {
        let (store, room) = store_with_room();
        let _ = store
            .append_log(&room, None, Role::System, Speaker::Ai, "welcome")
            .unwrap();
        let _ = store
            .append_log(
                &room,
                None,
                Role::User,
                Speaker::Unknown,
                "hi",
            )
            .unwrap();

        let history = store.history(&room).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].speaker, "AI");
        assert_eq!(history[1].role, "user");
    }
}
