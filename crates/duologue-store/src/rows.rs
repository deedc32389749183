//! Row types mapping directly onto the database schema.
//!
//! All timestamps are RFC 3339 strings, stored and compared as text.

use serde::{Deserialize, Serialize};

/// A chat room shared by one couple.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoomRow {
    pub id: String,
    pub name: String,
    pub couple_id: i64,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// One timed conversation segment within a room.
///
/// `end_time` is `NULL` while the segment is open; at most one open session
/// exists per room at a time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: String,
    pub room_id: String,
    pub user_a_id: String,
    pub user_b_id: String,
    pub topic: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub extension_used: bool,
}

/// One persisted chat line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    pub id: i64,
    pub room_id: String,
    pub session_id: Option<String>,
    pub role: String,
    pub speaker: String,
    pub content: String,
    pub timestamp: String,
}
