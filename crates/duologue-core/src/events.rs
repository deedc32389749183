//! Conversation vocabulary and the outbound wire payload.
//!
//! A session walks through two fixed topics in order. Every frame the server
//! pushes to a client is an [`OutboundEvent`]: a flat JSON object with a
//! string `type` discriminant and optional session/topic/user context.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{ParticipantId, SessionId};

/// The two conversation topics, in the order a session visits them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    /// First segment: describe the situation.
    #[serde(rename = "topic_1_situation")]
    Situation,
    /// Second segment: talk about the emotions involved.
    #[serde(rename = "topic_2_emotion")]
    Emotion,
}

impl Topic {
    /// Wire/storage value for this topic.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Situation => "topic_1_situation",
            Topic::Emotion => "topic_2_emotion",
        }
    }

    /// Parse a stored topic value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "topic_1_situation" => Some(Topic::Situation),
            "topic_2_emotion" => Some(Topic::Emotion),
            _ => None,
        }
    }

    /// The topic that follows this one, or `None` after the last.
    #[must_use]
    pub fn next(self) -> Option<Topic> {
        match self {
            Topic::Situation => Some(Topic::Emotion),
            Topic::Emotion => None,
        }
    }

    /// Human-readable label used in counselor messages.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Topic::Situation => "the situation",
            Topic::Emotion => "your emotions",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who authored a persisted log line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// Which party a log line is attributed to.
///
/// `A` and `B` are the two session seats; `Ai` is the counselor voice;
/// `Unknown` covers messages sent while no session binds the sender to a
/// seat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    #[serde(rename = "A")]
    A,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "AI")]
    Ai,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl Speaker {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Speaker::A => "A",
            Speaker::B => "B",
            Speaker::Ai => "AI",
            Speaker::Unknown => "UNKNOWN",
        }
    }
}

/// Discriminant of an [`OutboundEvent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Participant chat relayed to the room.
    Message,
    /// Counselor/system text.
    System,
    /// A new session (or topic segment) has started.
    SessionStart,
    /// The current segment was extended after a vote.
    SessionExtend,
    /// Something the sender did was rejected.
    Error,
}

/// A frame pushed to connected clients.
///
/// Flat on the wire: `{"type": "...", "content": "...", "timestamp": "..."}`
/// plus whichever of `session_id` / `topic` / `user_id` apply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<Topic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<ParticipantId>,
    pub content: String,
    /// RFC 3339 creation time, stamped when the event is built.
    pub timestamp: String,
}

impl OutboundEvent {
    fn now() -> String {
        Utc::now().to_rfc3339()
    }

    /// A participant chat message, attributed to its sender.
    #[must_use]
    pub fn message(
        session_id: Option<SessionId>,
        user_id: ParticipantId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind: EventKind::Message,
            session_id,
            topic: None,
            user_id: Some(user_id),
            content: content.into(),
            timestamp: Self::now(),
        }
    }

    /// Counselor/system text, optionally bound to a session.
    #[must_use]
    pub fn system(session_id: Option<SessionId>, content: impl Into<String>) -> Self {
        Self {
            kind: EventKind::System,
            session_id,
            topic: None,
            user_id: None,
            content: content.into(),
            timestamp: Self::now(),
        }
    }

    /// Announce a session or topic segment starting.
    #[must_use]
    pub fn session_start(
        session_id: SessionId,
        topic: Topic,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind: EventKind::SessionStart,
            session_id: Some(session_id),
            topic: Some(topic),
            user_id: None,
            content: content.into(),
            timestamp: Self::now(),
        }
    }

    /// Announce a segment extension after a vote.
    #[must_use]
    pub fn session_extend(
        session_id: SessionId,
        topic: Topic,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind: EventKind::SessionExtend,
            session_id: Some(session_id),
            topic: Some(topic),
            user_id: None,
            content: content.into(),
            timestamp: Self::now(),
        }
    }

    /// Rejection notice for something the sender did.
    #[must_use]
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Error,
            session_id: None,
            topic: None,
            user_id: None,
            content: content.into(),
            timestamp: Self::now(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
