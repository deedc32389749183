//! Client wire protocol.
//!
//! Inbound frames are tagged JSON objects. Anything that fails to parse
//! earns the sender an `error` event, never a disconnect. Outbound traffic
//! is mostly [`duologue_core::OutboundEvent`]; the two frames the edge
//! answers directly (pong, history replay) live here.

use serde::{Deserialize, Serialize};

use duologue_store::LogRow;

/// A frame received from a client.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Application-level liveness probe; answered with a pong.
    Ping,
    /// A chat message for the room.
    Message { content: String },
    /// An answer to the extension prompt.
    Vote { choice: bool },
}

/// One replayed history line.
#[derive(Clone, Debug, Serialize)]
pub struct HistoryMessage {
    pub role: String,
    pub speaker: String,
    pub content: String,
    pub timestamp: String,
}

impl From<LogRow> for HistoryMessage {
    fn from(row: LogRow) -> Self {
        Self {
            role: row.role,
            speaker: row.speaker,
            content: row.content,
            timestamp: row.timestamp,
        }
    }
}

/// Frames the edge sends directly, outside the event dispatch path.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Answer to a client ping.
    Pong,
    /// Full room history, sent once right after connecting.
    ChatHistory { messages: Vec<HistoryMessage> },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ping() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping);
    }

    #[test]
    fn parse_message() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"message","content":"hello"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Message {
                content: "hello".into()
            }
        );
    }

    #[test]
    fn parse_vote() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"vote","choice":true}"#).unwrap();
        assert_eq!(msg, ClientMessage::Vote { choice: true });
    }

    #[test]
    fn unknown_type_fails() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"dance"}"#).is_err());
    }

    #[test]
    fn missing_fields_fail() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"message"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"vote"}"#).is_err());
    }

    #[test]
    fn pong_frame_shape() {
        let json = serde_json::to_value(ServerFrame::Pong).unwrap();
        assert_eq!(json["type"], "pong");
    }

    #[test]
    fn chat_history_frame_shape() {
        let frame = ServerFrame::ChatHistory {
            messages: vec![HistoryMessage {
                role: "user".into(),
                speaker: "A".into(),
                content: "hi".into(),
                timestamp: "2026-01-01T00:00:00Z".into(),
            }],
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "chat_history");
        assert_eq!(json["messages"][0]["speaker"], "A");
    }
}
