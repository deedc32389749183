//! Foundation types shared across the duologue workspace.
//!
//! This crate carries no behavior of its own: branded ID newtypes, the
//! topic/role/speaker vocabulary, the outbound event payload the server
//! pushes to clients, and `tracing` subscriber setup.

pub mod events;
pub mod ids;
pub mod logging;

pub use events::{EventKind, OutboundEvent, Role, Speaker, Topic};
pub use ids::{ParticipantId, RoomId, SessionId};
