//! Room session orchestration.
//!
//! Five cooperating pieces, glued together by the [`SessionCoordinator`]:
//!
//! - [`registry`] — which participants are connected to which room, plus the
//!   per-room outbound queue and its dispatcher task,
//! - [`dispatch`] — the single consumer task that drains a room's queue in
//!   FIFO order and fans frames out to whoever is connected *now*,
//! - [`votes`] — one extension vote round per room,
//! - [`timer`] — cancellable delayed callbacks keyed by session ID,
//! - [`coordinator`] — the session state machine driving all of the above
//!   against the persistence layer.

pub mod connection;
pub mod coordinator;
pub mod dispatch;
pub mod registry;
pub mod script;
pub mod timer;
pub mod votes;

pub use connection::PeerConnection;
pub use coordinator::{CoordinatorConfig, CoordinatorError, SessionCoordinator};
pub use registry::{ConnectionRegistry, QUEUE_CAPACITY, Target};
pub use timer::TimerService;
pub use votes::{Decision, RoundStatus, VoteCollector, VoteError};
