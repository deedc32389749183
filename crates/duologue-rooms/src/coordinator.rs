//! Session lifecycle state machine.
//!
//! One [`SessionCoordinator`] instance drives every room: it starts a
//! session when the second participant arrives, opens an extension vote when
//! a segment's clock runs out, applies the vote's outcome (any yes extends
//! once; both no advances), walks the topic order, and force-closes when a
//! room empties.
//!
//! Every transition persists its writes before mutating in-memory state; a
//! failed write aborts the transition. Timer callbacks carry the session ID
//! they were armed for and are ignored when it no longer matches the
//! active session.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use duologue_core::{OutboundEvent, ParticipantId, Role, RoomId, SessionId, Speaker, Topic};
use duologue_store::{ChatStore, SessionRow, StoreError};

use crate::registry::{ConnectionRegistry, Target};
use crate::script;
use crate::timer::TimerService;
use crate::votes::{Decision, RoundStatus, VoteCollector};

/// Gauge: sessions currently open across all rooms.
pub const ACTIVE_SESSIONS: &str = "duologue_active_sessions";

/// Errors surfaced by coordinator transitions.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

type Result<T> = std::result::Result<T, CoordinatorError>;

/// Tunable durations.
#[derive(Clone, Copy, Debug)]
pub struct CoordinatorConfig {
    /// Length of one topic segment.
    pub segment: Duration,
    /// How long a vote round stays open before resolving with partial votes.
    pub vote_window: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            segment: Duration::from_secs(900),
            vote_window: Duration::from_secs(120),
        }
    }
}

impl CoordinatorConfig {
    /// Segment length in whole minutes, floored to 1 for display.
    fn segment_minutes(&self) -> u64 {
        (self.segment.as_secs() / 60).max(1)
    }
}

/// Where the active session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Segment clock running.
    Running,
    /// Clock expired; extension vote open.
    AwaitingVotes,
}

struct ActiveSession {
    row: SessionRow,
    topic: Topic,
    phase: Phase,
}

#[derive(Default)]
struct RoomState {
    current: Option<ActiveSession>,
}

/// Drives session lifecycles across all rooms.
pub struct SessionCoordinator {
    registry: Arc<ConnectionRegistry>,
    store: Arc<ChatStore>,
    votes: VoteCollector,
    timers: Arc<TimerService>,
    config: CoordinatorConfig,
    rooms: DashMap<RoomId, Arc<tokio::sync::Mutex<RoomState>>>,
}

impl SessionCoordinator {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<ChatStore>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            registry,
            store,
            votes: VoteCollector::new(),
            timers: Arc::new(TimerService::new()),
            config,
            rooms: DashMap::new(),
        }
    }

    fn room_state(&self, room: &RoomId) -> Arc<tokio::sync::Mutex<RoomState>> {
        self.rooms.entry(room.clone()).or_default().clone()
    }

    fn arm_timeout(self: &Arc<Self>, room: RoomId, session: SessionId, after: Duration) {
        let coordinator = Arc::clone(self);
        let key = session.clone();
        self.timers.schedule(session, after, async move {
            coordinator.on_timeout(room, key).await;
        });
    }

    /// A participant finished connecting to the room.
    ///
    /// Starts a session on the first topic once two participants are present
    /// and none is active. With fewer members, or with a session already
    /// running, this is a no-op.
    pub async fn on_join(self: &Arc<Self>, room: &RoomId) -> Result<()> {
        let state_arc = self.room_state(room);
        let mut state = state_arc.lock().await;
        if state.current.is_some() {
            return Ok(());
        }
        let members = self.registry.members_of(room);
        if members.len() < 2 {
            debug!(room_id = %room, members = members.len(), "waiting for second participant");
            return Ok(());
        }

        // A crash can leave an open row behind; close it before starting.
        if let Some(orphan) = self.store.active_session(room)? {
            warn!(room_id = %room, session_id = %orphan.id, "closing orphaned open session");
            self.store.close_session(&SessionId::from(orphan.id))?;
        }

        let user_a = members[0].clone();
        let user_b = members[1].clone();
        let topic = Topic::Situation;
        let row = self.store.create_session(room, &user_a, &user_b, topic)?;
        let session_id = SessionId::from(row.id.clone());

        let intro = script::intro(self.config.segment_minutes());
        let opening = script::topic_opening(topic);
        let _ = self
            .store
            .append_log(room, Some(&session_id), Role::Assistant, Speaker::Ai, &intro)?;
        let _ = self.store.append_log(
            room,
            Some(&session_id),
            Role::Assistant,
            Speaker::Ai,
            &opening,
        )?;

        state.current = Some(ActiveSession {
            row,
            topic,
            phase: Phase::Running,
        });
        self.arm_timeout(room.clone(), session_id.clone(), self.config.segment);
        metrics::gauge!(ACTIVE_SESSIONS).increment(1.0);
        info!(room_id = %room, session_id = %session_id, "session started");

        self.registry
            .enqueue(
                room,
                OutboundEvent::system(Some(session_id.clone()), intro),
                Target::All,
            )
            .await;
        self.registry
            .enqueue(
                room,
                OutboundEvent::session_start(session_id, topic, opening),
                Target::All,
            )
            .await;
        Ok(())
    }

    /// A participant sent a chat message.
    ///
    /// Blank content is ignored. The message is attributed to its session
    /// seat (or `Unknown` outside a session), persisted, then relayed to the
    /// whole room.
    pub async fn on_chat(
        self: &Arc<Self>,
        room: &RoomId,
        sender: &ParticipantId,
        content: &str,
    ) -> Result<()> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            debug!(room_id = %room, participant = %sender, "ignoring blank message");
            return Ok(());
        }

        let state_arc = self.room_state(room);
        let state = state_arc.lock().await;
        let (session_id, speaker) = match &state.current {
            Some(active) => {
                let speaker = if sender.as_str() == active.row.user_a_id {
                    Speaker::A
                } else if sender.as_str() == active.row.user_b_id {
                    Speaker::B
                } else {
                    Speaker::Unknown
                };
                (Some(SessionId::from(active.row.id.clone())), speaker)
            }
            None => (None, Speaker::Unknown),
        };

        let _ = self
            .store
            .append_log(room, session_id.as_ref(), Role::User, speaker, trimmed)?;
        self.registry
            .enqueue(
                room,
                OutboundEvent::message(session_id, sender.clone(), trimmed),
                Target::All,
            )
            .await;
        Ok(())
    }

    /// A participant answered the extension prompt.
    pub async fn on_vote(
        self: &Arc<Self>,
        room: &RoomId,
        voter: &ParticipantId,
        choice: bool,
    ) -> Result<()> {
        let state_arc = self.room_state(room);
        let mut state = state_arc.lock().await;
        match self.votes.submit(room, voter, choice) {
            Err(e) => {
                debug!(room_id = %room, participant = %voter, error = %e, "vote rejected");
                self.registry
                    .enqueue(
                        room,
                        OutboundEvent::error(e.to_string()),
                        Target::One(voter.clone()),
                    )
                    .await;
            }
            Ok(RoundStatus::AlreadyResolved) => {
                debug!(room_id = %room, participant = %voter, "vote after resolution ignored");
            }
            Ok(RoundStatus::AwaitingOthers) => {
                let session_id = state
                    .current
                    .as_ref()
                    .map(|a| SessionId::from(a.row.id.clone()));
                self.registry
                    .enqueue(
                        room,
                        OutboundEvent::system(session_id, script::waiting_for_other()),
                        Target::One(voter.clone()),
                    )
                    .await;
            }
            Ok(RoundStatus::Resolved(decision)) => {
                self.apply_decision(&mut state, room, decision).await?;
            }
        }
        Ok(())
    }

    /// A timer armed for `session` fired.
    ///
    /// Ignored unless `session` is still the room's active session. A fire
    /// during `Running` either opens the extension vote or, if the one
    /// extension is spent, advances directly; a fire during `AwaitingVotes`
    /// is the watchdog resolving the round with partial votes.
    pub async fn on_timeout(self: &Arc<Self>, room: RoomId, session: SessionId) {
        if let Err(e) = self.handle_timeout(&room, &session).await {
            error!(room_id = %room, session_id = %session, error = %e, "timeout handling failed");
        }
    }

    async fn handle_timeout(self: &Arc<Self>, room: &RoomId, session: &SessionId) -> Result<()> {
        let state_arc = self.room_state(room);
        let mut state = state_arc.lock().await;

        let Some((phase, extension_used, topic, user_a, user_b)) =
            state.current.as_ref().and_then(|active| {
                (active.row.id == session.as_str()).then(|| {
                    (
                        active.phase,
                        active.row.extension_used,
                        active.topic,
                        ParticipantId::from(active.row.user_a_id.clone()),
                        ParticipantId::from(active.row.user_b_id.clone()),
                    )
                })
            })
        else {
            debug!(room_id = %room, session_id = %session, "stale timer fire ignored");
            return Ok(());
        };

        match phase {
            Phase::Running if extension_used => {
                // Extension already spent; no vote, move on.
                self.advance(&mut state, room).await
            }
            Phase::Running => {
                let prompt = script::extension_prompt(topic);
                let _ = self.store.append_log(
                    room,
                    Some(session),
                    Role::Assistant,
                    Speaker::Ai,
                    &prompt,
                )?;

                if let Some(active) = state.current.as_mut() {
                    active.phase = Phase::AwaitingVotes;
                }
                self.votes.begin_round(room, vec![user_a, user_b]);
                self.arm_timeout(room.clone(), session.clone(), self.config.vote_window);
                info!(room_id = %room, session_id = %session, "segment time up, vote opened");

                self.registry
                    .enqueue(
                        room,
                        OutboundEvent::system(Some(session.clone()), prompt),
                        Target::All,
                    )
                    .await;
                Ok(())
            }
            Phase::AwaitingVotes => {
                if let Some(decision) = self.votes.resolve_partial(room) {
                    info!(room_id = %room, session_id = %session, "vote window closed");
                    self.apply_decision(&mut state, room, decision).await?;
                }
                Ok(())
            }
        }
    }

    /// The room just emptied; force-close whatever was in flight.
    pub async fn on_room_empty(self: &Arc<Self>, room: &RoomId) {
        let state_arc = self.room_state(room);
        let mut state = state_arc.lock().await;
        // A reconnect can land between the leave that emptied the room and
        // this handler taking the lock. The repopulated room keeps its
        // session; tearing it down would strand a connected pair.
        if !self.registry.members_of(room).is_empty() {
            debug!(room_id = %room, "room repopulated before empty handling, keeping session");
            return;
        }
        if let Some(active) = state.current.take() {
            let session_id = SessionId::from(active.row.id);
            self.timers.cancel(&session_id);
            // Cleanup proceeds even if the close fails to persist; nobody is
            // left in the room to act on the session either way.
            if let Err(e) = self.store.close_session(&session_id) {
                warn!(room_id = %room, session_id = %session_id, error = %e, "failed to persist force close");
            }
            metrics::gauge!(ACTIVE_SESSIONS).decrement(1.0);
            info!(room_id = %room, session_id = %session_id, "room emptied, session force closed");
        }
        self.votes.clear(room);
        drop(state);
        let _ = self.rooms.remove(room);
    }

    /// The room's active session, if any.
    pub async fn active_session(&self, room: &RoomId) -> Option<SessionRow> {
        self.room_state(room)
            .lock()
            .await
            .current
            .as_ref()
            .map(|a| a.row.clone())
    }

    /// Whether a timer is armed for the session.
    pub fn timer_armed(&self, session: &SessionId) -> bool {
        self.timers.is_armed(session)
    }

    /// Number of armed timers across all rooms.
    pub fn armed_timer_count(&self) -> usize {
        self.timers.armed_count()
    }

    // ─── Transitions ─────────────────────────────────────────────────────────

    async fn apply_decision(
        self: &Arc<Self>,
        state: &mut RoomState,
        room: &RoomId,
        decision: Decision,
    ) -> Result<()> {
        let Some((session_id, topic, phase)) = state
            .current
            .as_ref()
            .map(|a| (SessionId::from(a.row.id.clone()), a.topic, a.phase))
        else {
            debug!(room_id = %room, "vote resolved with no active session");
            return Ok(());
        };
        if phase != Phase::AwaitingVotes {
            debug!(room_id = %room, session_id = %session_id, "vote resolved outside a vote phase");
            return Ok(());
        }

        if decision.any_yes {
            let new_start = self.store.mark_extended(&session_id)?;
            let minutes = self.config.segment_minutes();
            let text = if decision.all_yes {
                script::extended_all(topic, minutes)
            } else {
                script::extended_one(topic, minutes)
            };
            let _ = self.store.append_log(
                room,
                Some(&session_id),
                Role::Assistant,
                Speaker::Ai,
                &text,
            )?;

            if let Some(active) = state.current.as_mut() {
                active.row.extension_used = true;
                active.row.start_time = new_start;
                active.phase = Phase::Running;
            }
            self.arm_timeout(room.clone(), session_id.clone(), self.config.segment);
            info!(room_id = %room, session_id = %session_id, all_yes = decision.all_yes, "segment extended");

            self.registry
                .enqueue(
                    room,
                    OutboundEvent::session_extend(session_id, topic, text),
                    Target::All,
                )
                .await;
            Ok(())
        } else {
            self.advance(state, room).await
        }
    }

    /// Close the active session and either open the next topic or end.
    async fn advance(self: &Arc<Self>, state: &mut RoomState, room: &RoomId) -> Result<()> {
        let Some((old_id, topic, user_a, user_b)) = state.current.as_ref().map(|a| {
            (
                SessionId::from(a.row.id.clone()),
                a.topic,
                ParticipantId::from(a.row.user_a_id.clone()),
                ParticipantId::from(a.row.user_b_id.clone()),
            )
        }) else {
            return Ok(());
        };

        match topic.next() {
            Some(next_topic) => {
                self.store.close_session(&old_id)?;
                let row = self.store.create_session(room, &user_a, &user_b, next_topic)?;
                let new_id = SessionId::from(row.id.clone());
                let opening = script::topic_opening(next_topic);
                let _ = self.store.append_log(
                    room,
                    Some(&new_id),
                    Role::Assistant,
                    Speaker::Ai,
                    &opening,
                )?;

                self.timers.cancel(&old_id);
                self.votes.clear(room);
                state.current = Some(ActiveSession {
                    row,
                    topic: next_topic,
                    phase: Phase::Running,
                });
                self.arm_timeout(room.clone(), new_id.clone(), self.config.segment);
                info!(
                    room_id = %room,
                    old_session_id = %old_id,
                    session_id = %new_id,
                    topic = %next_topic,
                    "advanced to next topic"
                );

                self.registry
                    .enqueue(
                        room,
                        OutboundEvent::session_start(new_id, next_topic, opening),
                        Target::All,
                    )
                    .await;
            }
            None => {
                self.store.close_session(&old_id)?;
                let text = script::closing();
                let _ = self
                    .store
                    .append_log(room, Some(&old_id), Role::Assistant, Speaker::Ai, text)?;

                self.timers.cancel(&old_id);
                self.votes.clear(room);
                state.current = None;
                metrics::gauge!(ACTIVE_SESSIONS).decrement(1.0);
                info!(room_id = %room, session_id = %old_id, "conversation ended");

                self.registry
                    .enqueue(
                        room,
                        OutboundEvent::system(Some(old_id), text),
                        Target::All,
                    )
                    .await;
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::PeerConnection;
    use tokio::sync::mpsc;

    fn fixture() -> (Arc<ConnectionRegistry>, Arc<SessionCoordinator>, RoomId) {
        let registry = Arc::new(ConnectionRegistry::new());
        let store = Arc::new(ChatStore::in_memory().unwrap());
        let (room, _) = store.create_room("fixture room", 1).unwrap();
        let coordinator = Arc::new(SessionCoordinator::new(
            Arc::clone(&registry),
            store,
            CoordinatorConfig {
                segment: Duration::from_secs(60),
                vote_window: Duration::from_secs(60),
            },
        ));
        (registry, coordinator, RoomId::from(room.id))
    }

    fn connect(
        registry: &Arc<ConnectionRegistry>,
        room: &RoomId,
        participant: &str,
    ) -> (Arc<PeerConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(64);
        let conn = Arc::new(PeerConnection::new(
            room.clone(),
            ParticipantId::from(participant),
            tx,
        ));
        registry.join(Arc::clone(&conn));
        (conn, rx)
    }

    #[tokio::test]
    async fn no_session_with_one_participant() {
        let (registry, coordinator, room) = fixture();
        let (_a, _rx) = connect(&registry, &room, "10");
        coordinator.on_join(&room).await.unwrap();
        assert!(coordinator.active_session(&room).await.is_none());
        assert_eq!(coordinator.armed_timer_count(), 0);
    }

    #[tokio::test]
    async fn second_join_starts_session_and_arms_timer() {
        let (registry, coordinator, room) = fixture();
        let (_a, _rx_a) = connect(&registry, &room, "10");
        coordinator.on_join(&room).await.unwrap();
        let (_b, _rx_b) = connect(&registry, &room, "20");
        coordinator.on_join(&room).await.unwrap();

        let session = coordinator.active_session(&room).await.unwrap();
        assert_eq!(session.topic, "topic_1_situation");
        assert_eq!(session.user_a_id, "10");
        assert_eq!(session.user_b_id, "20");
        assert!(coordinator.timer_armed(&SessionId::from(session.id)));
    }

    #[tokio::test]
    async fn third_join_does_not_restart() {
        let (registry, coordinator, room) = fixture();
        let (_a, _rx_a) = connect(&registry, &room, "10");
        let (_b, _rx_b) = connect(&registry, &room, "20");
        coordinator.on_join(&room).await.unwrap();
        let first = coordinator.active_session(&room).await.unwrap();
        // Reconnect of an existing participant.
        let (_b2, _rx_b2) = connect(&registry, &room, "20");
        coordinator.on_join(&room).await.unwrap();
        let second = coordinator.active_session(&room).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(coordinator.armed_timer_count(), 1);
    }

    #[tokio::test]
    async fn blank_chat_is_ignored() {
        let (registry, coordinator, room) = fixture();
        let (_a, _rx_a) = connect(&registry, &room, "10");
        coordinator
            .on_chat(&room, &ParticipantId::from("10"), "   ")
            .await
            .unwrap();
        // Nothing was queued; the dispatcher stays idle.
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn stale_timer_fire_is_ignored() {
        let (registry, coordinator, room) = fixture();
        let (_a, _rx_a) = connect(&registry, &room, "10");
        let (_b, _rx_b) = connect(&registry, &room, "20");
        coordinator.on_join(&room).await.unwrap();
        let session = coordinator.active_session(&room).await.unwrap();

        coordinator
            .on_timeout(room.clone(), SessionId::from("sess_other"))
            .await;

        let after = coordinator.active_session(&room).await.unwrap();
        assert_eq!(after.id, session.id);
    }

    #[tokio::test]
    async fn room_empty_clears_everything() {
        let (registry, coordinator, room) = fixture();
        let (a, _rx_a) = connect(&registry, &room, "10");
        let (b, _rx_b) = connect(&registry, &room, "20");
        coordinator.on_join(&room).await.unwrap();
        let session = coordinator.active_session(&room).await.unwrap();

        assert!(!registry.leave(&a));
        assert!(registry.leave(&b));
        coordinator.on_room_empty(&room).await;

        assert!(coordinator.active_session(&room).await.is_none());
        assert!(!coordinator.timer_armed(&SessionId::from(session.id)));
        assert_eq!(coordinator.armed_timer_count(), 0);
    }

    #[tokio::test]
    async fn rejoin_before_empty_handling_keeps_session() {
        let (registry, coordinator, room) = fixture();
        let (a, _rx_a) = connect(&registry, &room, "10");
        let (b, _rx_b) = connect(&registry, &room, "20");
        coordinator.on_join(&room).await.unwrap();
        let session = coordinator.active_session(&room).await.unwrap();

        assert!(!registry.leave(&a));
        assert!(registry.leave(&b));
        // Both reconnect before the delayed empty handler runs.
        let (_a2, _rx_a2) = connect(&registry, &room, "10");
        let (_b2, _rx_b2) = connect(&registry, &room, "20");
        coordinator.on_join(&room).await.unwrap();
        coordinator.on_room_empty(&room).await;

        let active = coordinator
            .active_session(&room)
            .await
            .expect("repopulated room keeps its session");
        assert_eq!(active.id, session.id);
        assert!(coordinator.timer_armed(&SessionId::from(session.id)));
    }

    #[tokio::test]
    async fn vote_without_round_sends_error_to_sender() {
        let (registry, coordinator, room) = fixture();
        let (_a, mut rx_a) = connect(&registry, &room, "10");
        coordinator
            .on_vote(&room, &ParticipantId::from("10"), true)
            .await
            .unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(1), rx_a.recv())
            .await
            .unwrap()
            .unwrap();
        let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v["type"], "error");
    }
}
