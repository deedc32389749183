//! Per-room connection registry and outbound queue ownership.
//!
//! Each room owns one [`RoomSlot`]: its connected members, the bounded
//! outbound queue, and the dispatcher task draining it. All slot mutations
//! happen under the map's per-key entry guard, so join, leave, and
//! dispatcher bootstrap are a single critical section per room — two
//! concurrent joins can never spawn two dispatchers. No lock is ever held
//! across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use duologue_core::{OutboundEvent, ParticipantId, RoomId};

use crate::connection::PeerConnection;
use crate::dispatch;

/// Outbound queue capacity per room. `enqueue` blocks when full.
pub const QUEUE_CAPACITY: usize = 100;

/// Who a queued event is addressed to. Resolved at dispatch time.
#[derive(Clone, Debug)]
pub enum Target {
    /// Everyone connected to the room when the item is dispatched.
    All,
    /// One participant, if still connected when the item is dispatched.
    One(ParticipantId),
}

/// One queued outbound event.
pub(crate) struct QueueItem {
    pub(crate) event: OutboundEvent,
    pub(crate) target: Target,
}

/// Per-room state: members, queue, dispatcher.
struct RoomSlot {
    members: HashMap<ParticipantId, Arc<PeerConnection>>,
    queue_tx: mpsc::Sender<QueueItem>,
    dispatcher: tokio::task::JoinHandle<()>,
    /// Whether anyone has ever joined this slot. A slot created by an
    /// enqueue alone retires once its item is discarded.
    ever_joined: bool,
}

/// Tracks which participants are connected to which room.
pub struct ConnectionRegistry {
    rooms: DashMap<RoomId, RoomSlot>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    fn new_slot(self: &Arc<Self>, room: &RoomId) -> RoomSlot {
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let dispatcher = dispatch::spawn(Arc::clone(self), room.clone(), queue_rx);
        debug!(room_id = %room, "room slot created");
        RoomSlot {
            members: HashMap::new(),
            queue_tx,
            dispatcher,
            ever_joined: false,
        }
    }

    /// Register a connection with its room, starting the room's dispatcher
    /// if this is the first activity there.
    ///
    /// A reconnect under the same participant ID is last-write-wins: the
    /// previous connection is replaced, its channel left to die with its
    /// socket task.
    pub fn join(self: &Arc<Self>, conn: Arc<PeerConnection>) {
        let room = conn.room_id.clone();
        let mut slot = self
            .rooms
            .entry(room.clone())
            .or_insert_with(|| self.new_slot(&room));
        slot.ever_joined = true;
        let replaced = slot
            .members
            .insert(conn.participant_id.clone(), Arc::clone(&conn));
        debug!(
            room_id = %room,
            participant = %conn.participant_id,
            replaced = replaced.is_some(),
            members = slot.members.len(),
            "participant joined"
        );
    }

    /// Remove a connection from its room.
    ///
    /// Only removes if the registered connection is this exact one, so a
    /// stale socket's cleanup cannot evict a fresh reconnect. Returns `true`
    /// when this call emptied the room (slot and dispatcher torn down).
    pub fn leave(&self, conn: &Arc<PeerConnection>) -> bool {
        let room = &conn.room_id;
        let mut emptied = false;
        if let Some(mut slot) = self.rooms.get_mut(room) {
            let is_current = slot
                .members
                .get(&conn.participant_id)
                .is_some_and(|c| Arc::ptr_eq(c, conn));
            if is_current {
                let _ = slot.members.remove(&conn.participant_id);
                debug!(
                    room_id = %room,
                    participant = %conn.participant_id,
                    members = slot.members.len(),
                    "participant left"
                );
            }
            emptied = slot.members.is_empty();
        }
        if emptied {
            // Re-checked under the entry guard; a concurrent join wins.
            if let Some((_, slot)) = self.rooms.remove_if(room, |_, s| s.members.is_empty()) {
                slot.dispatcher.abort();
                debug!(room_id = %room, "room emptied, slot torn down");
                return true;
            }
        }
        false
    }

    /// Queue an event for the room. Blocks when the queue is full.
    ///
    /// Starts the room's dispatcher if the room has no slot yet; an item
    /// queued for a room nobody joins is discarded at dispatch time and the
    /// throwaway slot retires itself.
    pub async fn enqueue(self: &Arc<Self>, room: &RoomId, event: OutboundEvent, target: Target) {
        let tx = {
            let slot = self
                .rooms
                .entry(room.clone())
                .or_insert_with(|| self.new_slot(room));
            slot.queue_tx.clone()
        };
        if tx.send(QueueItem { event, target }).await.is_err() {
            // Slot torn down between the clone and the send.
            debug!(room_id = %room, "queue closed, event discarded");
        }
    }

    /// Remove a room's slot if no one has ever joined it.
    ///
    /// Called by the dispatcher after discarding an item for a memberless
    /// room. Only slots bootstrapped by `enqueue` qualify; a concurrent join
    /// marks the slot and keeps it alive. Slots that had members are torn
    /// down by `leave` instead, so its emptied-room signal stays intact.
    pub(crate) fn retire_if_never_joined(&self, room: &RoomId) -> bool {
        self.rooms
            .remove_if(room, |_, slot| !slot.ever_joined)
            .is_some()
    }

    /// Snapshot of the participants connected to a room, sorted by ID.
    pub fn members_of(&self, room: &RoomId) -> Vec<ParticipantId> {
        let mut members: Vec<ParticipantId> = self
            .rooms
            .get(room)
            .map(|slot| slot.members.keys().cloned().collect())
            .unwrap_or_default();
        members.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        members
    }

    /// Snapshot of the live connections in a room.
    pub fn connections_of(&self, room: &RoomId) -> Vec<Arc<PeerConnection>> {
        self.rooms
            .get(room)
            .map(|slot| slot.members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// One participant's live connection, if connected.
    pub fn connection(&self, room: &RoomId, participant: &ParticipantId) -> Option<Arc<PeerConnection>> {
        self.rooms
            .get(room)
            .and_then(|slot| slot.members.get(participant).cloned())
    }

    /// Number of rooms with a live slot.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Total connections across all rooms.
    pub fn connection_count(&self) -> usize {
        self.rooms.iter().map(|slot| slot.members.len()).sum()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
