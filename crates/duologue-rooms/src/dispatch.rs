//! Per-room queue consumer.
//!
//! One task per room drains the bounded queue in FIFO order. Targets are
//! resolved against the registry at dispatch time, so an event queued before
//! a leave simply misses the departed participant, and an event for an empty
//! room is discarded. Delivery is independent per recipient: a full writer
//! channel drops that recipient's copy and never stalls the loop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use duologue_core::RoomId;

use crate::connection::PeerConnection;
use crate::registry::{ConnectionRegistry, QueueItem, Target};

/// Counter: events handed to at least one writer channel.
pub const EVENTS_DISPATCHED: &str = "duologue_events_dispatched_total";
/// Counter: per-recipient deliveries dropped (full or closed channel).
pub const EVENTS_DROPPED: &str = "duologue_events_dropped_total";

pub(crate) fn spawn(
    registry: Arc<ConnectionRegistry>,
    room: RoomId,
    rx: mpsc::Receiver<QueueItem>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(registry, room, rx))
}

async fn run(registry: Arc<ConnectionRegistry>, room: RoomId, mut rx: mpsc::Receiver<QueueItem>) {
    debug!(room_id = %room, "dispatcher started");
    while let Some(item) = rx.recv().await {
        let had_recipients = deliver(&registry, &room, &item);
        // A slot bootstrapped by an enqueue alone has no join/leave cycle
        // to tear it down; once its item is discarded it retires itself.
        if !had_recipients && registry.retire_if_never_joined(&room) {
            debug!(room_id = %room, "never-joined room retired");
            break;
        }
    }
    debug!(room_id = %room, "dispatcher stopped");
}

/// Returns whether any recipient was connected when the item was resolved.
fn deliver(registry: &ConnectionRegistry, room: &RoomId, item: &QueueItem) -> bool {
    let recipients: Vec<Arc<PeerConnection>> = match &item.target {
        Target::All => registry.connections_of(room),
        Target::One(participant) => registry.connection(room, participant).into_iter().collect(),
    };

    if recipients.is_empty() {
        debug!(room_id = %room, kind = ?item.event.kind, "no recipients, discarding event");
        return false;
    }

    let frame = match serde_json::to_string(&item.event) {
        Ok(json) => Arc::new(json),
        Err(e) => {
            warn!(room_id = %room, error = %e, "failed to serialize event");
            return true;
        }
    };

    metrics::counter!(EVENTS_DISPATCHED).increment(1);
    for conn in recipients {
        if !conn.send(Arc::clone(&frame)) {
            metrics::counter!(EVENTS_DROPPED).increment(1);
            warn!(
                room_id = %room,
                participant = %conn.participant_id,
                "failed to deliver frame, dropping for this recipient"
            );
        }
    }
    true
}
