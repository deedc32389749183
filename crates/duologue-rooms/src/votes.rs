//! Extension vote rounds, one per room.
//!
//! A round opens with the set of eligible voters, collects one boolean
//! choice per voter (resubmission overwrites, never double-counts), and
//! resolves once every voter has answered. A resolved round stays behind as
//! a tombstone so stragglers get [`RoundStatus::AlreadyResolved`] instead of
//! opening anything new; the tombstone clears on the next `begin_round` or
//! `clear`.

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use duologue_core::{ParticipantId, RoomId};

/// Outcome of a resolved round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decision {
    /// At least one voter said yes.
    pub any_yes: bool,
    /// Every voter said yes.
    pub all_yes: bool,
}

/// What a submitted vote did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundStatus {
    /// Vote recorded; other voters still outstanding.
    AwaitingOthers,
    /// This vote completed the round.
    Resolved(Decision),
    /// The round had already resolved; the vote changed nothing.
    AlreadyResolved,
}

/// Why a vote was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum VoteError {
    /// No round is open for the room.
    #[error("no vote round is open")]
    NoActiveRound,
    /// The sender is not one of the round's eligible voters.
    #[error("not an eligible voter in this round")]
    NotAVoter,
}

struct Round {
    expected: Vec<ParticipantId>,
    choices: HashMap<ParticipantId, bool>,
    resolved: bool,
}

impl Round {
    fn decide(&self) -> Decision {
        let yes = self.choices.values().filter(|c| **c).count();
        Decision {
            any_yes: yes > 0,
            all_yes: yes == self.expected.len(),
        }
    }
}

/// Collects extension votes per room.
pub struct VoteCollector {
    rounds: Mutex<HashMap<RoomId, Round>>,
}

impl VoteCollector {
    pub fn new() -> Self {
        Self {
            rounds: Mutex::new(HashMap::new()),
        }
    }

    /// Open a fresh round for the room, replacing any previous round or
    /// tombstone.
    pub fn begin_round(&self, room: &RoomId, expected: Vec<ParticipantId>) {
        debug!(room_id = %room, voters = expected.len(), "vote round opened");
        let _ = self.rounds.lock().insert(
            room.clone(),
            Round {
                expected,
                choices: HashMap::new(),
                resolved: false,
            },
        );
    }

    /// Record one voter's choice.
    pub fn submit(
        &self,
        room: &RoomId,
        voter: &ParticipantId,
        choice: bool,
    ) -> Result<RoundStatus, VoteError> {
        let mut rounds = self.rounds.lock();
        let round = rounds.get_mut(room).ok_or(VoteError::NoActiveRound)?;
        if !round.expected.contains(voter) {
            return Err(VoteError::NotAVoter);
        }
        if round.resolved {
            return Ok(RoundStatus::AlreadyResolved);
        }

        let _ = round.choices.insert(voter.clone(), choice);
        if round.choices.len() < round.expected.len() {
            return Ok(RoundStatus::AwaitingOthers);
        }

        round.resolved = true;
        Ok(RoundStatus::Resolved(round.decide()))
    }

    /// Resolve a pending round with the votes received so far.
    ///
    /// Missing voters count as "no". Returns `None` when no round is open or
    /// it already resolved.
    pub fn resolve_partial(&self, room: &RoomId) -> Option<Decision> {
        let mut rounds = self.rounds.lock();
        let round = rounds.get_mut(room)?;
        if round.resolved {
            return None;
        }
        round.resolved = true;
        debug!(
            room_id = %room,
            received = round.choices.len(),
            expected = round.expected.len(),
            "vote round resolved with partial votes"
        );
        Some(round.decide())
    }

    /// Whether an unresolved round is open for the room.
    pub fn has_pending(&self, room: &RoomId) -> bool {
        self.rounds.lock().get(room).is_some_and(|r| !r.resolved)
    }

    /// Drop all round state (including a tombstone) for the room.
    pub fn clear(&self, room: &RoomId) {
        let _ = self.rounds.lock().remove(room);
    }
}

impl Default for VoteCollector {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
