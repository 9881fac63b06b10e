//! Session state owned by the engine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::events::Timestamp;
use crate::deck::Deck;
use crate::ledger::{Ledger, TrialId};
use crate::stimulus::Card;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Ready,
    Active,
    Ended,
}

/// The stimulus currently on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveStimulus {
    pub slot: u8,
    pub trial_id: TrialId,
    pub card: Card,
    pub spawned_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum SlotState {
    #[default]
    Idle,
    Armed(ActiveStimulus),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: Phase,
    pub score: i64,
    pub time_remaining_secs: u32,
    pub slot: SlotState,
    /// Latest clock reading: the last reduced event or the session's catch-up,
    /// whichever is later. Spawns are stamped with it.
    pub now: Timestamp,
    /// Events reduced this session.
    pub seq: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Ready,
            score: 0,
            time_remaining_secs: 0,
            slot: SlotState::Idle,
            now: 0,
            seq: 0,
        }
    }

    pub fn active(&self) -> Option<&ActiveStimulus> {
        match &self.slot {
            SlotState::Armed(a) => Some(a),
            SlotState::Idle => None,
        }
    }

    pub fn active_slot(&self) -> Option<u8> {
        self.active().map(|a| a.slot)
    }

    pub fn pending_trial_id(&self) -> Option<&str> {
        self.active().map(|a| a.trial_id.as_str())
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.slot, SlotState::Armed(_))
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the scheduler mutates.
#[derive(Debug, Clone)]
pub struct Core {
    pub state: SessionState,
    pub ledger: Ledger,
    pub deck: Deck,
    /// Wall-clock instant matching session time 0.
    pub epoch: DateTime<Utc>,
    trial_seq: u64,
}

impl Core {
    pub fn new(deck: Deck, epoch: DateTime<Utc>) -> Self {
        Self {
            state: SessionState::new(),
            ledger: Ledger::new(),
            deck,
            epoch,
            trial_seq: 0,
        }
    }

    pub fn next_trial_id(&mut self) -> TrialId {
        self.trial_seq += 1;
        format!("T-{:04}", self.trial_seq)
    }

    pub fn wall_time(&self, ts: Timestamp) -> DateTime<Utc> {
        self.epoch + Duration::milliseconds(ts as i64)
    }
}
