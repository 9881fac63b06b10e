//! Engine inputs (events) and outputs (commands).

use serde::{Deserialize, Serialize};

use crate::ledger::{Outcome, TrialId};
use crate::logging::{Domain, Level};
use crate::stimulus::Card;

/// Milliseconds of monotonic session time.
pub type Timestamp = u64;

/// Number of grid positions a stimulus can appear in (3×3).
pub const GRID_SLOTS: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShotTarget {
    /// Click on a grid slot.
    Slot(u8),
    /// Bare trigger press: fires at whatever is armed.
    Armed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SpawnTick { ts: Timestamp },
    TimeoutSweep { ts: Timestamp },
    Shoot { ts: Timestamp, target: ShotTarget },
    CountdownTick { ts: Timestamp },
}

impl Event {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Event::SpawnTick { ts }
            | Event::TimeoutSweep { ts }
            | Event::Shoot { ts, .. }
            | Event::CountdownTick { ts } => *ts,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::SpawnTick { .. } => "spawn_tick",
            Event::TimeoutSweep { .. } => "timeout_sweep",
            Event::Shoot { .. } => "shoot",
            Event::CountdownTick { .. } => "countdown_tick",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreReason {
    Hit,
    FalseAlarm,
    EmptySlot,
}

impl ScoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreReason::Hit => "hit",
            ScoreReason::FalseAlarm => "false_alarm",
            ScoreReason::EmptySlot => "empty_slot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearCause {
    Shot,
    Timeout,
    PhaseEnded,
}

/// Side effects requested by the scheduler. Renderers and loggers consume these;
/// none of them mutate engine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Show { slot: u8, trial_id: TrialId, card: Card },
    Clear { slot: u8, trial_id: TrialId, cause: ClearCause },
    TrialFinalized { trial_id: TrialId, outcome: Outcome, reaction_ms: Option<u64> },
    Score { delta: i64, total: i64, reason: ScoreReason },
    Countdown { remaining_secs: u32 },
    PhaseEnded,
    Log { level: Level, domain: Domain, msg: String },
}
