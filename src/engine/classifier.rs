//! Response classification for a shot at the armed stimulus.

use crate::ledger::{Action, Outcome, Resolution};
use crate::stimulus::StimulusAttributes;

pub const HIT_REWARD: i64 = 100;
pub const FALSE_ALARM_PENALTY: i64 = -50;
pub const EMPTY_SLOT_PENALTY: i64 = -20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub outcome: Outcome,
    pub score_delta: i64,
    pub reaction_ms: u64,
}

impl Classification {
    pub fn resolution(&self) -> Resolution {
        Resolution::Shot {
            outcome: self.outcome,
            reaction_ms: self.reaction_ms,
        }
    }
}

pub fn classify(attributes: &StimulusAttributes, reaction_ms: u64) -> Classification {
    let outcome = Outcome::expected(Action::Shoot, attributes.is_threat());
    let score_delta = match outcome {
        Outcome::CorrectHit => HIT_REWARD,
        _ => FALSE_ALARM_PENALTY,
    };
    Classification {
        outcome,
        score_delta,
        reaction_ms,
    }
}
