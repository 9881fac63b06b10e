//! Append-only trial ledger.
//!
//! Records enter `Pending` with their provisional outcome already set and leave
//! through exactly one `finalize` call. Finalized records are never touched again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;

use crate::stimulus::StimulusAttributes;

pub type TrialId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Shoot,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    CorrectHit,
    CorrectRejection,
    FalseAlarm,
    Miss,
}

impl Outcome {
    /// Outcome a trial receives if nothing happens before its window closes.
    pub fn provisional(is_threat: bool) -> Self {
        if is_threat {
            Outcome::Miss
        } else {
            Outcome::CorrectRejection
        }
    }

    /// Signal-detection table: (action, threat) -> outcome.
    pub fn expected(action: Action, is_threat: bool) -> Self {
        match (action, is_threat) {
            (Action::Shoot, true) => Outcome::CorrectHit,
            (Action::Shoot, false) => Outcome::FalseAlarm,
            (Action::Ignore, true) => Outcome::Miss,
            (Action::Ignore, false) => Outcome::CorrectRejection,
        }
    }

    pub fn is_correct(&self) -> bool {
        matches!(self, Outcome::CorrectHit | Outcome::CorrectRejection)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::CorrectHit => "correct_hit",
            Outcome::CorrectRejection => "correct_rejection",
            Outcome::FalseAlarm => "false_alarm",
            Outcome::Miss => "miss",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialStatus {
    Pending,
    Finalized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub id: TrialId,
    pub created_at: DateTime<Utc>,
    pub attributes: StimulusAttributes,
    /// Monotonic session time of the spawn, in ms.
    pub spawn_ms: u64,
    pub reaction_ms: Option<u64>,
    pub action: Action,
    pub outcome: Outcome,
    pub status: TrialStatus,
}

impl TrialRecord {
    pub fn pending(
        id: TrialId,
        created_at: DateTime<Utc>,
        attributes: StimulusAttributes,
        spawn_ms: u64,
    ) -> Self {
        Self {
            id,
            created_at,
            attributes,
            spawn_ms,
            reaction_ms: None,
            action: Action::Ignore,
            outcome: Outcome::provisional(attributes.is_threat()),
            status: TrialStatus::Pending,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.status == TrialStatus::Finalized
    }

    /// Outcome matches the signal-detection table and reaction time is present
    /// exactly for shots.
    pub fn is_consistent(&self) -> bool {
        self.outcome == Outcome::expected(self.action, self.attributes.is_threat())
            && self.reaction_ms.is_some() == (self.action == Action::Shoot)
    }
}

/// How a pending trial was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Shot { outcome: Outcome, reaction_ms: u64 },
    TimedOut,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("trial {0} already recorded")]
    DuplicateTrial(TrialId),
    #[error("trial {0} not found")]
    UnknownTrial(TrialId),
    #[error("trial {0} already finalized")]
    AlreadyFinalized(TrialId),
    #[error("trial {0} must be appended as pending")]
    NotPending(TrialId),
    #[error("outcome {outcome:?} contradicts stimulus of trial {id}")]
    Inconsistent { id: TrialId, outcome: Outcome },
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    records: Vec<TrialRecord>,
    index: HashMap<TrialId, usize>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: TrialRecord) -> Result<(), LedgerError> {
        if self.index.contains_key(&record.id) {
            return Err(LedgerError::DuplicateTrial(record.id));
        }
        if record.status != TrialStatus::Pending {
            return Err(LedgerError::NotPending(record.id));
        }
        self.index.insert(record.id.clone(), self.records.len());
        self.records.push(record);
        Ok(())
    }

    pub fn finalize(&mut self, id: &str, resolution: Resolution) -> Result<&TrialRecord, LedgerError> {
        let idx = *self
            .index
            .get(id)
            .ok_or_else(|| LedgerError::UnknownTrial(id.to_string()))?;
        let record = &mut self.records[idx];
        if record.status == TrialStatus::Finalized {
            return Err(LedgerError::AlreadyFinalized(record.id.clone()));
        }

        match resolution {
            Resolution::Shot { outcome, reaction_ms } => {
                if outcome != Outcome::expected(Action::Shoot, record.attributes.is_threat()) {
                    return Err(LedgerError::Inconsistent {
                        id: record.id.clone(),
                        outcome,
                    });
                }
                record.action = Action::Shoot;
                record.outcome = outcome;
                record.reaction_ms = Some(reaction_ms);
            }
            Resolution::TimedOut => {
                // provisional outcome stands
                record.action = Action::Ignore;
                record.reaction_ms = None;
            }
        }
        record.status = TrialStatus::Finalized;
        Ok(&*record)
    }

    pub fn get(&self, id: &str) -> Option<&TrialRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn finalized(&self) -> impl Iterator<Item = &TrialRecord> {
        self.records.iter().filter(|r| r.is_finalized())
    }

    pub fn pending(&self) -> impl Iterator<Item = &TrialRecord> {
        self.records.iter().filter(|r| !r.is_finalized())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// SHA-256 over the finalized records in ledger order. Wall-clock creation times
    /// are left out so replays of the same session hash identically.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for r in self.finalized() {
            hasher.update(r.id.as_bytes());
            hasher.update(serde_json::to_vec(&r.attributes).unwrap_or_default());
            hasher.update(r.spawn_ms.to_le_bytes());
            hasher.update(r.reaction_ms.map(|ms| ms as i64).unwrap_or(-1).to_le_bytes());
            hasher.update(r.outcome.as_str().as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}
