//! End-of-session bias metrics.
//!
//! Only finalized trials are counted. Every trial lands in two category buckets:
//! the one for its race and the one for its attire.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ledger::{Outcome, TrialRecord};
use crate::stimulus::{Attire, Race, ATTIRES, RACES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Category {
    Race(Race),
    Attire(Attire),
}

impl Category {
    /// Races first, then attires.
    pub fn all() -> Vec<Category> {
        RACES
            .iter()
            .map(|r| Category::Race(*r))
            .chain(ATTIRES.iter().map(|a| Category::Attire(*a)))
            .collect()
    }

    pub fn contains(&self, record: &TrialRecord) -> bool {
        match self {
            Category::Race(r) => record.attributes.race() == *r,
            Category::Attire(a) => record.attributes.attire() == *a,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Race(r) => r.label(),
            Category::Attire(a) => a.label(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BiasMetric {
    pub category: Category,
    pub avg_reaction_time_threat: f64,
    pub avg_reaction_time_non_threat: f64,
    pub error_rate_false_alarm: f64,
    pub error_rate_miss: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStats {
    pub total_trials: usize,
    pub accuracy: f64,
    pub avg_reaction_time: f64,
    pub bias_data: Vec<BiasMetric>,
}

impl GameStats {
    pub fn metric(&self, category: Category) -> Option<&BiasMetric> {
        self.bias_data.iter().find(|m| m.category == category)
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn mean_reaction<'a>(records: impl Iterator<Item = &'a TrialRecord>) -> f64 {
    let (sum, n) = records.fold((0u64, 0usize), |(sum, n), r| {
        (sum + r.reaction_ms.unwrap_or(0), n + 1)
    });
    if n == 0 {
        0.0
    } else {
        sum as f64 / n as f64
    }
}

fn category_metric(category: Category, records: &[&TrialRecord]) -> BiasMetric {
    let (threat, safe): (Vec<&TrialRecord>, Vec<&TrialRecord>) = records
        .iter()
        .copied()
        .filter(|r| category.contains(r))
        .partition(|r| r.attributes.is_threat());

    let hits = || threat.iter().copied().filter(|r| r.outcome == Outcome::CorrectHit);
    let false_alarms = || safe.iter().copied().filter(|r| r.outcome == Outcome::FalseAlarm);
    let misses = threat.iter().filter(|r| r.outcome == Outcome::Miss).count();

    BiasMetric {
        category,
        avg_reaction_time_threat: mean_reaction(hits()),
        // speed of erroneous shots, not of correct rejections
        avg_reaction_time_non_threat: mean_reaction(false_alarms()),
        error_rate_false_alarm: ratio(false_alarms().count(), safe.len()),
        error_rate_miss: ratio(misses, threat.len()),
    }
}

/// Aggregate over any record set; pending records are skipped.
pub fn aggregate<'a>(records: impl IntoIterator<Item = &'a TrialRecord>) -> GameStats {
    let records: Vec<&TrialRecord> = records.into_iter().filter(|r| r.is_finalized()).collect();
    let total = records.len();
    let correct = records.iter().filter(|r| r.outcome.is_correct()).count();
    let avg_reaction_time = mean_reaction(
        records
            .iter()
            .copied()
            .filter(|r| r.outcome == Outcome::CorrectHit),
    );

    GameStats {
        total_trials: total,
        accuracy: ratio(correct, total),
        avg_reaction_time,
        bias_data: Category::all()
            .into_iter()
            .map(|c| category_metric(c, &records))
            .collect(),
    }
}
