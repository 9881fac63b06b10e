//! Scripted participant for offline sessions.
//!
//! Drives a [`Session`] on a [`ManualClock`] in fixed steps, deciding per trial
//! whether and when to shoot. Optional race bias makes it faster on armed targets
//! of one race and more trigger-happy on its unarmed ones.

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;

use crate::clock::ManualClock;
use crate::config::SessionConfig;
use crate::deck::RngSource;
use crate::ledger::TrialId;
use crate::metrics::GameStats;
use crate::session::Session;
use crate::stimulus::{Card, Race, StimulusAttributes};

const STEP_MS: u64 = 10;
const MIN_RT_MS: u64 = 150;

#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantProfile {
    pub base_rt_ms: u64,
    pub rt_spread_ms: u64,
    pub hit_rate: f64,
    pub false_alarm_rate: f64,
    pub biased_race: Option<Race>,
    /// Subtracted from reaction time on armed targets of the biased race.
    pub bias_rt_ms: u64,
    /// Added to the false alarm rate for unarmed targets of the biased race.
    pub bias_false_alarm: f64,
}

impl Default for ParticipantProfile {
    fn default() -> Self {
        Self {
            base_rt_ms: 380,
            rt_spread_ms: 250,
            hit_rate: 0.9,
            false_alarm_rate: 0.1,
            biased_race: None,
            bias_rt_ms: 0,
            bias_false_alarm: 0.0,
        }
    }
}

impl ParticipantProfile {
    pub fn biased(race: Race) -> Self {
        Self {
            biased_race: Some(race),
            bias_rt_ms: 80,
            bias_false_alarm: 0.4,
            ..Self::default()
        }
    }

    /// Reaction time if the participant shoots, `None` to hold fire.
    pub fn decide<R: Rng>(&self, attrs: &StimulusAttributes, rng: &mut R) -> Option<u64> {
        let biased = self.biased_race == Some(attrs.race());
        let rt = self.base_rt_ms + rng.gen_range(0..=self.rt_spread_ms);
        if attrs.is_threat() {
            if !rng.gen_bool(self.hit_rate.clamp(0.0, 1.0)) {
                return None;
            }
            let rt = if biased { rt.saturating_sub(self.bias_rt_ms) } else { rt };
            Some(rt.max(MIN_RT_MS))
        } else {
            let p = if biased {
                self.false_alarm_rate + self.bias_false_alarm
            } else {
                self.false_alarm_rate
            };
            rng.gen_bool(p.clamp(0.0, 1.0)).then_some(rt.max(MIN_RT_MS))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub seed: u64,
    pub score: i64,
    pub ledger_digest: String,
    pub pending: usize,
    pub stats: GameStats,
}

/// Play one full session with `seed` driving both the deck and the participant.
pub fn simulate(
    seed: u64,
    config: SessionConfig,
    profile: &ParticipantProfile,
    pool: Vec<Card>,
) -> SimulationReport {
    let clock = ManualClock::new();
    let mut session = Session::new(pool, clock.clone(), RngSource(StdRng::seed_from_u64(seed)));
    let mut rng = StdRng::seed_from_u64(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    let mut plan: Option<(TrialId, Option<u64>)> = None;

    session.start_session(config);
    while session.is_active() {
        let now = clock.advance(STEP_MS);
        session.pump();

        let armed = session
            .state()
            .active()
            .map(|a| (a.trial_id.clone(), a.slot, a.spawned_at, a.card.attributes));
        if let Some((trial_id, slot, spawned_at, attrs)) = armed {
            if plan.as_ref().map(|(id, _)| id) != Some(&trial_id) {
                let shot_at = profile.decide(&attrs, &mut rng).map(|rt| spawned_at + rt);
                plan = Some((trial_id, shot_at));
            }
            if let Some((_, shot_at)) = plan.as_mut() {
                if shot_at.map_or(false, |at| now >= at) {
                    *shot_at = None;
                    session.on_user_shoot(slot);
                }
            }
        }

        if now % 1_000 == 0 {
            session.advance_clock_one_second();
        }
    }

    let stats = session.end_session();
    SimulationReport {
        seed,
        score: session.score(),
        ledger_digest: session.ledger().digest(),
        pending: session.ledger().pending().count(),
        stats,
    }
}
