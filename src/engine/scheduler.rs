//! Trial scheduler: `(Core, Event) -> Vec<Command>`.
//!
//! One stimulus slot, two observable states:
//!
//! ```text
//!            SpawnTick (deck draw, pending record)
//!   Idle ─────────────────────────────────────────► Armed
//!    ▲                                                │
//!    └──── Shoot at armed slot | TimeoutSweep ◄───────┘
//! ```
//!
//! All events go through this one function in bus order, so a sweep and a shot
//! racing for the same trial resolve deterministically: the first one finalizes
//! and clears the slot, the second finds nothing armed and takes its idle path.

use super::classifier::{classify, EMPTY_SLOT_PENALTY};
use super::events::*;
use super::state::*;
use crate::deck::RandomSource;
use crate::ledger::{Resolution, TrialRecord};
use crate::logging::{Domain, Level};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How long a stimulus stays up before the sweep resolves it.
    pub visibility_ms: u64,
    pub grid_slots: u8,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            visibility_ms: 900,
            grid_slots: GRID_SLOTS,
        }
    }
}

#[derive(Debug, Default)]
pub struct ReducerOutput {
    pub commands: Vec<Command>,
}

pub fn reduce<S: RandomSource>(
    core: &mut Core,
    event: Event,
    source: &mut S,
    cfg: &SchedulerConfig,
) -> ReducerOutput {
    let mut commands = Vec::new();

    core.state.now = core.state.now.max(event.timestamp());
    core.state.seq += 1;

    if core.state.phase != Phase::Active {
        commands.push(Command::Log {
            level: Level::Trace,
            domain: Domain::Session,
            msg: format!("{} ignored outside active phase", event.name()),
        });
        return ReducerOutput { commands };
    }

    match event {
        Event::SpawnTick { ts } => handle_spawn(core, ts, source, cfg, &mut commands),
        Event::TimeoutSweep { ts } => handle_sweep(core, ts, cfg, &mut commands),
        Event::Shoot { ts, target } => handle_shoot(core, ts, target, &mut commands),
        Event::CountdownTick { .. } => handle_countdown(core, &mut commands),
    }

    ReducerOutput { commands }
}

fn handle_spawn<S: RandomSource>(
    core: &mut Core,
    ts: Timestamp,
    source: &mut S,
    cfg: &SchedulerConfig,
    commands: &mut Vec<Command>,
) {
    if core.state.is_armed() {
        return;
    }

    // stamped with the clock, not the deadline: a late tick shows the card now
    let shown_at = core.state.now.max(ts);
    let card = core.deck.draw(source);
    let slot = source.below(cfg.grid_slots as usize) as u8;
    let trial_id = core.next_trial_id();
    let record =
        TrialRecord::pending(trial_id.clone(), core.wall_time(shown_at), card.attributes, shown_at);

    if let Err(err) = core.ledger.append(record) {
        commands.push(Command::Log {
            level: Level::Error,
            domain: Domain::Trial,
            msg: format!("spawn dropped: {}", err),
        });
        return;
    }

    core.state.slot = SlotState::Armed(ActiveStimulus {
        slot,
        trial_id: trial_id.clone(),
        card: card.clone(),
        spawned_at: shown_at,
    });
    commands.push(Command::Show { slot, trial_id, card });
}

fn handle_sweep(core: &mut Core, ts: Timestamp, cfg: &SchedulerConfig, commands: &mut Vec<Command>) {
    let Some(active) = core.state.active() else {
        return;
    };
    if ts.saturating_sub(active.spawned_at) < cfg.visibility_ms {
        return;
    }

    let SlotState::Armed(active) = std::mem::take(&mut core.state.slot) else {
        return;
    };
    match core.ledger.finalize(&active.trial_id, Resolution::TimedOut) {
        Ok(record) => commands.push(Command::TrialFinalized {
            trial_id: record.id.clone(),
            outcome: record.outcome,
            reaction_ms: None,
        }),
        Err(err) => commands.push(Command::Log {
            level: Level::Error,
            domain: Domain::Trial,
            msg: format!("timeout finalize failed: {}", err),
        }),
    }
    commands.push(Command::Clear {
        slot: active.slot,
        trial_id: active.trial_id,
        cause: ClearCause::Timeout,
    });
}

fn handle_shoot(core: &mut Core, ts: Timestamp, target: ShotTarget, commands: &mut Vec<Command>) {
    let hits_armed = match (target, core.state.active_slot()) {
        (ShotTarget::Slot(s), Some(armed)) => s == armed,
        (ShotTarget::Armed, Some(_)) => true,
        (_, None) => false,
    };

    if !hits_armed {
        apply_score(core, EMPTY_SLOT_PENALTY, ScoreReason::EmptySlot, commands);
        return;
    }

    let SlotState::Armed(active) = std::mem::take(&mut core.state.slot) else {
        return;
    };
    let rt = ts.saturating_sub(active.spawned_at);
    let classification = classify(&active.card.attributes, rt);

    match core.ledger.finalize(&active.trial_id, classification.resolution()) {
        Ok(record) => {
            commands.push(Command::TrialFinalized {
                trial_id: record.id.clone(),
                outcome: record.outcome,
                reaction_ms: record.reaction_ms,
            });
            let reason = if classification.score_delta > 0 {
                ScoreReason::Hit
            } else {
                ScoreReason::FalseAlarm
            };
            apply_score(core, classification.score_delta, reason, commands);
        }
        Err(err) => commands.push(Command::Log {
            level: Level::Error,
            domain: Domain::Trial,
            msg: format!("shot finalize failed: {}", err),
        }),
    }
    commands.push(Command::Clear {
        slot: active.slot,
        trial_id: active.trial_id,
        cause: ClearCause::Shot,
    });
}

fn handle_countdown(core: &mut Core, commands: &mut Vec<Command>) {
    core.state.time_remaining_secs = core.state.time_remaining_secs.saturating_sub(1);
    commands.push(Command::Countdown {
        remaining_secs: core.state.time_remaining_secs,
    });
    if core.state.time_remaining_secs > 0 {
        return;
    }
    end_phase(core, commands);
}

/// Leave the active phase. A trial still on screen stays pending.
pub fn end_phase(core: &mut Core, commands: &mut Vec<Command>) {
    if core.state.phase != Phase::Active {
        return;
    }
    core.state.phase = Phase::Ended;
    if let SlotState::Armed(active) = std::mem::take(&mut core.state.slot) {
        // left pending: excluded from statistics
        commands.push(Command::Log {
            level: Level::Info,
            domain: Domain::Trial,
            msg: format!("trial {} abandoned at phase end", active.trial_id),
        });
        commands.push(Command::Clear {
            slot: active.slot,
            trial_id: active.trial_id,
            cause: ClearCause::PhaseEnded,
        });
    }
    commands.push(Command::PhaseEnded);
}

fn apply_score(core: &mut Core, delta: i64, reason: ScoreReason, commands: &mut Vec<Command>) {
    core.state.score += delta;
    commands.push(Command::Score {
        delta,
        total: core.state.score,
        reason,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::{Deck, SequenceSource};
    use crate::ledger::{Action, Outcome, TrialStatus};
    use crate::stimulus::{Attire, Card, Gender, HeldObject, Race, StimulusAttributes};
    use chrono::Utc;

    fn card(id: &str, race: Race, object: HeldObject) -> Card {
        Card::new(id, StimulusAttributes::new(race, Gender::Male, Attire::Suit, object), None)
    }

    fn active_core(cards: Vec<Card>) -> Core {
        let mut core = Core::new(Deck::from_cards(cards), Utc::now());
        core.state.phase = Phase::Active;
        core.state.time_remaining_secs = 60;
        core
    }

    fn spawn_at(core: &mut Core, ts: Timestamp, slot: usize) -> ReducerOutput {
        let mut src = SequenceSource::new([slot]);
        reduce(core, Event::SpawnTick { ts }, &mut src, &SchedulerConfig::default())
    }

    fn step(core: &mut Core, event: Event) -> ReducerOutput {
        let mut src = SequenceSource::default();
        reduce(core, event, &mut src, &SchedulerConfig::default())
    }

    #[test]
    fn test_threat_shot_at_armed_slot_is_hit() {
        let mut core = active_core(vec![card("c1", Race::Black, HeldObject::Gun)]);
        let out = spawn_at(&mut core, 0, 3);
        assert!(matches!(out.commands[0], Command::Show { slot: 3, .. }));
        assert_eq!(core.state.active_slot(), Some(3));

        step(&mut core, Event::Shoot { ts: 200, target: ShotTarget::Slot(3) });

        let rec = &core.ledger.records()[0];
        assert_eq!(rec.outcome, Outcome::CorrectHit);
        assert_eq!(rec.reaction_ms, Some(200));
        assert_eq!(rec.status, TrialStatus::Finalized);
        assert_eq!(core.state.score, 100);
        assert_eq!(core.state.active_slot(), None);
        assert_eq!(core.state.pending_trial_id(), None);
    }

    #[test]
    fn test_unanswered_non_threat_is_correct_rejection() {
        let mut core = active_core(vec![card("c1", Race::White, HeldObject::Phone)]);
        spawn_at(&mut core, 0, 5);

        for ts in (100..900).step_by(100) {
            step(&mut core, Event::TimeoutSweep { ts });
            assert!(core.state.is_armed(), "resolved early at {}", ts);
        }
        step(&mut core, Event::TimeoutSweep { ts: 900 });

        let rec = &core.ledger.records()[0];
        assert_eq!(rec.outcome, Outcome::CorrectRejection);
        assert_eq!(rec.reaction_ms, None);
        assert_eq!(rec.action, Action::Ignore);
        assert!(rec.is_finalized());
        assert_eq!(core.state.score, 0);
        assert!(!core.state.is_armed());
    }

    #[test]
    fn test_wrong_slot_penalizes_without_ledger_change() {
        let mut core = active_core(vec![card("c1", Race::Asian, HeldObject::Gun)]);
        spawn_at(&mut core, 0, 0);
        let before = core.ledger.records()[0].clone();

        let out = step(&mut core, Event::Shoot { ts: 150, target: ShotTarget::Slot(7) });
        assert!(out.commands.contains(&Command::Score {
            delta: -20,
            total: -20,
            reason: ScoreReason::EmptySlot
        }));
        assert_eq!(core.ledger.records()[0], before);
        assert_eq!(core.state.active_slot(), Some(0));

        step(&mut core, Event::TimeoutSweep { ts: 900 });
        let rec = &core.ledger.records()[0];
        assert_eq!(rec.outcome, Outcome::Miss);
        assert!(rec.is_finalized());
        assert_eq!(core.state.score, -20);
    }

    #[test]
    fn test_false_alarm_scores_negative() {
        let mut core = active_core(vec![card("c1", Race::Latino, HeldObject::Wallet)]);
        spawn_at(&mut core, 1_000, 2);
        step(&mut core, Event::Shoot { ts: 1_350, target: ShotTarget::Armed });
        let rec = &core.ledger.records()[0];
        assert_eq!(rec.outcome, Outcome::FalseAlarm);
        assert_eq!(rec.reaction_ms, Some(350));
        assert_eq!(core.state.score, -50);
    }

    #[test]
    fn test_trigger_with_nothing_armed_is_penalty() {
        let mut core = active_core(vec![]);
        step(&mut core, Event::Shoot { ts: 10, target: ShotTarget::Armed });
        assert_eq!(core.state.score, -20);
        assert!(core.ledger.is_empty());
    }

    #[test]
    fn test_spawn_is_noop_while_armed() {
        let mut core = active_core(vec![
            card("c1", Race::Black, HeldObject::Gun),
            card("c2", Race::White, HeldObject::Gun),
        ]);
        spawn_at(&mut core, 0, 1);
        let out = step(&mut core, Event::SpawnTick { ts: 1_200 });
        assert!(out.commands.is_empty());
        assert_eq!(core.ledger.len(), 1);
        assert_eq!(core.deck.remaining(), 1);
    }

    #[test]
    fn test_sweep_first_then_late_shot_is_penalty() {
        let mut core = active_core(vec![card("c1", Race::Black, HeldObject::Gun)]);
        spawn_at(&mut core, 0, 4);
        step(&mut core, Event::TimeoutSweep { ts: 900 });
        step(&mut core, Event::Shoot { ts: 900, target: ShotTarget::Slot(4) });

        let rec = &core.ledger.records()[0];
        assert_eq!(rec.outcome, Outcome::Miss);
        assert_eq!(rec.reaction_ms, None);
        assert_eq!(core.state.score, -20);
    }

    #[test]
    fn test_shot_first_then_sweep_is_noop() {
        let mut core = active_core(vec![card("c1", Race::Black, HeldObject::Gun)]);
        spawn_at(&mut core, 0, 4);
        step(&mut core, Event::Shoot { ts: 900, target: ShotTarget::Slot(4) });
        let out = step(&mut core, Event::TimeoutSweep { ts: 900 });

        assert!(out.commands.is_empty());
        let rec = &core.ledger.records()[0];
        assert_eq!(rec.outcome, Outcome::CorrectHit);
        assert_eq!(core.state.score, 100);
    }

    #[test]
    fn test_countdown_ends_phase_and_abandons_pending() {
        let mut core = active_core(vec![card("c1", Race::Asian, HeldObject::Camera)]);
        core.state.time_remaining_secs = 1;
        spawn_at(&mut core, 0, 8);

        let out = step(&mut core, Event::CountdownTick { ts: 500 });
        assert_eq!(core.state.phase, Phase::Ended);
        assert!(out.commands.contains(&Command::PhaseEnded));
        assert!(!core.state.is_armed());
        assert_eq!(core.ledger.pending().count(), 1);

        // nothing moves once the phase is over
        step(&mut core, Event::Shoot { ts: 600, target: ShotTarget::Slot(8) });
        step(&mut core, Event::SpawnTick { ts: 1_200 });
        assert_eq!(core.state.score, 0);
        assert_eq!(core.ledger.len(), 1);
    }

    #[test]
    fn test_late_spawn_is_stamped_with_clock() {
        let mut core = active_core(vec![card("c1", Race::Black, HeldObject::Gun)]);
        // session caught up to 2150 before delivering the 1200 tick
        core.state.now = 2_150;
        spawn_at(&mut core, 1_200, 6);
        assert_eq!(core.state.active().map(|a| a.spawned_at), Some(2_150));
        assert_eq!(core.ledger.records()[0].spawn_ms, 2_150);

        let out = step(&mut core, Event::TimeoutSweep { ts: 2_100 });
        assert!(out.commands.is_empty());
        assert!(core.state.is_armed());

        step(&mut core, Event::Shoot { ts: 2_150, target: ShotTarget::Slot(6) });
        assert_eq!(core.ledger.records()[0].reaction_ms, Some(0));
    }

    #[test]
    fn test_ignored_event_logs_under_session_domain() {
        let mut core = active_core(vec![]);
        core.state.phase = Phase::Ended;
        let out = step(&mut core, Event::TimeoutSweep { ts: 100 });
        assert!(matches!(
            out.commands.as_slice(),
            [Command::Log { level: Level::Trace, domain: Domain::Session, .. }]
        ));
    }

    #[test]
    fn test_abandoned_trial_logs_under_trial_domain() {
        let mut core = active_core(vec![card("c1", Race::White, HeldObject::Phone)]);
        spawn_at(&mut core, 0, 2);
        let mut commands = Vec::new();
        end_phase(&mut core, &mut commands);
        assert!(matches!(commands[0], Command::Log { domain: Domain::Trial, .. }));
    }

    #[test]
    fn test_every_finalized_record_matches_outcome_table() {
        let cards: Vec<Card> = (0..12)
            .map(|i| {
                let object = if i % 3 == 0 { HeldObject::Gun } else { HeldObject::Phone };
                card(&format!("c{}", i), Race::White, object)
            })
            .collect();
        let mut core = active_core(cards);
        let mut ts = 0;
        for i in 0..12 {
            spawn_at(&mut core, ts, i % 9);
            if i % 2 == 0 {
                step(&mut core, Event::Shoot { ts: ts + 250, target: ShotTarget::Armed });
            } else {
                step(&mut core, Event::TimeoutSweep { ts: ts + 900 });
            }
            ts += 1_200;
        }
        assert_eq!(core.ledger.finalized().count(), 12);
        assert!(core.ledger.finalized().all(|r| r.is_consistent()));
    }
}
