//! End-to-end session behaviour on a manual clock.

use biaslab::clock::ManualClock;
use biaslab::config::SessionConfig;
use biaslab::deck::RngSource;
use biaslab::engine::events::Command;
use biaslab::engine::state::Phase;
use biaslab::ledger::{Action, Outcome};
use biaslab::metrics::Category;
use biaslab::participant::{simulate, ParticipantProfile};
use biaslab::session::Session;
use biaslab::stimulus::{Attire, Card, Gender, HeldObject, Race, StimulusAttributes};
use rand::{rngs::StdRng, SeedableRng};

fn single_card_session(race: Race, object: HeldObject) -> (ManualClock, Session<RngSource<StdRng>>) {
    let card = Card::new(
        "gen_0",
        StimulusAttributes::new(race, Gender::Female, Attire::Suit, object),
        Some("assets/gen_0.png".into()),
    );
    let clock = ManualClock::new();
    let mut session = Session::new(vec![card], clock.clone(), RngSource(StdRng::seed_from_u64(5)));
    session.start_session(SessionConfig::default());
    (clock, session)
}

fn score_from(commands: &[Command]) -> i64 {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::Score { delta, .. } => Some(*delta),
            _ => None,
        })
        .sum()
}

#[test]
fn armed_threat_shot_is_hit() {
    let (clock, mut session) = single_card_session(Race::Black, HeldObject::Gun);
    // deck holds only this race's threat copies
    assert_eq!(session.deck().cards().len(), 5);

    clock.set(1_200);
    session.pump();
    let slot = session.state().active_slot().expect("spawned");

    clock.set(1_400);
    let commands = session.on_user_shoot(slot);
    assert_eq!(score_from(&commands), 100);

    let rec = &session.ledger().records()[0];
    assert_eq!(rec.outcome, Outcome::CorrectHit);
    assert_eq!(rec.reaction_ms, Some(200));
    assert_eq!(session.state().active_slot(), None);
}

#[test]
fn ignored_non_threat_is_correct_rejection() {
    let (clock, mut session) = single_card_session(Race::White, HeldObject::Phone);
    clock.set(1_200);
    session.pump();
    clock.set(2_100);
    session.pump();

    let rec = &session.ledger().records()[0];
    assert_eq!(rec.outcome, Outcome::CorrectRejection);
    assert_eq!(rec.action, Action::Ignore);
    assert_eq!(rec.reaction_ms, None);
    assert_eq!(session.score(), 0);
}

#[test]
fn shot_at_wrong_slot_costs_points_only() {
    let (clock, mut session) = single_card_session(Race::Asian, HeldObject::Gun);
    clock.set(1_200);
    session.pump();
    let slot = session.state().active_slot().expect("spawned");

    clock.set(1_300);
    let commands = session.on_user_shoot((slot + 1) % 9);
    assert_eq!(score_from(&commands), -20);
    assert!(!session.ledger().records()[0].is_finalized());
    assert_eq!(session.state().active_slot(), Some(slot));
}

#[test]
fn full_session_keeps_ledger_consistent() {
    let clock = ManualClock::new();
    let mut session = Session::new(Vec::new(), clock.clone(), RngSource(StdRng::seed_from_u64(21)));
    session.start_session(SessionConfig {
        duration_secs: 20,
        ..SessionConfig::default()
    });

    let mut commands = Vec::new();
    let mut t = 0;
    while session.is_active() {
        t += 50;
        clock.set(t);
        commands.extend(session.pump());
        // fire at every third stimulus 300ms in, plus a stray shot now and then
        if let Some(a) = session.state().active() {
            if t == a.spawned_at + 300 && a.trial_id.ends_with(['0', '3', '6', '9']) {
                let slot = a.slot;
                commands.extend(session.on_user_shoot(slot));
            }
        } else if t % 1_750 == 0 {
            commands.extend(session.on_trigger());
        }
        if t % 1_000 == 0 {
            commands.extend(session.advance_clock_one_second());
        }
    }

    assert_eq!(session.phase(), Phase::Ended);
    assert_eq!(score_from(&commands), session.score());
    assert!(commands.contains(&Command::PhaseEnded));

    let ledger = session.ledger();
    assert!(ledger.len() >= 10);
    assert!(ledger.pending().count() <= 1);
    for rec in ledger.finalized() {
        assert!(rec.is_consistent(), "{:?}", rec);
        assert_eq!(rec.reaction_ms.is_some(), rec.action == Action::Shoot);
    }
    let spawns: Vec<u64> = ledger.records().iter().map(|r| r.spawn_ms).collect();
    assert!(spawns.windows(2).all(|w| w[0] < w[1]));

    let stats = session.end_session();
    assert_eq!(stats.total_trials, ledger_finalized(&session));
}

fn ledger_finalized(session: &Session<RngSource<StdRng>>) -> usize {
    session.ledger().finalized().count()
}

#[test]
fn same_seed_replays_identically() {
    let cfg = SessionConfig {
        duration_secs: 30,
        ..SessionConfig::default()
    };
    let profile = ParticipantProfile::default();
    let a = simulate(1234, cfg.clone(), &profile, Vec::new());
    let b = simulate(1234, cfg.clone(), &profile, Vec::new());
    let c = simulate(4321, cfg, &profile, Vec::new());

    assert_eq!(a.ledger_digest, b.ledger_digest);
    assert_eq!(a.score, b.score);
    assert_eq!(a.stats, b.stats);
    assert_ne!(a.ledger_digest, c.ledger_digest);
}

#[test]
fn biased_participant_shows_up_in_false_alarms() {
    let cfg = SessionConfig {
        duration_secs: 600,
        ..SessionConfig::default()
    };
    let profile = ParticipantProfile {
        false_alarm_rate: 0.05,
        bias_false_alarm: 0.6,
        ..ParticipantProfile::biased(Race::Black)
    };
    let report = simulate(77, cfg, &profile, Vec::new());

    let fa = |race| {
        report
            .stats
            .metric(Category::Race(race))
            .map(|m| m.error_rate_false_alarm)
            .unwrap_or_default()
    };
    assert!(report.stats.total_trials > 300);
    assert!(fa(Race::Black) > fa(Race::White) + 0.3);
    assert!(fa(Race::Black) > fa(Race::Asian) + 0.3);
}
