//! One experiment session: clock, timers, event bus and the scheduler core.
//!
//! Every entry point first turns elapsed clock time into due timer events, then
//! appends its own event, then drains the bus through the reducer. Commands come
//! back to the caller for rendering after they have been logged.
//!
//! A pump that runs late still delivers every missed deadline, but a stimulus is
//! stamped with the clock reading of the pump that shows it, so reaction times
//! never include the delay and a stall cannot time out a card before it is seen.

use chrono::{Duration, Utc};

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::deck::{Deck, RandomSource};
use crate::engine::bus::EventBus;
use crate::engine::events::{ClearCause, Command, Event, ShotTarget, Timestamp};
use crate::engine::scheduler::{end_phase, reduce, SchedulerConfig};
use crate::engine::state::{Core, Phase, SessionState};
use crate::ledger::Ledger;
use crate::logging::{
    log, log_resolution, log_score, log_spawn, obj, v_int, v_num, v_str, Domain, Level,
};
use crate::metrics::{aggregate, GameStats};
use crate::stimulus::Card;

/// Spawn and sweep deadlines. Exists only while the phase is active.
#[derive(Debug, Clone)]
struct TimerSchedule {
    spawn_every: u64,
    sweep_every: u64,
    next_spawn: Timestamp,
    next_sweep: Timestamp,
}

impl TimerSchedule {
    fn new(start: Timestamp, cfg: &SessionConfig) -> Self {
        let spawn_every = cfg.spawn_interval_ms.max(1);
        let sweep_every = cfg.sweep_interval_ms.max(1);
        Self {
            spawn_every,
            sweep_every,
            next_spawn: start + spawn_every,
            next_sweep: start + sweep_every,
        }
    }

    /// Next due event at or before `now`. Sweeps go first on ties.
    fn next_due(&mut self, now: Timestamp) -> Option<Event> {
        let ts = self.next_sweep.min(self.next_spawn);
        if ts > now {
            return None;
        }
        if self.next_sweep <= self.next_spawn {
            self.next_sweep += self.sweep_every;
            Some(Event::TimeoutSweep { ts })
        } else {
            self.next_spawn += self.spawn_every;
            Some(Event::SpawnTick { ts })
        }
    }
}

pub struct Session<S: RandomSource> {
    clock: Box<dyn Clock + Send>,
    source: S,
    pool: Vec<Card>,
    config: SessionConfig,
    scheduler: SchedulerConfig,
    bus: EventBus,
    core: Core,
    timers: Option<TimerSchedule>,
}

impl<S: RandomSource> Session<S> {
    pub fn new(pool: Vec<Card>, clock: impl Clock + Send + 'static, source: S) -> Self {
        Self {
            clock: Box::new(clock),
            source,
            pool,
            config: SessionConfig::default(),
            scheduler: SchedulerConfig::default(),
            bus: EventBus::new(),
            core: Core::new(Deck::default(), Utc::now()),
            timers: None,
        }
    }

    /// Reset score, ledger and deck, arm the timers and enter the active phase.
    pub fn start_session(&mut self, config: SessionConfig) {
        let now = self.clock.now_ms();
        let deck = Deck::balanced(&self.pool, config.quota_per_cell, &mut self.source);
        let epoch = Utc::now() - Duration::milliseconds(now as i64);

        self.scheduler = config.scheduler();
        self.core = Core::new(deck, epoch);
        self.core.state.phase = Phase::Active;
        self.core.state.time_remaining_secs = config.duration_secs;
        self.core.state.now = now;
        self.bus.clear();
        self.timers = Some(TimerSchedule::new(now, &config));
        self.config = config;

        log(
            Level::Info,
            Domain::Session,
            "session.started",
            obj(&[
                ("duration_secs", v_int(self.config.duration_secs as i64)),
                ("deck", v_int(self.core.deck.cards().len() as i64)),
                ("pool", v_int(self.pool.len() as i64)),
                ("visibility_ms", v_int(self.config.visibility_ms as i64)),
            ]),
        );
    }

    /// Deliver timer events that have come due on the clock.
    pub fn pump(&mut self) -> Vec<Command> {
        self.enqueue_due_timers();
        self.drain()
    }

    pub fn advance_clock_one_second(&mut self) -> Vec<Command> {
        self.dispatch(|ts| Event::CountdownTick { ts })
    }

    /// Click on grid slot `slot` (0-based).
    pub fn on_user_shoot(&mut self, slot: u8) -> Vec<Command> {
        self.dispatch(|ts| Event::Shoot { ts, target: ShotTarget::Slot(slot) })
    }

    /// Trigger key: shoots whatever is armed.
    pub fn on_trigger(&mut self) -> Vec<Command> {
        self.dispatch(|ts| Event::Shoot { ts, target: ShotTarget::Armed })
    }

    /// Stop the session if still running and aggregate the ledger.
    pub fn end_session(&mut self) -> GameStats {
        if self.core.state.phase == Phase::Active {
            let mut commands = Vec::new();
            end_phase(&mut self.core, &mut commands);
            for cmd in &commands {
                self.log_command(cmd);
            }
        }
        self.stop_timers();

        let stats = aggregate(self.core.ledger.records());
        log(
            Level::Info,
            Domain::Session,
            "session.stats",
            obj(&[
                ("total_trials", v_int(stats.total_trials as i64)),
                ("accuracy", v_num(stats.accuracy)),
                ("avg_reaction_time", v_num(stats.avg_reaction_time)),
                ("score", v_int(self.core.state.score)),
                ("pending", v_int(self.core.ledger.pending().count() as i64)),
                ("underruns", v_int(self.core.deck.underruns() as i64)),
                ("ledger_digest", v_str(&self.core.ledger.digest())),
            ]),
        );
        stats
    }

    pub fn state(&self) -> &SessionState {
        &self.core.state
    }

    pub fn ledger(&self) -> &Ledger {
        &self.core.ledger
    }

    pub fn deck(&self) -> &Deck {
        &self.core.deck
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn score(&self) -> i64 {
        self.core.state.score
    }

    pub fn phase(&self) -> Phase {
        self.core.state.phase
    }

    pub fn is_active(&self) -> bool {
        self.core.state.phase == Phase::Active
    }

    pub fn timers_armed(&self) -> bool {
        self.timers.is_some()
    }

    fn dispatch(&mut self, make: impl FnOnce(Timestamp) -> Event) -> Vec<Command> {
        let now = self.enqueue_due_timers();
        self.bus.push(make(now));
        self.drain()
    }

    fn enqueue_due_timers(&mut self) -> Timestamp {
        let now = self.clock.now_ms();
        // overdue ticks still reduce in deadline order, but stamp with `now`
        self.core.state.now = self.core.state.now.max(now);
        if let Some(timers) = self.timers.as_mut() {
            while let Some(event) = timers.next_due(now) {
                self.bus.push(event);
            }
        }
        now
    }

    fn drain(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        while let Some(event) = self.bus.pop() {
            let out = reduce(&mut self.core, event, &mut self.source, &self.scheduler);
            for cmd in &out.commands {
                self.log_command(cmd);
            }
            commands.extend(out.commands);
            if self.core.state.phase != Phase::Active {
                self.stop_timers();
            }
        }
        commands
    }

    fn stop_timers(&mut self) {
        if self.timers.take().is_some() {
            self.bus.clear();
            log(Level::Debug, Domain::Session, "timers.stopped", obj(&[]));
        }
    }

    fn log_command(&self, cmd: &Command) {
        match cmd {
            Command::Show { slot, trial_id, card } => log_spawn(
                trial_id,
                &card.id,
                *slot,
                self.core.state.now,
                card.attributes.is_threat(),
            ),
            Command::TrialFinalized { trial_id, outcome, reaction_ms } => {
                log_resolution(trial_id, outcome.as_str(), *reaction_ms)
            }
            Command::Score { delta, total, reason } => log_score(*delta, *total, reason.as_str()),
            Command::Clear { slot, trial_id, cause } if *cause == ClearCause::PhaseEnded => log(
                Level::Info,
                Domain::Trial,
                "trial.abandoned",
                obj(&[("trial_id", v_str(trial_id)), ("slot", v_int(*slot as i64))]),
            ),
            Command::Clear { .. } => {}
            Command::Countdown { remaining_secs } => log(
                Level::Trace,
                Domain::Session,
                "countdown",
                obj(&[("remaining_secs", v_int(*remaining_secs as i64))]),
            ),
            Command::PhaseEnded => log(
                Level::Info,
                Domain::Session,
                "phase.ended",
                obj(&[
                    ("score", v_int(self.core.state.score)),
                    ("trials", v_int(self.core.ledger.len() as i64)),
                ]),
            ),
            Command::Log { level, domain, msg } => {
                log(*level, *domain, "engine", obj(&[("msg", v_str(msg))]))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::deck::RngSource;
    use crate::ledger::Outcome;
    use rand::{rngs::StdRng, SeedableRng};

    fn session(clock: &ManualClock) -> Session<RngSource<StdRng>> {
        Session::new(Vec::new(), clock.clone(), RngSource(StdRng::seed_from_u64(3)))
    }

    fn short() -> SessionConfig {
        SessionConfig {
            duration_secs: 3,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn test_start_resets_and_arms() {
        let clock = ManualClock::new();
        let mut s = session(&clock);
        assert_eq!(s.phase(), Phase::Ready);
        s.start_session(short());
        assert!(s.is_active());
        assert!(s.timers_armed());
        assert_eq!(s.score(), 0);
        assert_eq!(s.state().time_remaining_secs, 3);
        assert_eq!(s.deck().cards().len(), 40);
        assert!(s.ledger().is_empty());
    }

    #[test]
    fn test_first_spawn_after_one_interval() {
        let clock = ManualClock::new();
        let mut s = session(&clock);
        s.start_session(short());

        clock.set(1_199);
        assert!(s.pump().iter().all(|c| !matches!(c, Command::Show { .. })));
        clock.set(1_200);
        let cmds = s.pump();
        assert!(cmds.iter().any(|c| matches!(c, Command::Show { .. })));
        assert_eq!(s.ledger().len(), 1);
        assert_eq!(s.state().active().map(|a| a.spawned_at), Some(1_200));
    }

    #[test]
    fn test_unanswered_trial_times_out_on_sweep() {
        let clock = ManualClock::new();
        let mut s = session(&clock);
        s.start_session(short());
        clock.set(1_200);
        s.pump();
        clock.set(2_099);
        s.pump();
        assert!(s.state().is_armed());
        clock.set(2_100);
        s.pump();
        assert!(!s.state().is_armed());
        let rec = &s.ledger().records()[0];
        assert!(rec.is_finalized());
        assert!(matches!(rec.outcome, Outcome::Miss | Outcome::CorrectRejection));
    }

    #[test]
    fn test_trigger_resolves_with_reaction_time() {
        let clock = ManualClock::new();
        let mut s = session(&clock);
        s.start_session(short());
        clock.set(1_200);
        s.pump();
        clock.set(1_530);
        s.on_trigger();
        let rec = &s.ledger().records()[0];
        assert_eq!(rec.reaction_ms, Some(330));
        assert!(matches!(rec.outcome, Outcome::CorrectHit | Outcome::FalseAlarm));
    }

    #[test]
    fn test_late_pump_measures_reaction_from_display() {
        let clock = ManualClock::new();
        let mut s = session(&clock);
        s.start_session(short());
        clock.set(1_290);
        s.pump();
        let slot = s.state().active_slot().unwrap();
        assert_eq!(s.state().active().map(|a| a.spawned_at), Some(1_290));

        s.on_user_shoot(slot);
        let rec = &s.ledger().records()[0];
        assert_eq!(rec.spawn_ms, 1_290);
        assert_eq!(rec.reaction_ms, Some(0));
    }

    #[test]
    fn test_stalled_pump_shows_before_timing_out() {
        let clock = ManualClock::new();
        let mut s = session(&clock);
        s.start_session(short());
        clock.set(2_150);
        let cmds = s.pump();

        let shows = cmds.iter().filter(|c| matches!(c, Command::Show { .. })).count();
        assert_eq!(shows, 1);
        assert!(!cmds.iter().any(|c| matches!(c, Command::TrialFinalized { .. })));
        assert!(s.state().is_armed());
        assert_eq!(s.ledger().pending().count(), 1);

        // full visibility window from 2150, on the 100ms sweep grid
        clock.set(3_000);
        s.pump();
        assert!(s.state().is_armed());
        clock.set(3_100);
        s.pump();
        assert!(!s.state().is_armed());
        assert_eq!(s.ledger().finalized().count(), 1);
    }

    #[test]
    fn test_countdown_stops_timers() {
        let clock = ManualClock::new();
        let mut s = session(&clock);
        s.start_session(short());
        for second in 1..=3u64 {
            clock.set(second * 1_000);
            s.advance_clock_one_second();
        }
        assert_eq!(s.phase(), Phase::Ended);
        assert!(!s.timers_armed());

        let trials = s.ledger().len();
        clock.set(30_000);
        assert!(s.pump().is_empty());
        assert_eq!(s.ledger().len(), trials);
    }

    #[test]
    fn test_end_session_mid_phase_aggregates_finalized_only() {
        let clock = ManualClock::new();
        let mut s = session(&clock);
        s.start_session(SessionConfig::default());
        clock.set(1_200);
        s.pump();
        let stats = s.end_session();
        assert_eq!(s.phase(), Phase::Ended);
        assert_eq!(stats.total_trials, 0);
        assert_eq!(s.ledger().pending().count(), 1);
    }
}
