use std::sync::Arc;

use anyhow::Result;
use biaslab::assets::{load_pool, CachedAssetProvider};
use biaslab::clock::MonotonicClock;
use biaslab::config::{ServiceConfig, SessionConfig};
use biaslab::deck::RngSource;
use biaslab::engine::events::{Command, GRID_SLOTS};
use biaslab::engine::state::SessionState;
use biaslab::logging::{log, obj, run_id, v_int, v_str, Domain, Level};
use biaslab::metrics::GameStats;
use biaslab::report::{spawn_report, GeminiReporter, NarrativeReporter, OfflineReporter};
use biaslab::session::Session;
use rand::{rngs::StdRng, SeedableRng};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, Duration, MissedTickBehavior};

fn print_grid(state: &SessionState) {
    let armed = state.active();
    let mut out = String::new();
    for row in 0..3u8 {
        for col in 0..3u8 {
            let slot = row * 3 + col;
            match armed {
                Some(a) if a.slot == slot => out.push_str(&format!("[{}:{:^7}]", slot + 1, "!!!")),
                _ => out.push_str(&format!("[{}:{:^7}]", slot + 1, "")),
            }
        }
        out.push('\n');
    }
    if let Some(a) = armed {
        let attrs = a.card.attributes;
        out.push_str(&format!(
            "  slot {}: {} {} in {}, holding {}\n",
            a.slot + 1,
            attrs.race(),
            attrs.gender(),
            attrs.attire(),
            attrs.held_object()
        ));
    }
    print!("{}", out);
}

fn render(commands: &[Command], state: &SessionState) {
    let mut redraw = false;
    for cmd in commands {
        match cmd {
            Command::Show { .. } | Command::Clear { .. } => redraw = true,
            Command::Score { delta, total, .. } => println!("score {:+} -> {}", delta, total),
            Command::Countdown { remaining_secs } if remaining_secs % 10 == 0 => {
                println!("{}s left", remaining_secs)
            }
            Command::PhaseEnded => println!("time!"),
            _ => {}
        }
    }
    if redraw {
        print_grid(state);
    }
}

fn print_stats(stats: &GameStats) {
    println!(
        "\n{} trials | accuracy {:.1}% | mean hit RT {:.0}ms",
        stats.total_trials,
        stats.accuracy * 100.0,
        stats.avg_reaction_time
    );
    println!(
        "{:<22} {:>10} {:>10} {:>8} {:>8}",
        "category", "RT threat", "RT safe", "FA %", "miss %"
    );
    for m in &stats.bias_data {
        println!(
            "{:<22} {:>10.0} {:>10.0} {:>8.1} {:>8.1}",
            m.category.label(),
            m.avg_reaction_time_threat,
            m.avg_reaction_time_non_threat,
            m.error_rate_false_alarm * 100.0,
            m.error_rate_miss * 100.0
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = SessionConfig::from_env();
    let svc = ServiceConfig::from_env()?;
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("run_id", v_str(run_id())),
            ("duration_secs", v_int(cfg.duration_secs as i64)),
            ("remote", serde_json::Value::Bool(svc.has_api_key())),
        ]),
    );

    let provider = CachedAssetProvider::new(svc.clone())
        .with_progress(Box::new(|done, total, msg| eprintln!("[{}/{}] {}", done, total, msg)));
    let pool = load_pool(&provider).await;

    let mut session = Session::new(pool, MonotonicClock::new(), RngSource(StdRng::from_entropy()));
    println!(
        "Shoot armed targets, spare unarmed ones. Type 1-{} + Enter to fire at a slot, \
         Enter alone to pull the trigger, q to quit.",
        GRID_SLOTS
    );
    session.start_session(cfg.clone());

    {
        let mut countdown = interval(Duration::from_secs(1));
        let mut ticker = interval(Duration::from_millis(cfg.sweep_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        countdown.tick().await;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while session.is_active() {
            let commands = tokio::select! {
                _ = countdown.tick() => session.advance_clock_one_second(),
                _ = ticker.tick() => session.pump(),
                line = lines.next_line() => match line? {
                    None => break,
                    Some(l) => match l.trim() {
                        "q" => break,
                        "" => session.on_trigger(),
                        s => match s.parse::<u8>() {
                            Ok(n) if (1..=GRID_SLOTS).contains(&n) => session.on_user_shoot(n - 1),
                            // out of range still counts as a shot at an empty slot
                            Ok(_) => session.on_user_shoot(GRID_SLOTS),
                            Err(_) => Vec::new(),
                        },
                    },
                },
            };
            render(&commands, session.state());
        }
    }

    let stats = session.end_session();
    print_stats(&stats);
    println!("final score {} | ledger {}", session.score(), session.ledger().digest());

    let reporter: Arc<dyn NarrativeReporter + Send + Sync> = if svc.has_api_key() {
        Arc::new(GeminiReporter::from_config(&svc)?)
    } else {
        Arc::new(OfflineReporter)
    };
    println!("\nGenerating analysis...");
    let report = spawn_report(reporter, stats).await?;
    println!("{}", report);
    Ok(())
}
