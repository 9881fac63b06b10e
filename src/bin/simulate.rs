//! Offline session with a scripted participant.
//!
//! Usage: simulate [seed] [biased-race] [sessions]
//! Session timing comes from the same env vars as the interactive binary.

use anyhow::{bail, Result};
use biaslab::config::SessionConfig;
use biaslab::logging::{log, obj, v_int, v_str, Domain, Level};
use biaslab::participant::{simulate, ParticipantProfile};
use biaslab::stimulus::{Race, RACES};

fn parse_race(s: &str) -> Result<Race> {
    match RACES.iter().find(|r| r.label().eq_ignore_ascii_case(s)) {
        Some(r) => Ok(*r),
        None => bail!("unknown race {:?}, expected one of White, Black, Asian, Latino", s),
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let seed: u64 = args.first().and_then(|v| v.parse().ok()).unwrap_or(42);
    let profile = match args.get(1).map(String::as_str) {
        None | Some("none") => ParticipantProfile::default(),
        Some(race) => ParticipantProfile::biased(parse_race(race)?),
    };
    let sessions: u64 = args.get(2).and_then(|v| v.parse().ok()).unwrap_or(1);
    let cfg = SessionConfig::from_env();

    for i in 0..sessions {
        let report = simulate(seed + i, cfg.clone(), &profile, Vec::new());
        log(
            Level::Info,
            Domain::Session,
            "simulation.done",
            obj(&[
                ("seed", v_int(report.seed as i64)),
                ("score", v_int(report.score)),
                ("ledger_digest", v_str(&report.ledger_digest)),
            ]),
        );
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
