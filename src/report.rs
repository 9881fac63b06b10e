//! Narrative analysis of a finished session.
//!
//! The reporter never sees the session itself, only [`GameStats`], and it always
//! returns text: failures map to fixed fallback messages.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::assets::remote::GenAiClient;
use crate::config::ServiceConfig;
use crate::logging::{log, log_degraded, obj, v_int, Domain, Level};
use crate::metrics::GameStats;

pub const MISSING_KEY_TEXT: &str = "API Key missing. Unable to generate AI analysis.";
pub const EMPTY_TEXT: &str = "Analysis generation failed.";
pub const ERROR_TEXT: &str = "An error occurred while generating the psychological report.";

#[async_trait]
pub trait NarrativeReporter {
    async fn analyze(&self, stats: &GameStats) -> String;
}

pub fn build_prompt(stats: &GameStats) -> String {
    let mut p = String::new();
    p.push_str(
        "You are an expert cognitive psychologist specializing in implicit bias and the \
         \"Shooter Bias\" paradigm.\nAnalyze the following game statistics from a user's session.\n\n\
         The user played a \"Whac-A-Mole\" style game where they had to shoot targets holding guns \
         and spare targets holding phones/wallets.\n\nData:\n",
    );
    let _ = writeln!(p, "- Total Trials: {}", stats.total_trials);
    let _ = writeln!(p, "- Overall Accuracy: {:.1}%", stats.accuracy * 100.0);
    let _ = writeln!(p, "- Average Reaction Time: {:.0}ms", stats.avg_reaction_time);
    p.push_str("\nBias Breakdown by Category:\n");
    for m in &stats.bias_data {
        let _ = writeln!(p, "- Category: {}", m.category);
        let _ = writeln!(p, "  - Avg RT (Threats): {:.0}ms", m.avg_reaction_time_threat);
        let _ = writeln!(p, "  - Avg RT (Non-Threats): {:.0}ms", m.avg_reaction_time_non_threat);
        let _ = writeln!(
            p,
            "  - False Alarm Rate (Shot Innocent): {:.1}%",
            m.error_rate_false_alarm * 100.0
        );
    }
    p.push_str(
        "\nPlease provide a concise, 3-paragraph analysis:\n\
         1. Overall performance summary (fast vs slow, impulsive vs cautious).\n\
         2. Identify any significant disparities in Reaction Time or Error Rates between groups \
         (Race/Attire) that might suggest implicit bias. Be scientific and objective.\n\
         3. A brief disclaimer that this is a game and not a clinical diagnosis, followed by one \
         tip for reducing implicit bias.\n",
    );
    p
}

pub struct GeminiReporter {
    client: Option<GenAiClient>,
    model: String,
}

impl GeminiReporter {
    pub fn from_config(cfg: &ServiceConfig) -> Result<Self> {
        Ok(Self {
            client: GenAiClient::from_config(cfg)?,
            model: cfg.report_model.clone(),
        })
    }
}

#[async_trait]
impl NarrativeReporter for GeminiReporter {
    async fn analyze(&self, stats: &GameStats) -> String {
        let Some(client) = &self.client else {
            return MISSING_KEY_TEXT.to_string();
        };
        match client.generate_text(&self.model, &build_prompt(stats)).await {
            Ok(Some(text)) => {
                log(
                    Level::Info,
                    Domain::Report,
                    "report.generated",
                    obj(&[("chars", v_int(text.len() as i64))]),
                );
                text
            }
            Ok(None) => EMPTY_TEXT.to_string(),
            Err(err) => {
                log_degraded(Domain::Report, "narrative report", &format!("{:#}", err));
                ERROR_TEXT.to_string()
            }
        }
    }
}

/// Plain summary computed locally. Deterministic for a given `GameStats`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineReporter;

#[async_trait]
impl NarrativeReporter for OfflineReporter {
    async fn analyze(&self, stats: &GameStats) -> String {
        if stats.total_trials == 0 {
            return "No completed trials; nothing to analyze.".to_string();
        }
        let mut out = format!(
            "{} trials, {:.1}% correct, mean hit reaction {:.0}ms.",
            stats.total_trials,
            stats.accuracy * 100.0,
            stats.avg_reaction_time
        );

        let worst = stats
            .bias_data
            .iter()
            .filter(|m| m.error_rate_false_alarm > 0.0)
            // first category wins ties
            .reduce(|best, m| {
                if m.error_rate_false_alarm > best.error_rate_false_alarm {
                    m
                } else {
                    best
                }
            });
        match worst {
            Some(m) => {
                let _ = write!(
                    out,
                    " Highest false alarm rate: {} at {:.1}%.",
                    m.category,
                    m.error_rate_false_alarm * 100.0
                );
            }
            None => out.push_str(" No unarmed targets were shot."),
        }
        out.push_str(" This is a game, not a clinical assessment.");
        out
    }
}

/// Run the reporter off the session task.
pub fn spawn_report(
    reporter: Arc<dyn NarrativeReporter + Send + Sync>,
    stats: GameStats,
) -> JoinHandle<String> {
    tokio::spawn(async move { reporter.analyze(&stats).await })
}
