use std::path::PathBuf;

use anyhow::{Context, Result};
use url::Url;

use crate::deck::DEFAULT_QUOTA;
use crate::engine::events::GRID_SLOTS;
use crate::engine::scheduler::SchedulerConfig;
use crate::retry::RetryConfig;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/";

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Timing and deck parameters for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub duration_secs: u32,
    pub spawn_interval_ms: u64,
    pub visibility_ms: u64,
    pub sweep_interval_ms: u64,
    pub quota_per_cell: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_secs: 60,
            spawn_interval_ms: 1_200,
            visibility_ms: 900,
            sweep_interval_ms: 100,
            quota_per_cell: DEFAULT_QUOTA,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            duration_secs: env_or("GAME_DURATION_SECS", d.duration_secs),
            spawn_interval_ms: env_or("SPAWN_INTERVAL_MS", d.spawn_interval_ms).max(1),
            visibility_ms: env_or("VISIBILITY_MS", d.visibility_ms),
            sweep_interval_ms: env_or("SWEEP_INTERVAL_MS", d.sweep_interval_ms).max(1),
            quota_per_cell: env_or("QUOTA_PER_CELL", d.quota_per_cell),
        }
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            visibility_ms: self.visibility_ms,
            grid_slots: GRID_SLOTS,
        }
    }
}

/// Remote collaborators: image generation and narrative report.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_key: Option<String>,
    pub api_base: Url,
    pub image_model: String,
    pub report_model: String,
    pub cache_path: PathBuf,
    pub asset_dir: PathBuf,
    pub http_timeout_secs: u64,
    pub retry: RetryConfig,
}

impl ServiceConfig {
    /// Fails only on a malformed `API_BASE`.
    pub fn from_env() -> Result<Self> {
        let base = std::env::var("API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let api_base = Url::parse(&base).with_context(|| format!("invalid API_BASE {:?}", base))?;
        let retry_default = RetryConfig::default();
        Ok(Self {
            api_key: std::env::var("API_KEY").ok().filter(|k| !k.trim().is_empty()),
            api_base,
            image_model: std::env::var("IMAGE_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash-image".to_string()),
            report_model: std::env::var("REPORT_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
            cache_path: PathBuf::from(
                std::env::var("ASSET_CACHE_PATH").unwrap_or_else(|_| "./assets.sqlite".to_string()),
            ),
            asset_dir: PathBuf::from(
                std::env::var("ASSET_DIR").unwrap_or_else(|_| "./assets".to_string()),
            ),
            http_timeout_secs: env_or("HTTP_TIMEOUT_SECS", 60),
            retry: RetryConfig {
                max_retries: env_or("RETRY_MAX", retry_default.max_retries),
                base_delay_ms: env_or("RETRY_BASE_MS", retry_default.base_delay_ms),
                max_delay_ms: env_or("RETRY_MAX_MS", retry_default.max_delay_ms),
                jitter_factor: retry_default.jitter_factor,
            },
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_defaults() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.duration_secs, 60);
        assert_eq!(cfg.visibility_ms, 900);
        assert_eq!(cfg.quota_per_cell, 5);
        assert_eq!(cfg.scheduler().visibility_ms, 900);
        assert_eq!(cfg.scheduler().grid_slots, 9);
    }

    #[test]
    fn test_default_api_base_joins_model_path() {
        let url = Url::parse(DEFAULT_API_BASE)
            .unwrap()
            .join("models/gemini-2.5-flash:generateContent")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
