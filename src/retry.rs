use std::future::Future;

use anyhow::{anyhow, Result};
use rand::Rng;
use tokio::time::{sleep, Duration};

use crate::logging::{log, obj, v_int, v_str, Domain, Level};

/// Backoff settings for remote collaborator calls.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            jitter_factor: 0.3,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff, clamped, then jittered by ±jitter_factor.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64 * 2.0_f64.powi(attempt as i32);
        let clamped = base.min(self.max_delay_ms as f64);
        let spread = clamped * self.jitter_factor;
        let jitter = if spread > 0.0 {
            rand::thread_rng().gen_range(-spread..=spread)
        } else {
            0.0
        };
        Duration::from_millis((clamped + jitter).max(0.0) as u64)
    }
}

/// Error carrying the HTTP status so the retry loop can give up early on 4xx.
#[derive(Debug, thiserror::Error)]
#[error("{service} returned HTTP {status}: {body}")]
pub struct HttpStatusError {
    pub service: &'static str,
    pub status: u16,
    pub body: String,
}

/// Context marker for failures another attempt cannot fix.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct PermanentError(pub &'static str);

/// Tag `err` so [`retry_async`] gives up on it immediately.
pub fn permanent(err: impl Into<anyhow::Error>, what: &'static str) -> anyhow::Error {
    err.into().context(PermanentError(what))
}

pub fn is_permanent(err: &anyhow::Error) -> bool {
    if err.downcast_ref::<PermanentError>().is_some() {
        return true;
    }
    err.downcast_ref::<HttpStatusError>()
        .map(|e| !is_retryable_http_error(e.status))
        .unwrap_or(false)
}

pub async fn retry_async<F, Fut, T>(
    config: &RetryConfig,
    domain: Domain,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error: Option<anyhow::Error> = None;

    for attempt in 0..=config.max_retries {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if is_permanent(&e) {
                    return Err(e);
                }
                if attempt < config.max_retries {
                    let delay = config.delay_for_attempt(attempt);
                    log(
                        Level::Warn,
                        domain,
                        "retry",
                        obj(&[
                            ("operation", v_str(operation_name)),
                            ("attempt", v_int(attempt as i64 + 1)),
                            ("of", v_int(config.max_retries as i64 + 1)),
                            ("delay_ms", v_int(delay.as_millis() as i64)),
                            ("error", v_str(&e.to_string())),
                        ]),
                    );
                    sleep(delay).await;
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow!("{} exhausted retries without error", operation_name)))
}

pub fn is_retryable_http_error(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

pub fn is_retryable_network_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
