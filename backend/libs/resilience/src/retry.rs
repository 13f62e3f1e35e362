//! Retry policy with exponential backoff and jitter
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Classifies an error as transient (worth another attempt) or fatal.
///
/// Implementors decide which failures are connectivity noise; everything
/// else short-circuits the retry loop on the first attempt.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (total attempts = max_retries + 1)
    pub max_retries: u32,
    /// Base delay before the first retry
    pub initial_backoff: Duration,
    /// Cap applied to the base delay before jitter
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Upper bound of the random extra delay, as a fraction of the base delay
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_ratio: 0.5,
        }
    }
}

impl RetryConfig {
    /// Base delay after the failed attempt `attempt` (0-indexed), without jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let millis = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(millis.min(self.max_backoff.as_millis() as f64) as u64)
    }

    /// Delay actually slept after attempt `attempt`: base plus `[0, jitter_ratio]` of base.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        apply_jitter(self.base_delay(attempt), self.jitter_ratio)
    }
}

/// Execute a future with retry logic.
///
/// Non-transient errors are returned after the first attempt. When retries
/// are exhausted the error from the last attempt is returned as-is.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let mut attempt: u32 = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_transient() => {
                debug!(error = %e, "Non-transient failure, not retrying");
                return Err(e);
            }
            Err(e) if attempt >= config.max_retries => {
                warn!(
                    max_retries = config.max_retries,
                    error = %e,
                    "Max retries reached"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = config.delay_for_attempt(attempt);
                attempt += 1;

                warn!(
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn apply_jitter(base: Duration, jitter_ratio: f64) -> Duration {
    // NaN and infinite ratios would make the sampled range invalid
    if !jitter_ratio.is_finite() || jitter_ratio <= 0.0 {
        return base;
    }
    let mut rng = rand::thread_rng();
    let jitter_factor = 1.0 + rng.gen_range(0.0..=jitter_ratio);
    Duration::from_millis((base.as_millis() as f64 * jitter_factor) as u64)
}
