//! Timeout and retry helpers
//!
//! The session core never retries on its own. [`with_timeout`] bounds the
//! suspension points of a negotiation, and [`retry_with_backoff`] is offered
//! to hosts that want to re-run `connect` after a recoverable failure.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::error::{SessionError, SessionResult};

/// Backoff policy for [`retry_with_backoff`]
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Spread delays by +/-10%
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        let next_ms = (delay.as_millis() as f64 * self.backoff_multiplier) as u64;
        Duration::from_millis(next_ms).min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.use_jitter {
            return delay;
        }
        let jitter = (rand::random::<f64>() - 0.5) * 0.2;
        Duration::from_millis((delay.as_millis() as f64 * (1.0 + jitter)) as u64)
    }
}

/// Run `operation` until it succeeds, fails unrecoverably, or attempts run out
pub async fn retry_with_backoff<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    mut operation: F,
) -> SessionResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SessionResult<T>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;
        debug!(operation = operation_name, attempt, max_attempts = config.max_attempts, "Attempting operation");

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Operation succeeded after retries");
                }
                return Ok(value);
            }
            Err(e) if e.is_recoverable() && attempt < config.max_attempts => {
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %e,
                    category = e.category(),
                    next_delay_ms = delay.as_millis() as u64,
                    "Recoverable error, will retry"
                );
                sleep(config.jittered(delay)).await;
                delay = config.next_delay(delay);
            }
            Err(e) => {
                error!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %e,
                    category = e.category(),
                    "Operation failed"
                );
                return Err(e);
            }
        }
    }
}

/// Bound `future` by `timeout`, reporting expiry as a negotiation timeout at `stage`
pub async fn with_timeout<T, F>(stage: &str, timeout: Duration, future: F) -> SessionResult<T>
where
    F: Future<Output = SessionResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            error!(stage, timeout_ms = timeout.as_millis() as u64, "Operation timed out");
            Err(SessionError::NegotiationTimeout {
                stage: stage.to_string(),
                duration_ms: timeout.as_millis() as u64,
            })
        }
    }
}
