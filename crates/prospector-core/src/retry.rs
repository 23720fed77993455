//! Bounded retry with linear backoff.
//!
//! Delay schedule for `base_delay = 1s`, `max_attempts = 3`:
//!
//! ```text
//! attempt 1 --fail--> sleep 1s --> attempt 2 --fail--> sleep 2s --> attempt 3 --fail--> last error
//! ```

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::Retryable;

/// State of one retried invocation. Lives only for the duration of [`RetryPolicy::run`].
#[derive(Debug)]
pub struct RetryContext {
    /// Attempts made so far (1-indexed once the first attempt starts).
    pub attempt: u32,
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryContext {
    fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 0,
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay,
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-indexed).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Re-runs a fallible async operation on retryable failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> RetryConfig {
        self.config
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` attempts have failed. The final error is returned as-is.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut ctx = RetryContext::new(&self.config);

        loop {
            ctx.attempt += 1;
            match operation().await {
                Ok(value) => {
                    if ctx.attempt > 1 {
                        tracing::info!(attempt = ctx.attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    tracing::debug!(attempt = ctx.attempt, error = %e, "Non-retryable failure");
                    return Err(e);
                }
                Err(e) => {
                    if ctx.exhausted() {
                        tracing::warn!(
                            attempts = ctx.attempt,
                            error = %e,
                            "Giving up after {} attempts",
                            ctx.attempt
                        );
                        return Err(e);
                    }
                    let delay = ctx.delay_after(ctx.attempt);
                    tracing::warn!(
                        attempt = ctx.attempt,
                        max_attempts = ctx.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
