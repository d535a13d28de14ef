//! Bounded exponential backoff for store calls

use backoff::future::retry_notify;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::fmt::Display;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Errors that can tell whether a retry may help
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for super::StoreError {
    fn is_transient(&self) -> bool {
        super::StoreError::is_transient(self)
    }
}

/// Retry schedule for transient persistence failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Randomization factor applied to each delay, 0 for a fixed schedule
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(25),
            max_backoff: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts; for tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Delay schedule. Attempts are bounded by `max_attempts`, not elapsed time.
    pub fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_interval(self.max_backoff)
            .with_multiplier(self.multiplier.max(1.0))
            .with_randomization_factor(self.jitter.clamp(0.0, 1.0))
            .with_max_elapsed_time(None)
            .build()
    }
}

fn classify<E>(err: E, attempt: u32, max_attempts: u32, what: &str) -> backoff::Error<E>
where
    E: Retryable + Display,
{
    if !err.is_transient() {
        return backoff::Error::permanent(err);
    }
    if attempt >= max_attempts {
        tracing::error!(
            operation = what,
            attempts = attempt,
            error = %err,
            "Store retries exhausted"
        );
        return backoff::Error::permanent(err);
    }
    backoff::Error::transient(err)
}

/// Run `op` until it succeeds, fails permanently, or attempts run out
pub async fn with_backoff<T, E, F>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, E>
where
    E: Retryable + Display,
    F: FnMut() -> Result<T, E>,
{
    let max_attempts = policy.max_attempts.max(1);
    let attempt = AtomicU32::new(0);

    retry_notify(
        policy.schedule(),
        || {
            let n = attempt.fetch_add(1, Ordering::Relaxed) + 1;
            std::future::ready(op().map_err(|e| classify(e, n, max_attempts, what)))
        },
        |err: E, delay: Duration| {
            tracing::warn!(
                operation = what,
                attempt = attempt.load(Ordering::Relaxed),
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient store failure, retrying"
            );
        },
    )
    .await
}
