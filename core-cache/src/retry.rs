//! Exponential backoff for transient remote failures

use crate::error::{Cancelled, CacheError, Result};
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry settings.
///
/// The delay before attempt `n` (n >= 2) is `base_delay * 2^(n-1)`, clamped
/// to `max_delay` when set, then scaled by a random factor in
/// `[1 - jitter, 1 + jitter]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first (default: 3)
    pub max_attempts: u32,

    /// Delay unit for the backoff (default: 250ms)
    pub base_delay: Duration,

    /// Ceiling for one delay (default: 10s)
    pub max_delay: Option<Duration>,

    /// Jitter fraction in `[0.0, 1.0)` (default: 0.1)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Some(Duration::from_secs(10)),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Self::default()
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_max_delay(mut self, max_delay: Option<Duration>) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(CacheError::InvalidArgument(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.jitter) {
            return Err(CacheError::InvalidArgument(format!(
                "jitter must be in [0.0, 1.0), got {}",
                self.jitter
            )));
        }

        Ok(())
    }

    /// Delay before `attempt` without jitter; zero for the first attempt.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let delay = 2u32
            .checked_pow(attempt - 1)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX);

        match self.max_delay {
            Some(ceiling) => delay.min(ceiling),
            None => delay,
        }
    }

    /// Delay before `attempt` with jitter applied.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff_for(attempt);
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }

        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(delay)
    }
}

impl From<&core_runtime::RemoteCallConfig> for RetryPolicy {
    fn from(remote: &core_runtime::RemoteCallConfig) -> Self {
        Self {
            max_attempts: remote.max_attempts,
            base_delay: remote.base_delay,
            max_delay: remote.max_delay,
            jitter: remote.jitter,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out.
///
/// Only errors for which `is_transient` returns `true` are retried. The last
/// error is returned unchanged. Cancelling `cancel` aborts the in-flight
/// attempt or the backoff sleep and yields `E::from(Cancelled)`; no further
/// attempt is made.
pub async fn with_retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    is_transient: P,
    mut operation: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    P: Fn(&E) -> bool,
    E: From<Cancelled> + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        if cancel.is_cancelled() {
            return Err(Cancelled.into());
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled.into()),
            outcome = operation() => outcome,
        };

        let error = match outcome {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if attempt >= max_attempts || !is_transient(&error) {
            return Err(error);
        }

        attempt += 1;
        let delay = policy.delay_for(attempt);
        warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Transient failure; retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled.into()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
