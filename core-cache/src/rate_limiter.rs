//! Sliding-window admission control for remote calls
//!
//! Every admitted call records its timestamp. A call is admitted when fewer
//! than `max_requests` timestamps fall inside the trailing window; otherwise
//! it waits until the oldest one ages out. Stale timestamps are pruned on the
//! next check. Waiters are not ordered.

use crate::config::RateLimitConfig;
use crate::error::{CacheError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct RateLimiter {
    config: RateLimitConfig,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            admitted: Mutex::new(VecDeque::with_capacity(config.max_requests as usize)),
            config,
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Wait for capacity, then record the call.
    ///
    /// Fails with [`CacheError::RateLimited`] when no capacity can free up
    /// within `max_wait`, and with [`CacheError::Cancelled`] if `cancel`
    /// fires while waiting.
    pub async fn check_rate_limit(&self, cancel: &CancellationToken) -> Result<()> {
        if self.config.max_requests == 0 {
            warn!("Rate limiter admits no requests; rejecting call");
            return Err(self.rejection());
        }

        // A wait too long to represent has no deadline
        let deadline = Instant::now().checked_add(self.config.max_wait);

        loop {
            if cancel.is_cancelled() {
                return Err(CacheError::Cancelled);
            }

            let wait = match self.try_acquire(Instant::now()) {
                None => return Ok(()),
                Some(wait) => wait,
            };

            let past_deadline = match (deadline, Instant::now().checked_add(wait)) {
                (Some(deadline), Some(ready_at)) => ready_at > deadline,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if past_deadline {
                warn!(
                    wait_ms = wait.as_millis() as u64,
                    "Rate limit wait exceeds the allowed maximum"
                );
                return Err(self.rejection());
            }

            debug!(wait_ms = wait.as_millis() as u64, "Rate limited; waiting for capacity");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CacheError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Calls admitted within the trailing window.
    pub fn admitted_in_window(&self) -> usize {
        let mut admitted = self.admitted.lock();
        self.prune(&mut admitted, Instant::now());
        admitted.len()
    }

    /// Admit at `now` if capacity exists, else return how long until it will.
    fn try_acquire(&self, now: Instant) -> Option<Duration> {
        let mut admitted = self.admitted.lock();
        self.prune(&mut admitted, now);

        if admitted.len() < self.config.max_requests as usize {
            admitted.push_back(now);
            return None;
        }

        let oldest = admitted.front().copied().unwrap_or(now);
        Some((oldest + self.config.window).saturating_duration_since(now))
    }

    fn prune(&self, admitted: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = admitted.front() {
            if now.saturating_duration_since(oldest) >= self.config.window {
                admitted.pop_front();
            } else {
                break;
            }
        }
    }

    fn rejection(&self) -> CacheError {
        CacheError::RateLimited {
            max_requests: self.config.max_requests,
            window_ms: self.config.window.as_millis() as u64,
            max_wait_ms: self.config.max_wait.as_millis() as u64,
        }
    }
}
