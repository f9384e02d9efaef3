//! Request admission via a sliding-window rate limiter.
//!
//! The limiter keeps timestamps of admitted requests inside a rolling
//! window (60 seconds by default). Enforcement drops stale stamps, rejects
//! when the remainder is at the limit, and otherwise records the new
//! request. Rejection happens before any other engine state is touched, so
//! overload costs nothing beyond the check itself.
//!
//! After admission the number of in-window timestamps never exceeds the
//! configured limit.

use std::collections::VecDeque;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::error::EngineError;

/// Sliding-window rate limiter, first gate of the decision sequence.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: std::time::Duration,
    stamps: VecDeque<Instant>,
}

impl RateLimiter {
    /// Creates a limiter from engine policy.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            max_requests: config.rate_limit_per_window,
            window: config.rate_window,
            stamps: VecDeque::new(),
        }
    }

    /// Admits or rejects a request arriving now.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RateLimitExceeded`] when the window is full.
    /// No state is recorded for a rejected request.
    pub fn enforce(&mut self) -> Result<(), EngineError> {
        self.enforce_at(Instant::now())
    }

    /// Admits or rejects a request arriving at `now`.
    ///
    /// Split out from [`enforce`](Self::enforce) so tests can drive the
    /// clock instead of sleeping through real windows.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RateLimitExceeded`] when the window is full.
    pub fn enforce_at(&mut self, now: Instant) -> Result<(), EngineError> {
        // No cutoff exists when the window reaches past the monotonic
        // clock's epoch; nothing can be stale in that case.
        let cutoff = now.checked_sub(self.window);
        while let Some(&oldest) = self.stamps.front() {
            if !cutoff.is_some_and(|cutoff| oldest <= cutoff) {
                break;
            }
            self.stamps.pop_front();
        }

        if self.stamps.len() >= self.max_requests as usize {
            tracing::warn!(
                in_window = self.stamps.len(),
                max = self.max_requests,
                "rate limit exceeded"
            );
            return Err(EngineError::RateLimitExceeded {
                limit: self.max_requests,
                window_secs: self.window.as_secs(),
            });
        }

        self.stamps.push_back(now);
        Ok(())
    }

    /// Number of requests currently inside the window.
    #[must_use]
    pub fn in_window(&self) -> usize {
        self.stamps.len()
    }
}
