//! Retry state machine for upstream calls.
//!
//! One [`RetryState`] lives for the duration of a single upstream fetch. After
//! every failed attempt the client asks it for a [`RetryDecision`]; the state
//! decides from the error's retry class, the attempt budget and any
//! `Retry-After` hint. Sleeping is left to the caller.

use std::time::Duration;

use insights_shared::{InsightsError, RetryClass};
use rand::Rng;

/// Backoff settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Randomize each delay into `[delay / 2, delay]`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay after the given 1-based failed attempt:
    /// `base * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// What to do after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the delay, then try again.
    Retry(Duration),
    /// Surface the error.
    GiveUp,
}

/// Attempt bookkeeping for one upstream call.
#[derive(Debug)]
pub struct RetryState {
    policy: RetryPolicy,
    attempts: u32,
    total_backoff: Duration,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            total_backoff: Duration::ZERO,
        }
    }

    /// Record a failed attempt and decide whether to try again.
    pub fn on_failure(&mut self, error: &InsightsError) -> RetryDecision {
        self.attempts = self.attempts.saturating_add(1);

        if error.retry_class() == RetryClass::Never || self.attempts >= self.policy.max_attempts {
            return RetryDecision::GiveUp;
        }

        let delay = match error.retry_after() {
            Some(hint) => hint.min(self.policy.max_delay),
            None => self.jittered(self.policy.backoff_for(self.attempts)),
        };

        self.total_backoff = self.total_backoff.saturating_add(delay);
        RetryDecision::Retry(delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if !self.policy.jitter || delay.is_zero() {
            return delay;
        }
        let ceiling = delay.as_millis().min(u128::from(u64::MAX)) as u64;
        let millis = rand::thread_rng().gen_range(ceiling / 2..=ceiling);
        Duration::from_millis(millis)
    }

    /// Failed attempts recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Sum of all delays handed out.
    pub fn total_backoff(&self) -> Duration {
        self.total_backoff
    }
}
