//! Explicit retry policy for provider and LLM calls.
//!
//! Retry behavior is data, not control flow: callers ask the policy whether
//! another attempt is allowed and what to wait, then decide based on their
//! own retryable-error predicate. Delays grow exponentially (×2 per attempt)
//! from `initial_delay`, capped at `max_delay`; a provider-supplied
//! retry-after hint overrides the computed delay, still subject to the cap.

use std::time::Duration;

use crate::config::RetrySettings;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: settings.initial_delay,
            max_delay: settings.max_delay,
        }
    }

    /// Total attempt budget (first call included).
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the retry following failed attempt `attempt` (1-based).
    ///
    /// attempt 1 → initial, attempt 2 → initial×2, attempt 3 → initial×4, …
    /// A `retry_after` hint replaces the computed delay. Both paths are
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(self.max_delay);
        }
        let exponent = attempt.saturating_sub(1).min(16);
        let factor = 1u32 << exponent;
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}
