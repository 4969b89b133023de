//! Supervised reconnect policy.
//!
//! Peers reconnect to the relay through an explicit, bounded schedule instead
//! of a self-rescheduling timer: a fixed number of attempts with exponential
//! backoff capped at a maximum delay. The policy is pure data — the transport
//! layer sleeps on the durations it yields and stops iterating on success.

use std::time::Duration;

/// Bounded exponential-backoff schedule for reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total connection attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the second attempt (the first runs immediately).
    pub initial_backoff: Duration,
    /// Ceiling applied to the doubled delays.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Backoff before attempt `attempt` (zero-based). Attempt 0 runs
    /// immediately; each later attempt doubles the delay up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let doubled = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt - 1));
        doubled.min(self.max_backoff)
    }

    /// The full schedule: one backoff per attempt, `max_attempts` long.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts).map(|attempt| self.backoff(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
