use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconnection backoff policy for a persistent venue connection.
///
/// The delay grows exponentially from `backoff_ms_initial` up to
/// `backoff_ms_max`, with a random jitter in `[0, jitter_ms]` added to each
/// attempt. A successful connection resets the sequence.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, Constructor,
)]
pub struct BackoffPolicy {
    /// Backoff duration after the first disconnection, in milliseconds.
    pub backoff_ms_initial: u64,

    /// Scaling factor applied after each failed reconnection attempt.
    pub backoff_multiplier: u8,

    /// Maximum possible backoff duration between attempts, in milliseconds.
    pub backoff_ms_max: u64,

    /// Random jitter in milliseconds added on top of the calculated backoff.
    pub jitter_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            backoff_ms_initial: 1_000,
            backoff_multiplier: 2,
            backoff_ms_max: 30_000,
            jitter_ms: 250,
        }
    }
}

/// Mutable backoff state tracking the current delay within a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffState {
    policy: BackoffPolicy,
    backoff_ms_current: u64,
}

impl From<BackoffPolicy> for BackoffState {
    fn from(policy: BackoffPolicy) -> Self {
        Self {
            backoff_ms_current: policy.backoff_ms_initial,
            policy,
        }
    }
}

impl BackoffState {
    /// Reset to the initial backoff after a successful connection.
    pub fn reset(&mut self) {
        self.backoff_ms_current = self.policy.backoff_ms_initial;
    }

    /// Current delay without jitter, in milliseconds.
    pub fn current_ms(&self) -> u64 {
        self.backoff_ms_current
    }

    /// Generate the sleep duration for the next attempt and advance the
    /// exponential sequence.
    pub fn next_delay(&mut self) -> Duration {
        let jitter = if self.policy.jitter_ms > 0 {
            use rand::Rng;
            rand::rng().random_range(0..=self.policy.jitter_ms)
        } else {
            0
        };

        let delay = Duration::from_millis(self.backoff_ms_current + jitter);

        let next = self
            .backoff_ms_current
            .saturating_mul(self.policy.backoff_multiplier as u64);
        self.backoff_ms_current = std::cmp::min(next, self.policy.backoff_ms_max);

        delay
    }
}
