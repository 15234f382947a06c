/// Backoff policy for the sync loop

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff with jitter, bounded in attempts and delay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated before giving up
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Backoff multiplier (exponential backoff)
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// A policy that gives up on the first failure
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_secs(0),
            max_delay: Duration::from_secs(0),
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Delay before retry number `attempt` (1-based). Zero for attempt 0.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::from_secs(0);
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi((attempt - 1) as i32);
        let capped_delay = base_delay.min(self.max_delay.as_secs_f64());

        let jitter = if self.jitter_factor > 0.0 {
            let jitter_amount = capped_delay * self.jitter_factor;
            fastrand::f64() * jitter_amount
        } else {
            0.0
        };

        Duration::from_secs_f64((capped_delay + jitter).min(self.max_delay.as_secs_f64()))
    }

    /// True once `failures` consecutive failures exhaust the policy
    pub fn is_exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }
}

/// Determine if an error may be retried with the same sync state.
///
/// Only client-side timeouts qualify: nothing was mutated and the server may
/// simply have held the poll longer than we waited. Transport failures and
/// protocol mismatches are surfaced.
pub fn should_retry(error: &Error) -> bool {
    match error {
        Error::Timeout(_) => true,

        Error::Transport(_) => false,
        Error::HttpStatus(_) => false,

        // A broken envelope usually means the session is gone
        Error::Protocol(_) => false,

        Error::InvalidState(_) => false,
        Error::Pattern(_) => false,
    }
}
