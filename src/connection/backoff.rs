//! Bounded exponential reconnect backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a transport retries a dropped or failed connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Reconnect attempts before giving up (0 disables reconnection).
    pub max_attempts: u32,
    /// Delay before the first attempt.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay.
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 5_000,
        }
    }
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Whether reconnect attempt `attempt` (1-based) may run.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts
    }

    /// Delay before reconnect attempt `attempt` (1-based):
    /// `min(max_delay, base_delay * 2^(attempt - 1))`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}
