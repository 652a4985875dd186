//! Reveal-rate tuning for the text animator.
//!
//! The rate is proportional to the backlog (so bursty arrival catches up
//! quickly) but bounded, and it eases out over the last few characters so a
//! finished stream decelerates instead of stopping abruptly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default tick interval in milliseconds.
const DEFAULT_INTERVAL_MS: u64 = 10;

/// Default lower bound on characters revealed per tick.
const DEFAULT_MIN_CHARS: usize = 10;

/// Default upper bound on characters revealed per tick.
const DEFAULT_MAX_CHARS: usize = 30;

/// Backlog divisor used to derive the proportional factor.
const BACKLOG_DIVISOR: usize = 10;

/// Tuning values for the streaming text animation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Delay between ticks while there is text to reveal.
    pub interval_ms: u64,
    /// Minimum characters revealed per tick (before easing).
    pub min_chars_per_interval: usize,
    /// Maximum characters revealed per tick.
    pub max_chars_per_interval: usize,
    /// Backlog size at or below which the reveal eases out.
    /// `None` means `2 * max_chars_per_interval`.
    pub easing_threshold_chars: Option<usize>,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            min_chars_per_interval: DEFAULT_MIN_CHARS,
            max_chars_per_interval: DEFAULT_MAX_CHARS,
            easing_threshold_chars: None,
        }
    }
}

impl AnimationConfig {
    /// Interval between ticks while revealing.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Interval used while caught up and waiting for more data.
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.saturating_mul(2))
    }

    /// Backlog size at which easing starts.
    pub fn easing_threshold(&self) -> usize {
        self.easing_threshold_chars
            .unwrap_or_else(|| self.max_chars_per_interval.saturating_mul(2))
    }

    /// Number of characters to reveal on a tick with `remaining` characters
    /// still hidden. Never exceeds `remaining`; zero only when `remaining` is.
    pub fn chars_for_tick(&self, remaining: usize) -> usize {
        if remaining == 0 {
            return 0;
        }

        // min/max may be misconfigured; clamp() would panic on min > max
        let lo = self.min_chars_per_interval.min(self.max_chars_per_interval);
        let hi = self.max_chars_per_interval.max(lo);

        let factor = (remaining / BACKLOG_DIVISOR).max(1);
        let base = remaining.min(factor.clamp(lo, hi));

        let threshold = self.easing_threshold();
        let eased = if threshold > 0 && remaining <= threshold {
            let slowdown = (remaining as f64 / threshold as f64).sqrt();
            let scaled = (base as f64 * slowdown).ceil() as usize;
            scaled.min(base).max(1)
        } else {
            base
        };

        eased.min(remaining)
    }
}
