//! Capped exponential backoff used between retry attempts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff with a configurable multiplier and cap. No jitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExponentialBackoff {
    max: Duration,
    multiplier: f64,
    current: Duration,
}

impl ExponentialBackoff {
    /// Creates a new backoff starting at `initial`, growing by `multiplier`, capping at `max`.
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        let initial = initial.min(max);
        Self {
            max,
            multiplier,
            current: initial,
        }
    }

    /// Returns the current backoff duration.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Advances to the next backoff interval, capped at max.
    pub fn next(&mut self) {
        let grown = self.current.as_secs_f64() * self.multiplier.max(0.0);
        self.current = if grown.is_finite() && grown < self.max.as_secs_f64() {
            Duration::from_secs_f64(grown)
        } else {
            self.max
        };
    }
}
