//! Exponential backoff between failed worker cycles.

use std::time::Duration;

/// Doubling delay, capped at `max`, reset to `base` after a good cycle.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
        }
    }

    /// Delay to sleep after this failure. Grows the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }

    /// What the next failure would sleep.
    pub fn current(&self) -> Duration {
        self.current
    }
}
