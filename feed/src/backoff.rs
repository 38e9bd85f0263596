//! Exponential backoff between change feed reconnection attempts.

use std::time::Duration;

// 2^16 * base already exceeds any sensible cap.
const MAX_EXPONENT: u32 = 16;

/// Delays grow as `base * 2^attempt`, capped at `max_delay`, and start over
/// once the feed is streaming again. A zero base retries immediately.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_delay: Duration,
    max_delay: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            attempts: 0,
        }
    }

    /// Reconnect immediately every time.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Delay to wait before the next attempt; each call counts as one failure.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.exponential_delay(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Forget previous failures.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn exponential_delay(&self, n_attempts: u32) -> Duration {
        let factor = 1_u32 << n_attempts.min(MAX_EXPONENT);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), Duration::from_secs(30))
    }
}
