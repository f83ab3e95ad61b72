//! Backoff schedule for connection bring-up.

use rand::Rng;
use serde::Serialize;
use std::time::Duration;

/// Connect-with-retry tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RetrySettings {
    /// Retries after the first attempt; total attempts is `max_retries + 1`
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetrySettings {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// `min(current * multiplier, max_backoff)`
    pub fn next_backoff(&self, current: Duration) -> Duration {
        let scaled = current.as_secs_f64() * self.multiplier.max(1.0);
        if !scaled.is_finite() || scaled >= self.max_backoff.as_secs_f64() {
            return self.max_backoff;
        }
        Duration::from_secs_f64(scaled)
    }
}

/// Uniform random duration in `[0, min(base, max)]`; zero for a zero base.
pub fn full_jitter(base: Duration, max: Duration) -> Duration {
    let cap = base.min(max);
    if cap.is_zero() {
        return Duration::ZERO;
    }
    let nanos = u64::try_from(cap.as_nanos()).unwrap_or(u64::MAX);
    Duration::from_nanos(rand::thread_rng().gen_range(0..=nanos))
}
