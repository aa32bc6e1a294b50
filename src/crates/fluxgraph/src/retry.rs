//! Exponential backoff for the Node Runner's attempt loop (§4.4).
//!
//! Delay before attempt `k+1` is `base * factor^(k-1)`, capped at
//! `max_delay`. Backoff applies only between attempts, never before the
//! first. Unlike the teacher crate's `RetryPolicy`, this has no jitter
//! field — the specification pins the formula exactly, and jittering it
//! would make the documented scenario timings in SPEC_FULL §8.2 untestable.

use std::time::Duration;

/// Backoff schedule used between failed attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: f64,
    pub factor: f64,
    pub max_delay_sec: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: 2.0,
            factor: 2.0,
            max_delay_sec: 60.0,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: f64, factor: f64, max_delay_sec: f64) -> Self {
        Self {
            base,
            factor,
            max_delay_sec,
        }
    }

    /// Delay before retry attempt `k+1`, where `k` is the 1-indexed attempt
    /// number that just failed (`k = 1` is the delay before the second
    /// attempt). `delay(k) = base * factor^(k-1)`, capped at `max_delay_sec`.
    pub fn delay_for(&self, failed_attempt: usize) -> Duration {
        debug_assert!(failed_attempt >= 1);
        let exponent = (failed_attempt - 1) as i32;
        let raw = self.base * self.factor.powi(exponent);
        Duration::from_secs_f64(raw.min(self.max_delay_sec).max(0.0))
    }
}
