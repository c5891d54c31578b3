//! Retry coordination: backoff delays and attempt limits.
//!
//! Delays grow exponentially from a base delay, are capped at a maximum and
//! carry ±`jitter` randomization so that requests that failed together do not
//! resend together. The same policy drives reconnection.

use crate::config::RetryConfig;

use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    base: Duration,
    multiplier: f64,
    max: Duration,
    jitter: f64,
}

impl RetryPolicy {
    pub fn new(base: Duration, multiplier: f64, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            multiplier,
            max,
            jitter,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            config.multiplier,
            Duration::from_millis(config.max_delay_ms),
            config.jitter,
        )
    }

    /// Delay before attempt `attempt + 1`, before jitter.
    ///
    /// Attempt numbering starts at 1; attempt 0 is treated as 1. A multiplier
    /// that produces a negative or non-finite delay yields zero or the cap.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max.as_secs_f64()).max(0.0);
        Duration::try_from_secs_f64(capped).unwrap_or(self.max)
    }

    /// Jittered delay to wait after attempt `attempt` failed.
    ///
    /// The result lies within `base_delay(attempt) * (1 ± jitter)`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let interval = self.base_delay(attempt);
        let mut backoff = ExponentialBackoff {
            current_interval: interval,
            initial_interval: self.base,
            randomization_factor: self.jitter,
            multiplier: self.multiplier,
            max_interval: self.max,
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.next_backoff().unwrap_or(interval)
    }

    pub fn should_retry(attempt: u32, max_attempts: u32) -> bool {
        attempt < max_attempts
    }

    /// Stateful backoff for the reconnect loop; never gives up.
    pub fn reconnect_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.base,
            initial_interval: self.base,
            randomization_factor: self.jitter,
            multiplier: self.multiplier,
            max_interval: self.max,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
