//! Retry policy and request pacing
//!
//! One policy object drives every retry decision: how many attempts a URL
//! gets, how long to wait after each failed attempt, and the jittered
//! pause before each fetch.

use crate::config::CrawlerConfig;
use rand::Rng;
use std::time::Duration;

/// Upper bound on a single backoff delay
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Exponential backoff with a fixed retry budget
///
/// `retry_count` counts retries, not attempts. With `retry_count = 3` and a
/// one second base delay a URL is fetched up to four times, waiting 1, 2
/// and 4 seconds between attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retry_count: u32,

    /// Delay after the first failed attempt
    pub base_delay: Duration,

    /// Growth factor per failed attempt
    pub multiplier: f64,

    /// Base pause before every fetch, jittered ×[0.8, 1.2)
    pub rate_limit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            retry_count: config.retry_count,
            base_delay: config.retry_delay_duration(),
            multiplier: config.backoff_multiplier,
            rate_limit: config.rate_limit_duration(),
        }
    }

    /// Total attempts a URL gets
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    /// Returns true if another attempt follows failed attempt `attempt`
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.retry_count
    }

    /// Delay after failed attempt `attempt` (0-based): `base × multiplier^attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(30) as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= MAX_BACKOFF.as_secs_f64() {
            return MAX_BACKOFF;
        }
        Duration::from_secs_f64(secs)
    }

    /// Pause before a fetch: `rate_limit × U[0.8, 1.2)`
    pub fn pacing_delay(&self) -> Duration {
        jittered(self.rate_limit, &mut rand::thread_rng())
    }
}

/// Scales `base` by a factor drawn from [0.8, 1.2)
pub fn jittered<R: Rng + ?Sized>(base: Duration, rng: &mut R) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }
    base.mul_f64(rng.gen_range(0.8..1.2))
}

/// Draws a pause uniformly from `[min, max]`
pub fn uniform_between<R: Rng + ?Sized>(min: Duration, max: Duration, rng: &mut R) -> Duration {
    if max <= min {
        return min;
    }
    let millis = rng.gen_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(millis)
}
