use crate::config::FormLoginOptions;
use rand::RngExt;
use std::time::Duration;

/// HTTP statuses worth another navigation attempt.
pub const RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Exponential backoff with proportional jitter, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    pub fn from_options(options: &FormLoginOptions) -> Self {
        Self {
            max_retries: options.max_navigation_retries,
            base: Duration::from_millis(options.backoff_base_ms),
            cap: Duration::from_millis(options.backoff_max_ms),
        }
    }

    /// Delay before retry number `attempt` (0-based), with random jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential = self.exponential_ms(attempt);
        let jitter = match exponential / 4 {
            0 => 0,
            max => rand::rng().random_range(0..=max),
        };
        self.delay_with_jitter(attempt, jitter)
    }

    /// `min(base * 2^attempt + jitter_ms, cap)`.
    pub fn delay_with_jitter(&self, attempt: u32, jitter_ms: u64) -> Duration {
        let total = self.exponential_ms(attempt).saturating_add(jitter_ms);
        Duration::from_millis(total.min(self.cap.as_millis() as u64))
    }

    fn exponential_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        (self.base.as_millis() as u64).saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_options(&FormLoginOptions::default())
    }
}
