use std::time::Duration;

use super::RetryStrategy;
use crate::config::RetryPolicy;
use crate::envelope::Envelope;

/// Exponential backoff: `delay * multiplier^retry_count`, capped at
/// `max_delay` when that is non-zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiplierRetryStrategy {
    policy: RetryPolicy,
}

impl MultiplierRetryStrategy {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delay in milliseconds before retry number `retry_count + 1`.
    pub fn delay_for(&self, retry_count: u32) -> u64 {
        let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
        let raw = self.policy.delay as f64 * self.policy.multiplier.powi(exponent);
        // `as` saturates at u64::MAX and maps NaN to 0.
        let delay = raw as u64;

        if self.policy.max_delay > 0 {
            delay.min(self.policy.max_delay)
        } else {
            delay
        }
    }
}

impl RetryStrategy for MultiplierRetryStrategy {
    fn is_retryable(&self, envelope: &Envelope) -> bool {
        envelope.retry_count() < self.policy.max_retries
    }

    fn wait_time(&self, envelope: &Envelope) -> Duration {
        Duration::from_millis(self.delay_for(envelope.retry_count()))
    }
}
