//! Retry Policy Engine - decides whether and when a failed message is retried.
//!
//! Delays are returned, never slept on: the caller requeues the envelope
//! with a `Delay` stamp and moves on.

mod multiplier;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub use multiplier::MultiplierRetryStrategy;

use crate::envelope::Envelope;

/// Per-transport retry decision.
pub trait RetryStrategy: Send + Sync {
    /// Whether the envelope may be retried once more.
    fn is_retryable(&self, envelope: &Envelope) -> bool;

    /// Delay before the next attempt.
    fn wait_time(&self, envelope: &Envelope) -> Duration;
}

/// Transport name → retry strategy.
#[derive(Clone, Default)]
pub struct RetryStrategyLocator {
    strategies: HashMap<String, Arc<dyn RetryStrategy>>,
}

impl RetryStrategyLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, transport: impl Into<String>, strategy: Arc<dyn RetryStrategy>) {
        self.strategies.insert(transport.into(), strategy);
    }

    pub fn get(&self, transport: &str) -> Option<Arc<dyn RetryStrategy>> {
        self.strategies.get(transport).cloned()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
