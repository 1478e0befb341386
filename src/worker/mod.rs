//! Worker - consumes receivers, dispatches on a bus, retries and parks
//! failed messages.
//!
//! Per message:
//!
//! ```text
//! get() → dispatch ─ ok ──────────────────────────────► ack        Handled
//!                  └ error → reject → retryable? ─ yes ► re-send  Retried { delay }
//!                                                └ no ─► failure transport?
//!                                                         ├ yes  RoutedToFailure
//!                                                         └ no   Dropped
//! ```
//!
//! Each envelope is dispatched on the bus named by its `BusName` stamp, or
//! on the default bus when it carries none. A worker built with an explicit
//! bus uses that bus for everything.
//!
//! Retry delays are stamped onto the re-sent envelope, never slept on.

mod thread;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

pub use thread::{WorkerHandle, WorkerStats};

use crate::bus::{BusRegistry, MessageBus};
use crate::envelope::{Envelope, Stamp};
use crate::failure::FailureTransport;
use crate::retry::RetryStrategyLocator;
use crate::transport::{Transport, TransportError};

/// What happened to one consumed message.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Handled,
    Retried { retry_count: u32, delay: Duration },
    RoutedToFailure,
    Dropped,
}

/// One consumed message and its outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    pub receiver: String,
    pub message_id: String,
    pub outcome: Outcome,
}

/// Pulls from receivers in order and dispatches each envelope on its bus.
#[derive(Clone)]
pub struct Worker {
    receivers: Vec<(String, Arc<dyn Transport>)>,
    buses: BusRegistry,
    /// Overrides the bus named by the envelope.
    bus: Option<Arc<MessageBus>>,
    retry: RetryStrategyLocator,
    failure: Option<FailureTransport>,
}

impl Worker {
    pub fn new(
        receivers: Vec<(String, Arc<dyn Transport>)>,
        buses: BusRegistry,
        bus: Option<Arc<MessageBus>>,
        retry: RetryStrategyLocator,
        failure: Option<FailureTransport>,
    ) -> Self {
        Self {
            receivers,
            buses,
            bus,
            retry,
            failure,
        }
    }

    pub fn receivers(&self) -> Vec<&str> {
        self.receivers.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// One `get()` per receiver; every envelope returned is processed.
    pub fn run_once(&self) -> Result<Vec<Processed>, TransportError> {
        let mut processed = Vec::new();
        for (name, receiver) in &self.receivers {
            for envelope in receiver.get()? {
                let message_id = envelope.id.clone();
                let outcome = self.process(name, receiver, envelope)?;
                processed.push(Processed {
                    receiver: name.clone(),
                    message_id,
                    outcome,
                });
            }
        }
        Ok(processed)
    }

    /// The bus an envelope is dispatched on.
    ///
    /// A stamp naming a bus that does not exist falls back to the default bus.
    pub fn bus_for(&self, envelope: &Envelope) -> Arc<MessageBus> {
        if let Some(bus) = &self.bus {
            return Arc::clone(bus);
        }
        match envelope.bus_name() {
            Some(name) => self.buses.get(name).unwrap_or_else(|| {
                warn!(bus = %name, message_id = %envelope.id, "unknown bus in stamp, using the default bus");
                Arc::clone(self.buses.default_bus())
            }),
            None => Arc::clone(self.buses.default_bus()),
        }
    }

    /// Run `run_once` on a background thread every `poll_interval` until stopped.
    pub fn spawn(self, poll_interval: Duration) -> WorkerHandle {
        WorkerHandle::spawn(self, poll_interval)
    }

    fn process(
        &self,
        name: &str,
        receiver: &Arc<dyn Transport>,
        envelope: Envelope,
    ) -> Result<Outcome, TransportError> {
        let envelope = if envelope.received().is_some() {
            envelope
        } else {
            envelope.with(Stamp::Received {
                transport: name.to_string(),
                redelivered: false,
            })
        };

        let err = match self.bus_for(&envelope).dispatch(envelope.clone()) {
            Ok(_) => {
                receiver.ack(&envelope)?;
                return Ok(Outcome::Handled);
            }
            Err(err) => err,
        };

        receiver.reject(&envelope)?;
        let failed = err.envelope().cloned().unwrap_or(envelope);
        let reason = err.to_string();

        let from_failure_transport = self
            .failure
            .as_ref()
            .map_or(false, |failure| failure.name() == name);
        let original_receiver = if from_failure_transport {
            failed.original_receiver().unwrap_or(name).to_string()
        } else {
            name.to_string()
        };

        if let Some(strategy) = self.retry.get(&original_receiver) {
            if strategy.is_retryable(&failed) {
                let delay = strategy.wait_time(&failed);
                let retry_count = failed.retry_count() + 1;
                warn!(
                    message_id = %failed.id,
                    receiver = %name,
                    retry_count,
                    delay_ms = delay.as_millis() as u64,
                    error = %reason,
                    "message failed, retrying"
                );
                let retried = failed
                    .without(|s| {
                        matches!(
                            s,
                            Stamp::Received { .. }
                                | Stamp::TransportMessageId(_)
                                | Stamp::Delay { .. }
                                | Stamp::Redelivery { .. }
                                | Stamp::ErrorDetails { .. }
                        )
                    })
                    .with(Stamp::Redelivery { retry_count })
                    .with(Stamp::Delay {
                        millis: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    })
                    .with(Stamp::ErrorDetails {
                        message: reason,
                    });
                receiver.send(retried)?;
                return Ok(Outcome::Retried { retry_count, delay });
            }
        }

        match &self.failure {
            Some(failure) if !from_failure_transport => {
                failure.send_failed(failed, &original_receiver, &reason)?;
                Ok(Outcome::RoutedToFailure)
            }
            _ => {
                error!(
                    message_id = %failed.id,
                    receiver = %name,
                    error = %reason,
                    "message dropped after exhausting retries"
                );
                Ok(Outcome::Dropped)
            }
        }
    }
}
