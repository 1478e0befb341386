//! Failure Handler - parks exhausted messages on a failure transport and
//! administers them there.
//!
//! ```text
//!  Worker: retries exhausted
//!            │
//!            ▼
//!  FailureTransport::send_failed     strips delivery stamps,
//!            │                       adds SentToFailureTransport + ErrorDetails
//!            ▼
//!  ┌─────────────────────┐   list / show / retry / remove
//!  │  failure transport  │ ◄──────────────────────────── FailedMessages
//!  └─────────────────────┘
//!            │ retry(id)
//!            ▼
//!  original receiver transport
//! ```

mod error;

use std::sync::Arc;

use tracing::{error, info};

pub use error::FailureError;

use crate::envelope::{Envelope, Stamp};
use crate::routing::SenderLocator;
use crate::transport::{ListableReceiver, Transport, TransportError};

fn is_delivery_stamp(stamp: &Stamp) -> bool {
    matches!(
        stamp,
        Stamp::Delay { .. }
            | Stamp::Redelivery { .. }
            | Stamp::Received { .. }
            | Stamp::TransportMessageId(_)
    )
}

/// The transport configured as `failure_transport`.
#[derive(Clone)]
pub struct FailureTransport {
    name: String,
    transport: Arc<dyn Transport>,
}

impl FailureTransport {
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            transport,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Park a message that failed on `original_receiver`.
    pub fn send_failed(
        &self,
        envelope: Envelope,
        original_receiver: &str,
        reason: &str,
    ) -> Result<Envelope, TransportError> {
        let envelope = envelope
            .without(|s| {
                is_delivery_stamp(s)
                    || matches!(
                        s,
                        Stamp::SentToFailureTransport { .. } | Stamp::ErrorDetails { .. }
                    )
            })
            .with(Stamp::SentToFailureTransport {
                original_receiver: original_receiver.to_string(),
            })
            .with(Stamp::ErrorDetails {
                message: reason.to_string(),
            });

        error!(
            message_id = %envelope.id,
            message_type = %envelope.message_type,
            receiver = %original_receiver,
            failure_transport = %self.name,
            %reason,
            "message routed to failure transport"
        );
        self.transport.send(envelope)
    }
}

/// Administration of messages parked on the failure transport.
///
/// Every operation returns `FailureError::Disabled` when no failure
/// transport is configured. Messages are addressed by their transport
/// message id.
#[derive(Clone)]
pub struct FailedMessages {
    failure: Option<FailureTransport>,
    receivers: SenderLocator,
}

impl FailedMessages {
    pub fn new(failure: Option<FailureTransport>, receivers: SenderLocator) -> Self {
        Self { failure, receivers }
    }

    pub fn is_enabled(&self) -> bool {
        self.failure.is_some()
    }

    pub fn transport_name(&self) -> Option<&str> {
        self.failure.as_ref().map(FailureTransport::name)
    }

    /// Up to `limit` failed messages, oldest first.
    pub fn list(&self, limit: Option<usize>) -> Result<Vec<Envelope>, FailureError> {
        Ok(self.listable()?.all(limit)?)
    }

    pub fn show(&self, id: &str) -> Result<Envelope, FailureError> {
        self.listable()?
            .find(id)?
            .ok_or_else(|| FailureError::NotFound(id.to_string()))
    }

    /// Send the message back to its original receiver and remove it from
    /// the failure transport. Returns the envelope as re-sent.
    pub fn retry(&self, id: &str) -> Result<Envelope, FailureError> {
        let failure = self.enabled()?;
        let envelope = self.show(id)?;

        let receiver_name = envelope
            .original_receiver()
            .ok_or_else(|| FailureError::UnknownReceiver(String::new()))?
            .to_string();
        let receiver = self
            .receivers
            .get(&receiver_name)
            .ok_or_else(|| FailureError::UnknownReceiver(receiver_name.clone()))?;

        let fresh = envelope.clone().without(|s| {
            is_delivery_stamp(s)
                || matches!(
                    s,
                    Stamp::SentToFailureTransport { .. } | Stamp::ErrorDetails { .. }
                )
        });
        let sent = receiver.send(fresh)?;
        failure.transport.reject(&envelope)?;

        info!(message_id = %envelope.id, receiver = %receiver_name, "failed message retried");
        Ok(sent)
    }

    /// Delete the message from the failure transport. Returns what was removed.
    pub fn remove(&self, id: &str) -> Result<Envelope, FailureError> {
        let failure = self.enabled()?;
        let envelope = self.show(id)?;
        failure.transport.reject(&envelope)?;
        info!(message_id = %envelope.id, "failed message removed");
        Ok(envelope)
    }

    fn enabled(&self) -> Result<&FailureTransport, FailureError> {
        self.failure.as_ref().ok_or(FailureError::Disabled)
    }

    fn listable(&self) -> Result<&dyn ListableReceiver, FailureError> {
        let failure = self.enabled()?;
        failure
            .transport
            .as_listable()
            .ok_or_else(|| FailureError::NotListable(failure.name.clone()))
    }
}
