//! A named bus with its assembled middleware pipeline.

use std::fmt;
use std::sync::Arc;

use super::middleware::{Middleware, Next};
use super::DispatchError;
use crate::envelope::Envelope;

/// Message bus - runs envelopes through a fixed middleware pipeline.
///
/// Built by the bus assembler; the pipeline never changes afterwards.
pub struct MessageBus {
    name: String,
    middleware_ids: Vec<String>,
    pipeline: Vec<Arc<dyn Middleware>>,
}

impl MessageBus {
    pub(crate) fn new(
        name: String,
        middleware_ids: Vec<String>,
        pipeline: Vec<Arc<dyn Middleware>>,
    ) -> Self {
        Self {
            name,
            middleware_ids,
            pipeline,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved ids of the pipeline stages, in order.
    pub fn middleware(&self) -> &[String] {
        &self.middleware_ids
    }

    /// Dispatch an envelope through the pipeline.
    ///
    /// Returns the envelope with the stamps added along the way.
    pub fn dispatch(&self, envelope: Envelope) -> Result<Envelope, DispatchError> {
        Next::new(&self.pipeline).handle(envelope)
    }

    /// Encode `message` with bitcode and dispatch it.
    pub fn dispatch_message<T: serde::Serialize>(
        &self,
        id: impl Into<String>,
        message_type: impl Into<String>,
        message: &T,
    ) -> Result<Envelope, DispatchError> {
        let envelope = Envelope::encode(id, message_type, message)
            .map_err(|e| DispatchError::Middleware(Box::new(e)))?;
        self.dispatch(envelope)
    }
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("name", &self.name)
            .field("middleware", &self.middleware_ids)
            .finish()
    }
}
