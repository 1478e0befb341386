//! Message handlers keyed by message type.

use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;

use crate::envelope::Envelope;

/// A message handler. Errors are collected by `handle_message`.
pub type HandlerFn = dyn Fn(&Envelope) -> Result<(), Box<dyn Error + Send + Sync>> + Send + Sync;

/// Message type → named handlers, in registration order.
///
/// Handlers registered for a supertype also receive messages of its subtypes.
///
/// ## Example
///
/// ```
/// use messenger_bundle::bus::HandlersLocator;
/// use messenger_bundle::envelope::Envelope;
///
/// let handlers = HandlersLocator::new()
///     .handler("SendEmail", "mailer", |envelope| {
///         assert_eq!(envelope.body_str(), Some("{}"));
///         Ok(())
///     });
///
/// let envelope = Envelope::with_string_body("m-1", "SendEmail", "{}");
/// assert_eq!(handlers.handlers_for(&envelope).len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct HandlersLocator {
    handlers: HashMap<String, Vec<(String, Arc<HandlerFn>)>>,
}

impl HandlersLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler (builder style).
    pub fn handler<F>(mut self, message_type: &str, name: &str, handler: F) -> Self
    where
        F: Fn(&Envelope) -> Result<(), Box<dyn Error + Send + Sync>> + Send + Sync + 'static,
    {
        self.register(message_type, name, Arc::new(handler));
        self
    }

    pub fn register(&mut self, message_type: &str, name: &str, handler: Arc<HandlerFn>) {
        self.handlers
            .entry(message_type.to_string())
            .or_default()
            .push((name.to_string(), handler));
    }

    /// Handlers for the envelope's type, then for each supertype.
    pub fn handlers_for(&self, envelope: &Envelope) -> Vec<(&str, &Arc<HandlerFn>)> {
        let mut found: Vec<(&str, &Arc<HandlerFn>)> = Vec::new();
        for message_type in envelope.type_chain() {
            if let Some(handlers) = self.handlers.get(message_type) {
                for (name, handler) in handlers {
                    if !found.iter().any(|(n, _)| n == name) {
                        found.push((name.as_str(), handler));
                    }
                }
            }
        }
        found
    }

    /// Registered message types, sorted.
    pub fn message_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
