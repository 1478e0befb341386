//! Built-in middleware.
//!
//! Registered under `messenger.middleware.<name>`; pipelines refer to them by
//! the short name.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info_span};

use super::middleware::{Middleware, MiddlewareContext, MiddlewareRegistry, Next, ValidatorFn};
use super::{DispatchError, HandlersLocator};
use crate::envelope::{Envelope, Stamp};
use crate::routing::Router;

pub const ADD_BUS_NAME_STAMP: &str = "add_bus_name_stamp_middleware";
pub const REJECT_REDELIVERED: &str = "reject_redelivered_message_middleware";
pub const DISPATCH_AFTER_CURRENT_BUS: &str = "dispatch_after_current_bus";
pub const FAILED_MESSAGE_PROCESSING: &str = "failed_message_processing_middleware";
pub const SEND_MESSAGE: &str = "send_message";
pub const HANDLE_MESSAGE: &str = "handle_message";
pub const TRACEABLE: &str = "traceable";
pub const VALIDATION: &str = "validation";

pub(crate) fn register(registry: &mut MiddlewareRegistry) {
    registry.register(
        prefixed(ADD_BUS_NAME_STAMP),
        Arc::new(|ctx: &MiddlewareContext, args: &[Value]| -> Result<Arc<dyn Middleware>, String> {
            Ok(Arc::new(AddBusNameStamp {
                bus: string_argument(args, 0)?.unwrap_or_else(|| ctx.bus.clone()),
            }))
        }),
    );
    registry.register(
        prefixed(REJECT_REDELIVERED),
        Arc::new(|_: &MiddlewareContext, args: &[Value]| -> Result<Arc<dyn Middleware>, String> {
            no_arguments(args)?;
            Ok(Arc::new(RejectRedelivered))
        }),
    );
    registry.register(
        prefixed(DISPATCH_AFTER_CURRENT_BUS),
        Arc::new(|_: &MiddlewareContext, args: &[Value]| -> Result<Arc<dyn Middleware>, String> {
            no_arguments(args)?;
            Ok(Arc::new(DispatchAfterCurrentBus::default()))
        }),
    );
    registry.register(
        prefixed(FAILED_MESSAGE_PROCESSING),
        Arc::new(|_: &MiddlewareContext, args: &[Value]| -> Result<Arc<dyn Middleware>, String> {
            no_arguments(args)?;
            Ok(Arc::new(FailedMessageProcessing))
        }),
    );
    registry.register(
        prefixed(SEND_MESSAGE),
        Arc::new(|ctx: &MiddlewareContext, args: &[Value]| -> Result<Arc<dyn Middleware>, String> {
            no_arguments(args)?;
            Ok(Arc::new(SendMessage {
                router: Arc::clone(&ctx.router),
            }))
        }),
    );
    registry.register(
        prefixed(HANDLE_MESSAGE),
        Arc::new(|ctx: &MiddlewareContext, args: &[Value]| -> Result<Arc<dyn Middleware>, String> {
            let allow_no_handlers = match args.first() {
                None => false,
                Some(Value::Bool(allow)) => *allow,
                Some(other) => return Err(format!("expected a boolean, got {}", other)),
            };
            Ok(Arc::new(HandleMessage {
                handlers: Arc::clone(&ctx.handlers),
                allow_no_handlers,
            }))
        }),
    );
    registry.register(
        prefixed(TRACEABLE),
        Arc::new(|ctx: &MiddlewareContext, args: &[Value]| -> Result<Arc<dyn Middleware>, String> {
            Ok(Arc::new(Traceable {
                bus: string_argument(args, 0)?.unwrap_or_else(|| ctx.bus.clone()),
            }))
        }),
    );
    registry.register(
        prefixed(VALIDATION),
        Arc::new(|ctx: &MiddlewareContext, args: &[Value]| -> Result<Arc<dyn Middleware>, String> {
            no_arguments(args)?;
            Ok(Arc::new(Validation {
                validator: ctx.validator.clone(),
            }))
        }),
    );
}

pub(crate) fn prefixed(id: &str) -> String {
    format!("{}{}", super::middleware::MIDDLEWARE_ID_PREFIX, id)
}

fn string_argument(args: &[Value], index: usize) -> Result<Option<String>, String> {
    match args.get(index) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(format!("argument {} must be a string, got {}", index, other)),
    }
}

fn no_arguments(args: &[Value]) -> Result<(), String> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(format!("takes no arguments, got {}", args.len()))
    }
}

/// Records which bus a message was dispatched on.
struct AddBusNameStamp {
    bus: String,
}

impl Middleware for AddBusNameStamp {
    fn handle(&self, envelope: Envelope, next: Next<'_>) -> Result<Envelope, DispatchError> {
        if envelope.bus_name().is_some() {
            return next.handle(envelope);
        }
        next.handle(envelope.with(Stamp::BusName(self.bus.clone())))
    }
}

/// Refuses messages the transport marked as redelivered.
struct RejectRedelivered;

impl Middleware for RejectRedelivered {
    fn handle(&self, envelope: Envelope, next: Next<'_>) -> Result<Envelope, DispatchError> {
        if let Some((transport, true)) = envelope.received() {
            return Err(DispatchError::RejectedRedelivery {
                transport: transport.to_string(),
            });
        }
        next.handle(envelope)
    }
}

#[derive(Default)]
struct Deferral {
    queue: VecDeque<Envelope>,
}

/// Holds back envelopes stamped `DispatchAfterCurrentBus` until the
/// outermost dispatch on this bus and thread has finished.
///
/// If the outer dispatch fails the held envelopes are discarded.
#[derive(Default)]
struct DispatchAfterCurrentBus {
    running: Mutex<HashMap<ThreadId, Deferral>>,
}

impl DispatchAfterCurrentBus {
    fn pop(&self, thread: ThreadId) -> Result<Option<Envelope>, DispatchError> {
        let mut running = self
            .running
            .lock()
            .map_err(|_| DispatchError::LockPoisoned("dispatch_after_current_bus"))?;
        Ok(running.get_mut(&thread).and_then(|d| d.queue.pop_front()))
    }

    fn finish(&self, thread: ThreadId) -> Result<(), DispatchError> {
        self.running
            .lock()
            .map_err(|_| DispatchError::LockPoisoned("dispatch_after_current_bus"))?
            .remove(&thread);
        Ok(())
    }
}

impl Middleware for DispatchAfterCurrentBus {
    fn handle(&self, envelope: Envelope, next: Next<'_>) -> Result<Envelope, DispatchError> {
        let thread = thread::current().id();
        let deferred = envelope.has(|s| matches!(s, Stamp::DispatchAfterCurrentBus));
        {
            let mut running = self
                .running
                .lock()
                .map_err(|_| DispatchError::LockPoisoned("dispatch_after_current_bus"))?;
            if let Some(deferral) = running.get_mut(&thread) {
                if deferred {
                    debug!(message_type = %envelope.message_type, "dispatch deferred until current bus finishes");
                    deferral.queue.push_back(envelope.clone());
                    return Ok(envelope);
                }
                drop(running);
                return next.handle(envelope);
            }
            running.insert(thread, Deferral::default());
        }

        let envelope = if deferred {
            envelope.without(|s| matches!(s, Stamp::DispatchAfterCurrentBus))
        } else {
            envelope
        };

        let result = next.handle(envelope);
        if result.is_err() {
            self.finish(thread)?;
            return result;
        }

        let mut failures = Vec::new();
        while let Some(queued) = self.pop(thread)? {
            let queued = queued.without(|s| matches!(s, Stamp::DispatchAfterCurrentBus));
            if let Err(e) = next.handle(queued) {
                failures.push(e);
            }
        }
        self.finish(thread)?;

        if failures.is_empty() {
            result
        } else {
            Err(DispatchError::DelayedHandlingFailed(failures))
        }
    }
}

/// For a message consumed from the failure transport, makes the original
/// receiver the current one again.
struct FailedMessageProcessing;

impl Middleware for FailedMessageProcessing {
    fn handle(&self, envelope: Envelope, next: Next<'_>) -> Result<Envelope, DispatchError> {
        let original = match (envelope.original_receiver(), envelope.received()) {
            (Some(original), Some(_)) => Some(original.to_string()),
            _ => None,
        };
        match original {
            Some(transport) => next.handle(envelope.with(Stamp::Received {
                transport,
                redelivered: false,
            })),
            None => next.handle(envelope),
        }
    }
}

/// Sends routed messages to their transports instead of handling them.
///
/// Received messages and messages without a route continue down the pipeline.
struct SendMessage {
    router: Arc<Router>,
}

impl Middleware for SendMessage {
    fn handle(&self, envelope: Envelope, next: Next<'_>) -> Result<Envelope, DispatchError> {
        if envelope.received().is_some() {
            return next.handle(envelope);
        }
        let senders = self.router.senders(&envelope);
        if senders.is_empty() {
            return next.handle(envelope);
        }

        let mut envelope = envelope;
        for (name, sender) in senders {
            let sender_name = self.router.sender_locator().canonical_name(&name).to_string();
            debug!(message_type = %envelope.message_type, sender = %sender_name, "sending message");
            envelope = sender.send(envelope.with(Stamp::Sent {
                sender: sender_name,
            }))?;
        }
        Ok(envelope)
    }
}

/// Calls every handler for the message that has not already handled it.
struct HandleMessage {
    handlers: Arc<HandlersLocator>,
    allow_no_handlers: bool,
}

impl Middleware for HandleMessage {
    fn handle(&self, envelope: Envelope, next: Next<'_>) -> Result<Envelope, DispatchError> {
        let handlers = self.handlers.handlers_for(&envelope);
        if handlers.is_empty() {
            if self.allow_no_handlers {
                return next.handle(envelope);
            }
            return Err(DispatchError::NoHandlerForMessage(envelope.message_type));
        }

        let mut envelope = envelope;
        let mut failures = Vec::new();
        for (name, handler) in handlers {
            if envelope.was_handled_by(name) {
                continue;
            }
            match handler(&envelope) {
                Ok(()) => {
                    envelope = envelope.with(Stamp::Handled {
                        handler: name.to_string(),
                    })
                }
                Err(e) => failures.push((name.to_string(), e)),
            }
        }

        if !failures.is_empty() {
            return Err(DispatchError::HandlerFailed {
                envelope: Box::new(envelope),
                failures,
            });
        }
        next.handle(envelope)
    }
}

/// Opens a span per dispatch and logs the elapsed time.
struct Traceable {
    bus: String,
}

impl Middleware for Traceable {
    fn handle(&self, envelope: Envelope, next: Next<'_>) -> Result<Envelope, DispatchError> {
        let span = info_span!(
            "dispatch",
            bus = %self.bus,
            message_type = %envelope.message_type,
            message_id = %envelope.id
        );
        let _entered = span.enter();
        let started = Instant::now();
        let result = next.handle(envelope);
        debug!(
            elapsed_us = started.elapsed().as_micros() as u64,
            ok = result.is_ok(),
            "dispatch finished"
        );
        result
    }
}

/// Runs the embedder's validator, if one is configured.
struct Validation {
    validator: Option<Arc<ValidatorFn>>,
}

impl Middleware for Validation {
    fn handle(&self, envelope: Envelope, next: Next<'_>) -> Result<Envelope, DispatchError> {
        if let Some(validator) = &self.validator {
            if let Err(reason) = validator(&envelope) {
                return Err(DispatchError::ValidationFailed {
                    message_type: envelope.message_type,
                    reason,
                });
            }
        }
        next.handle(envelope)
    }
}
