//! Error type for message dispatch.

use std::error::Error;
use std::fmt;

use crate::envelope::Envelope;
use crate::transport::TransportError;

/// A handler's failure, labelled with the handler name.
pub type HandlerFailure = (String, Box<dyn Error + Send + Sync>);

/// Error returned by `MessageBus::dispatch`.
#[derive(Debug)]
pub enum DispatchError {
    /// No handler is registered for the message type (or its supertypes).
    NoHandlerForMessage(String),
    /// One or more handlers failed. The envelope records the handlers that
    /// succeeded, so a retry does not run them twice.
    HandlerFailed {
        envelope: Box<Envelope>,
        failures: Vec<HandlerFailure>,
    },
    /// The transport flagged the message as a redelivery.
    RejectedRedelivery { transport: String },
    /// Messages deferred until the end of the current dispatch failed.
    DelayedHandlingFailed(Vec<DispatchError>),
    /// The validation middleware refused the message.
    ValidationFailed { message_type: String, reason: String },
    /// Sending to a transport failed.
    Transport(TransportError),
    /// Middleware state lock was poisoned by a panicking thread.
    LockPoisoned(&'static str),
    /// Other middleware error.
    Middleware(Box<dyn Error + Send + Sync>),
}

impl DispatchError {
    /// The envelope attached to the error, if any.
    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            DispatchError::HandlerFailed { envelope, .. } => Some(envelope),
            _ => None,
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NoHandlerForMessage(message_type) => {
                write!(f, "no handler for message \"{}\"", message_type)
            }
            DispatchError::HandlerFailed { envelope, failures } => {
                write!(f, "handling \"{}\" failed: ", envelope.message_type)?;
                for (i, (handler, error)) in failures.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}: {}", handler, error)?;
                }
                Ok(())
            }
            DispatchError::RejectedRedelivery { transport } => write!(
                f,
                "redelivered message from transport \"{}\" was rejected",
                transport
            ),
            DispatchError::DelayedHandlingFailed(errors) => {
                write!(f, "{} deferred message(s) failed", errors.len())?;
                if let Some(first) = errors.first() {
                    write!(f, ", first: {}", first)?;
                }
                Ok(())
            }
            DispatchError::ValidationFailed {
                message_type,
                reason,
            } => write!(f, "message \"{}\" failed validation: {}", message_type, reason),
            DispatchError::Transport(e) => write!(f, "transport error: {}", e),
            DispatchError::LockPoisoned(operation) => {
                write!(f, "middleware lock poisoned during {}", operation)
            }
            DispatchError::Middleware(e) => write!(f, "middleware error: {}", e),
        }
    }
}

impl Error for DispatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DispatchError::HandlerFailed { failures, .. } => {
                failures.first().map(|(_, e)| e.as_ref() as &(dyn Error + 'static))
            }
            DispatchError::DelayedHandlingFailed(errors) => {
                errors.first().map(|e| e as &(dyn Error + 'static))
            }
            DispatchError::Transport(e) => Some(e),
            DispatchError::Middleware(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<TransportError> for DispatchError {
    fn from(err: TransportError) -> Self {
        DispatchError::Transport(err)
    }
}
