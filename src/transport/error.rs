//! Error type for transport and serializer operations.

use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum TransportError {
    /// Connection to the broker failed
    ConnectionFailed(String),
    /// Encoding or decoding the envelope failed
    SerializationFailed(String),
    /// The broker rejected the message
    Rejected(String),
    /// No message with this transport id
    NotFound(String),
    /// Internal state lock was poisoned by a panicking thread
    LockPoisoned(&'static str),
    /// Other error
    Other(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::ConnectionFailed(msg) => write!(f, "connection failed: {}", msg),
            TransportError::SerializationFailed(msg) => write!(f, "serialization failed: {}", msg),
            TransportError::Rejected(msg) => write!(f, "message rejected: {}", msg),
            TransportError::NotFound(id) => write!(f, "message not found: {}", id),
            TransportError::LockPoisoned(operation) => {
                write!(f, "transport lock poisoned during {}", operation)
            }
            TransportError::Other(e) => write!(f, "transport error: {}", e),
        }
    }
}

impl Error for TransportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TransportError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<bitcode::Error> for TransportError {
    fn from(err: bitcode::Error) -> Self {
        TransportError::SerializationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::SerializationFailed(err.to_string())
    }
}
