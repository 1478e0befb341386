//! Error type for failed-message administration.

use std::error::Error;
use std::fmt;

use crate::transport::TransportError;

#[derive(Debug)]
pub enum FailureError {
    /// No failure transport is configured.
    Disabled,
    /// No failed message with this id.
    NotFound(String),
    /// The failure transport cannot be browsed.
    NotListable(String),
    /// The message's original receiver is unknown or no longer configured.
    UnknownReceiver(String),
    /// Transport error.
    Transport(TransportError),
}

impl fmt::Display for FailureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureError::Disabled => write!(f, "no failure transport is configured"),
            FailureError::NotFound(id) => write!(f, "failed message not found: {}", id),
            FailureError::NotListable(name) => {
                write!(f, "failure transport \"{}\" does not support listing", name)
            }
            FailureError::UnknownReceiver(name) => {
                write!(f, "original receiver \"{}\" is not configured", name)
            }
            FailureError::Transport(e) => write!(f, "transport error: {}", e),
        }
    }
}

impl Error for FailureError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FailureError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for FailureError {
    fn from(err: TransportError) -> Self {
        FailureError::Transport(err)
    }
}

impl FailureError {
    /// Map this error to an HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        match self {
            FailureError::Disabled => 501,
            FailureError::NotFound(_) => 404,
            FailureError::NotListable(_) => 501,
            FailureError::UnknownReceiver(_) => 422,
            FailureError::Transport(_) => 500,
        }
    }
}
