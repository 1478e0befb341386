//! Host-supplied switches threaded through assembly.

/// Whether message validation is available in the host.
///
/// The `validation` middleware may only appear in a bus when this is enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationPolicy {
    pub enabled: bool,
}

impl ValidationPolicy {
    pub fn enabled() -> Self {
        Self { enabled: true }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }
}

/// Optional integrations the embedder has available.
///
/// Transport factories for optional schemes are only registered when the
/// matching flag is set. `tracing` gates the `traceable` middleware added in
/// debug mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub amqp: bool,
    pub redis: bool,
    pub sqs: bool,
    pub doctrine: bool,
    pub tracing: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            amqp: false,
            redis: false,
            sqs: false,
            doctrine: false,
            tracing: true,
        }
    }
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            amqp: true,
            redis: true,
            sqs: true,
            doctrine: true,
            tracing: true,
        }
    }

    /// Availability of an optional scheme; `None` when the scheme is not optional.
    pub fn scheme(&self, scheme: &str) -> Option<bool> {
        match scheme {
            "amqp" | "amqps" => Some(self.amqp),
            "redis" | "rediss" => Some(self.redis),
            "sqs" => Some(self.sqs),
            "doctrine" => Some(self.doctrine),
            _ => None,
        }
    }
}
