//! Envelope - a message plus the stamps collected on its way through buses
//! and transports.

use serde::{Deserialize, Serialize};

/// Metadata attached to an envelope by middleware, transports and workers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stamp {
    /// Name of the bus the message was first dispatched on.
    BusName(String),
    /// The message was received from a transport.
    Received {
        transport: String,
        /// Set by transports that know the broker delivered this message before.
        redelivered: bool,
    },
    /// The message is being retried.
    Redelivery { retry_count: u32 },
    /// Advisory delay before the transport should hand the message out again.
    Delay { millis: u64 },
    /// The message was sent to the named sender.
    Sent { sender: String },
    /// The named handler processed the message.
    Handled { handler: String },
    /// Identifier assigned by the transport that stores the message.
    TransportMessageId(String),
    /// The message exhausted its retries on `original_receiver`.
    SentToFailureTransport { original_receiver: String },
    /// Last error seen while handling the message.
    ErrorDetails { message: String },
    /// Hold the message until the dispatch currently running on the bus completes.
    DispatchAfterCurrentBus,
}

/// A message travelling through the messenger.
///
/// The body is opaque to the bus; routing only looks at `message_type`
/// and `supertypes`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique identifier for this message
    pub id: String,
    /// Concrete message type (e.g., "App\\Message\\OrderPlaced")
    pub message_type: String,
    /// Parent types and interfaces, most specific first
    pub supertypes: Vec<String>,
    /// Serialized message body
    pub body: Vec<u8>,
    /// Stamps in the order they were added
    pub stamps: Vec<Stamp>,
}

impl Envelope {
    /// Create a new envelope with the given type and body.
    pub fn new(id: impl Into<String>, message_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            message_type: message_type.into(),
            supertypes: Vec::new(),
            body,
            stamps: Vec::new(),
        }
    }

    /// Create an envelope with a bitcode-serialized body.
    pub fn encode<T: Serialize>(
        id: impl Into<String>,
        message_type: impl Into<String>,
        message: &T,
    ) -> Result<Self, bitcode::Error> {
        let bytes = bitcode::serialize(message)?;
        Ok(Self::new(id, message_type, bytes))
    }

    /// Decode the body from bitcode binary format.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, bitcode::Error> {
        bitcode::deserialize(&self.body)
    }

    /// Create an envelope with a string body.
    pub fn with_string_body(
        id: impl Into<String>,
        message_type: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::new(id, message_type, body.into().into_bytes())
    }

    /// Declare a supertype (parent type or interface) used for routing.
    pub fn with_supertype(mut self, supertype: impl Into<String>) -> Self {
        self.supertypes.push(supertype.into());
        self
    }

    /// Add a stamp.
    pub fn with(mut self, stamp: Stamp) -> Self {
        self.stamps.push(stamp);
        self
    }

    /// Remove every stamp matching the predicate.
    pub fn without(mut self, predicate: impl Fn(&Stamp) -> bool) -> Self {
        self.stamps.retain(|stamp| !predicate(stamp));
        self
    }

    /// The message type followed by its supertypes.
    pub fn type_chain(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.message_type.as_str()).chain(self.supertypes.iter().map(String::as_str))
    }

    /// Get the body as a string (if valid UTF-8).
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn bus_name(&self) -> Option<&str> {
        self.stamps.iter().rev().find_map(|stamp| match stamp {
            Stamp::BusName(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Transport the message was last received from, with its redelivery flag.
    pub fn received(&self) -> Option<(&str, bool)> {
        self.stamps.iter().rev().find_map(|stamp| match stamp {
            Stamp::Received {
                transport,
                redelivered,
            } => Some((transport.as_str(), *redelivered)),
            _ => None,
        })
    }

    /// Number of retries so far (0 for a first delivery).
    pub fn retry_count(&self) -> u32 {
        self.stamps
            .iter()
            .rev()
            .find_map(|stamp| match stamp {
                Stamp::Redelivery { retry_count } => Some(*retry_count),
                _ => None,
            })
            .unwrap_or(0)
    }

    pub fn delay_millis(&self) -> Option<u64> {
        self.stamps.iter().rev().find_map(|stamp| match stamp {
            Stamp::Delay { millis } => Some(*millis),
            _ => None,
        })
    }

    pub fn transport_message_id(&self) -> Option<&str> {
        self.stamps.iter().rev().find_map(|stamp| match stamp {
            Stamp::TransportMessageId(id) => Some(id.as_str()),
            _ => None,
        })
    }

    /// Receiver the message failed on before it was moved to the failure transport.
    pub fn original_receiver(&self) -> Option<&str> {
        self.stamps.iter().rev().find_map(|stamp| match stamp {
            Stamp::SentToFailureTransport { original_receiver } => Some(original_receiver.as_str()),
            _ => None,
        })
    }

    pub fn error_details(&self) -> Option<&str> {
        self.stamps.iter().rev().find_map(|stamp| match stamp {
            Stamp::ErrorDetails { message } => Some(message.as_str()),
            _ => None,
        })
    }

    pub fn was_handled_by(&self, handler: &str) -> bool {
        self.stamps
            .iter()
            .any(|stamp| matches!(stamp, Stamp::Handled { handler: h } if h == handler))
    }

    pub fn sent_to(&self) -> Vec<&str> {
        self.stamps
            .iter()
            .filter_map(|stamp| match stamp {
                Stamp::Sent { sender } => Some(sender.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has(&self, predicate: impl Fn(&Stamp) -> bool) -> bool {
        self.stamps.iter().any(predicate)
    }
}
