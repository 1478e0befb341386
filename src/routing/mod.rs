//! Router - message type → ordered sender names.
//!
//! Routes are checked when the router is built, so a typo in a sender name
//! fails assembly instead of the first dispatch.
//!
//! Resolution for an envelope:
//! 1. senders of the exact message type,
//! 2. then senders of each supertype, in declaration order,
//! 3. only when nothing matched, senders of the `*` route.
//!
//! Duplicates keep their first position.

mod senders;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

pub use senders::SenderLocator;

use crate::config::RoutingEntry;
use crate::envelope::Envelope;
use crate::error::ConfigurationError;
use crate::transport::Transport;

/// Catch-all routing key.
pub const WILDCARD: &str = "*";

#[derive(Clone)]
pub struct Router {
    routes: Vec<RoutingEntry>,
    index: HashMap<String, usize>,
    senders: SenderLocator,
}

impl Router {
    /// Build and validate the routing table.
    ///
    /// With `known_types`, every non-wildcard key must be one of them.
    pub fn build(
        routing: &[RoutingEntry],
        senders: SenderLocator,
        known_types: Option<&HashSet<String>>,
    ) -> Result<Self, ConfigurationError> {
        let mut index = HashMap::with_capacity(routing.len());

        for (position, route) in routing.iter().enumerate() {
            if let Some(known) = known_types {
                if route.message_type != WILDCARD && !known.contains(&route.message_type) {
                    return Err(ConfigurationError::UnknownMessageType(route.message_type.clone()));
                }
            }
            if let Some(sender) = route.senders.iter().find(|s| !senders.contains(s)) {
                return Err(ConfigurationError::UnknownSender {
                    message_type: route.message_type.clone(),
                    sender: sender.clone(),
                });
            }
            debug!(message_type = %route.message_type, senders = ?route.senders, "route registered");
            index.insert(route.message_type.clone(), position);
        }

        Ok(Self {
            routes: routing.to_vec(),
            index,
            senders,
        })
    }

    /// The configured senders for exactly this routing key.
    pub fn senders_for_type(&self, message_type: &str) -> Option<&[String]> {
        self.index
            .get(message_type)
            .map(|&position| self.routes[position].senders.as_slice())
    }

    /// Sender names an envelope is routed to.
    pub fn sender_names(&self, envelope: &Envelope) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for message_type in envelope.type_chain() {
            if let Some(senders) = self.senders_for_type(message_type) {
                push_unique(&mut names, senders);
            }
        }
        if names.is_empty() {
            if let Some(senders) = self.senders_for_type(WILDCARD) {
                push_unique(&mut names, senders);
            }
        }
        names
    }

    /// Resolved senders for an envelope, in routing order.
    pub fn senders(&self, envelope: &Envelope) -> Vec<(String, Arc<dyn Transport>)> {
        self.sender_names(envelope)
            .into_iter()
            .filter_map(|name| self.senders.get(name).map(|sender| (name.to_string(), sender)))
            .collect()
    }

    pub fn routes(&self) -> &[RoutingEntry] {
        &self.routes
    }

    pub fn sender_locator(&self) -> &SenderLocator {
        &self.senders
    }
}

fn push_unique<'a>(names: &mut Vec<&'a str>, senders: &'a [String]) {
    for sender in senders {
        if !names.contains(&sender.as_str()) {
            names.push(sender);
        }
    }
}
