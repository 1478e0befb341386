//! One lookup for everything a route may name as a sender.

use std::collections::HashMap;
use std::sync::Arc;

use crate::transport::{transport_service_id, Transport, TransportRegistry};

/// Resolves sender names to transports.
///
/// A transport `async` is reachable both as `async` and as its service id
/// `messenger.transport.async`. Embedders may add sender services under
/// arbitrary ids.
#[derive(Clone, Default)]
pub struct SenderLocator {
    senders: HashMap<String, Arc<dyn Transport>>,
    /// Sender name → transport name, for aliases and service ids.
    canonical: HashMap<String, String>,
}

impl SenderLocator {
    pub fn new(transports: &TransportRegistry, services: &HashMap<String, Arc<dyn Transport>>) -> Self {
        let mut locator = Self::default();
        for (id, sender) in services {
            locator.senders.insert(id.clone(), Arc::clone(sender));
            locator.canonical.insert(id.clone(), id.clone());
        }
        for (name, transport) in transports.iter() {
            for alias in [name.to_string(), transport_service_id(name)] {
                locator.senders.insert(alias.clone(), Arc::clone(transport));
                locator.canonical.insert(alias, name.to_string());
            }
        }
        locator
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Transport>> {
        self.senders.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.senders.contains_key(name)
    }

    /// The transport name behind an alias or service id.
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.canonical.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.senders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
