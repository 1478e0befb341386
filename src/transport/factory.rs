//! Transport factories keyed by DSN scheme.

use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::{Dsn, InMemoryTransport, Transport};
use crate::config::Capabilities;
use crate::error::FactoryResolutionError;
use crate::serializer::Serializer;

/// Scheme of the built-in in-memory transport.
pub const IN_MEMORY_SCHEME: &str = "in-memory";

/// Transport options, always including `transport_name`.
pub type TransportOptions = Map<String, Value>;

/// Builds a transport for one DSN scheme.
///
/// Implemented for closures so embedders can register factories inline.
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        dsn: &Dsn,
        options: &TransportOptions,
        serializer: Arc<dyn Serializer>,
    ) -> Result<Arc<dyn Transport>, Box<dyn Error + Send + Sync>>;
}

impl<F> TransportFactory for F
where
    F: Fn(&Dsn, &TransportOptions, Arc<dyn Serializer>) -> Result<Arc<dyn Transport>, Box<dyn Error + Send + Sync>>
        + Send
        + Sync,
{
    fn create(
        &self,
        dsn: &Dsn,
        options: &TransportOptions,
        serializer: Arc<dyn Serializer>,
    ) -> Result<Arc<dyn Transport>, Box<dyn Error + Send + Sync>> {
        self(dsn, options, serializer)
    }
}

struct InMemoryTransportFactory;

impl TransportFactory for InMemoryTransportFactory {
    fn create(
        &self,
        _dsn: &Dsn,
        options: &TransportOptions,
        serializer: Arc<dyn Serializer>,
    ) -> Result<Arc<dyn Transport>, Box<dyn Error + Send + Sync>> {
        let name = options
            .get("transport_name")
            .and_then(Value::as_str)
            .unwrap_or(IN_MEMORY_SCHEME);
        Ok(Arc::new(InMemoryTransport::new(name, serializer)))
    }
}

/// Scheme → factory lookup.
///
/// Factories for optional schemes (amqp, redis, sqs, doctrine) are only
/// accepted when `Capabilities` marks them available.
#[derive(Clone)]
pub struct TransportFactoryRegistry {
    capabilities: Capabilities,
    factories: BTreeMap<String, Arc<dyn TransportFactory>>,
}

impl Default for TransportFactoryRegistry {
    fn default() -> Self {
        Self::new(Capabilities::default())
    }
}

impl TransportFactoryRegistry {
    /// Create a registry holding the built-in `in-memory://` factory.
    pub fn new(capabilities: Capabilities) -> Self {
        let mut factories: BTreeMap<String, Arc<dyn TransportFactory>> = BTreeMap::new();
        factories.insert(IN_MEMORY_SCHEME.to_string(), Arc::new(InMemoryTransportFactory));
        Self {
            capabilities,
            factories,
        }
    }

    /// Register a factory for a scheme. Returns `false` when the scheme's
    /// capability is switched off and the factory was skipped.
    pub fn register(&mut self, scheme: &str, factory: Arc<dyn TransportFactory>) -> bool {
        let scheme = scheme.to_ascii_lowercase();
        if self.capabilities.scheme(&scheme) == Some(false) {
            debug!(%scheme, "transport factory skipped: capability not available");
            return false;
        }
        self.factories.insert(scheme, factory);
        true
    }

    pub fn set_capabilities(&mut self, capabilities: Capabilities) {
        self.capabilities = capabilities;
        let caps = self.capabilities;
        self.factories
            .retain(|scheme, _| caps.scheme(scheme) != Some(false));
    }

    pub fn schemes(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn supports(&self, scheme: &str) -> bool {
        self.factories.contains_key(&scheme.to_ascii_lowercase())
    }

    /// Resolve `dsn` for the transport called `name` and build it.
    pub fn create(
        &self,
        name: &str,
        dsn: &str,
        options: &TransportOptions,
        serializer: Arc<dyn Serializer>,
    ) -> Result<Arc<dyn Transport>, FactoryResolutionError> {
        let parsed = Dsn::parse(dsn).ok_or_else(|| FactoryResolutionError::InvalidDsn {
            transport: name.to_string(),
            dsn: dsn.to_string(),
        })?;

        let factory = self.factories.get(parsed.scheme()).ok_or_else(|| {
            FactoryResolutionError::NoFactoryForScheme {
                transport: name.to_string(),
                scheme: parsed.scheme().to_string(),
                available: self.schemes(),
            }
        })?;

        factory
            .create(&parsed, options, serializer)
            .map_err(|source| FactoryResolutionError::Factory {
                transport: name.to_string(),
                source,
            })
    }
}
