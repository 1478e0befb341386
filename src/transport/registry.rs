//! Builds every configured transport and its retry strategy.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{Dsn, Transport, TransportFactoryRegistry};
use crate::config::{RetryStrategyConfig, TransportConfig};
use crate::error::{AssemblyError, ConfigurationError};
use crate::retry::{MultiplierRetryStrategy, RetryStrategy, RetryStrategyLocator};
use crate::serializer::{SerializerRegistry, DEFAULT_SERIALIZER_ALIAS};

/// Service id under which a transport is also reachable as a sender.
pub fn transport_service_id(name: &str) -> String {
    format!("messenger.transport.{}", name)
}

/// What was built for one transport, for inspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportInfo {
    pub name: String,
    pub scheme: String,
    pub serializer: String,
    pub retry_strategy: Value,
}

/// Transports in declaration order.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    transports: Vec<(String, Arc<dyn Transport>)>,
    info: Vec<TransportInfo>,
}

impl TransportRegistry {
    /// Create every transport of `configs` and the matching retry strategies.
    ///
    /// For each transport:
    /// - the serializer is its own id or `messenger.default_serializer`,
    /// - `transport_name` is added to the options unless already present,
    /// - the retry strategy is a registered service or a multiplier policy.
    ///
    /// The first failure aborts the whole assembly.
    pub fn assemble(
        configs: &[TransportConfig],
        factories: &TransportFactoryRegistry,
        serializers: &SerializerRegistry,
        retry_services: &HashMap<String, Arc<dyn RetryStrategy>>,
    ) -> Result<(TransportRegistry, RetryStrategyLocator), AssemblyError> {
        let mut registry = TransportRegistry::default();
        let mut strategies = RetryStrategyLocator::new();

        for config in configs {
            let serializer_id = config
                .serializer
                .clone()
                .unwrap_or_else(|| DEFAULT_SERIALIZER_ALIAS.to_string());
            let serializer =
                serializers
                    .get(&serializer_id)
                    .ok_or_else(|| ConfigurationError::UnknownSerializer {
                        transport: config.name.clone(),
                        id: serializer_id.clone(),
                    })?;

            let mut options = config.options.clone();
            options
                .entry("transport_name")
                .or_insert_with(|| Value::String(config.name.clone()));

            let (strategy, retry_description): (Arc<dyn RetryStrategy>, Value) =
                match &config.retry_strategy {
                    RetryStrategyConfig::Service(service) => {
                        let strategy = retry_services.get(service).cloned().ok_or_else(|| {
                            ConfigurationError::UnknownRetryService {
                                transport: config.name.clone(),
                                service: service.clone(),
                            }
                        })?;
                        (strategy, serde_json::json!({ "service": service }))
                    }
                    RetryStrategyConfig::Policy(policy) => (
                        Arc::new(MultiplierRetryStrategy::new(*policy)),
                        serde_json::to_value(policy).unwrap_or(Value::Null),
                    ),
                };

            let transport = factories.create(&config.name, &config.dsn, &options, serializer)?;
            let scheme = Dsn::parse(&config.dsn)
                .map(|dsn| dsn.scheme().to_string())
                .unwrap_or_default();

            debug!(
                transport = %config.name,
                %scheme,
                serializer = %serializer_id,
                "transport created"
            );

            strategies.insert(config.name.clone(), strategy);
            registry.info.push(TransportInfo {
                name: config.name.clone(),
                scheme,
                serializer: serializer_id,
                retry_strategy: retry_description,
            });
            registry.transports.push((config.name.clone(), transport));
        }

        Ok((registry, strategies))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Transport>> {
        self.transports
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| Arc::clone(t))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transports.iter().any(|(n, _)| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Transport>)> {
        self.transports.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn names(&self) -> Vec<&str> {
        self.transports.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn info(&self) -> &[TransportInfo] {
        &self.info
    }

    pub fn len(&self) -> usize {
        self.transports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }
}
