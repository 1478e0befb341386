//! Configuration Validator - raw tree in, typed `MessengerConfig` out.
//!
//! ## Example
//!
//! ```
//! use messenger_bundle::config::MessengerConfig;
//!
//! let config = MessengerConfig::from_json_str(r#"{
//!     "transports": { "async": "in-memory://" },
//!     "routing": { "App\\Message\\SendEmail": "async" },
//!     "buses": { "command.bus": {} }
//! }"#).unwrap();
//!
//! // A single bus becomes the default
//! assert_eq!(config.default_bus.as_deref(), Some("command.bus"));
//! ```

mod model;
mod normalize;
mod policy;

use std::collections::HashSet;
use std::path::Path;

use serde_json::Value;

pub use model::{
    BusConfig, DefaultMiddleware, MessengerConfig, MiddlewareEntry, RetryPolicy,
    RetryStrategyConfig, RoutingEntry, SerializerConfig, SymfonySerializerConfig, TransportConfig,
    DEFAULT_BUS_NAME, DEFAULT_SERIALIZER_ID,
};
pub use policy::{Capabilities, ValidationPolicy};

use crate::error::ConfigurationError;
use crate::transport::transport_service_id;

impl MessengerConfig {
    /// Normalize and validate a raw configuration tree.
    pub fn from_value(value: &Value) -> Result<Self, ConfigurationError> {
        let mut config = normalize::normalize(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigurationError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ConfigurationError::Parse(e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigurationError> {
        let value: Value =
            serde_yaml::from_str(text).map_err(|e| ConfigurationError::Parse(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Load a `.json`, `.yaml` or `.yml` file. Other extensions are read as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::Parse(format!("{}: {}", path.display(), e)))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    /// Check cross-field rules and adopt a lone bus as the default.
    ///
    /// Idempotent; `assemble()` calls it again for configs built in code.
    pub fn validate(&mut self) -> Result<(), ConfigurationError> {
        unique(self.buses.iter().map(|b| b.name.as_str()), "buses")?;
        unique(self.transports.iter().map(|t| t.name.as_str()), "transports")?;
        unique(self.routing.iter().map(|r| r.message_type.as_str()), "routing")?;

        if self.buses.len() > 1 && self.default_bus.is_none() {
            return Err(ConfigurationError::MissingDefaultBus);
        }
        if let Some(name) = &self.default_bus {
            if self.bus(name).is_none() {
                return Err(ConfigurationError::UnknownDefaultBus {
                    name: name.clone(),
                    available: self.bus_names(),
                });
            }
        }
        if self.default_bus.is_none() && self.buses.len() == 1 {
            self.default_bus = Some(self.buses[0].name.clone());
        }

        for route in &self.routing {
            if route.senders.is_empty() {
                return Err(ConfigurationError::InvalidValue {
                    path: format!("routing.{}.senders", route.message_type),
                    reason: "should have at least 1 element(s) defined".into(),
                });
            }
        }

        for transport in &self.transports {
            if let RetryStrategyConfig::Policy(policy) = &transport.retry_strategy {
                if !(policy.multiplier >= 1.0 && policy.multiplier.is_finite()) {
                    return Err(ConfigurationError::InvalidValue {
                        path: format!("transports.{}.retry_strategy.multiplier", transport.name),
                        reason: "should be greater than or equal to 1".into(),
                    });
                }
            }
        }

        for bus in &self.buses {
            if let Some(entry) = bus.middleware.iter().find(|m| m.id.is_empty()) {
                return Err(ConfigurationError::InvalidMiddleware {
                    bus: bus.name.clone(),
                    given: format!("{:?}", entry),
                });
            }
        }
        Ok(())
    }
}

impl MessengerConfig {
    /// Check routing senders and the failure transport against the
    /// configured transports, by name or by `messenger.transport.<name>`.
    ///
    /// Senders registered as services at assembly time are not known here.
    pub fn check_references(&self) -> Result<(), ConfigurationError> {
        let known: HashSet<String> = self
            .transports
            .iter()
            .flat_map(|t| [t.name.clone(), transport_service_id(&t.name)])
            .collect();

        for route in &self.routing {
            if let Some(sender) = route.senders.iter().find(|s| !known.contains(*s)) {
                return Err(ConfigurationError::UnknownSender {
                    message_type: route.message_type.clone(),
                    sender: sender.clone(),
                });
            }
        }
        match &self.failure_transport {
            Some(name) if !known.contains(name) => {
                Err(ConfigurationError::UnknownFailureTransport(name.clone()))
            }
            _ => Ok(()),
        }
    }
}

fn unique<'a>(names: impl Iterator<Item = &'a str>, path: &str) -> Result<(), ConfigurationError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConfigurationError::InvalidValue {
                path: format!("{}.{}", path, name),
                reason: "is defined more than once".into(),
            });
        }
    }
    Ok(())
}
