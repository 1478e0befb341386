//! Bus Assembler - computes each bus's pipeline and instantiates it.
//!
//! Pipeline with default middleware enabled:
//!
//! ```text
//! [traceable(bus)]                      debug mode + tracing capability
//! add_bus_name_stamp_middleware(bus)
//! reject_redelivered_message_middleware
//! dispatch_after_current_bus
//! failed_message_processing_middleware
//! <configured middleware...>
//! send_message
//! handle_message([true])                [true] only for allow_no_handlers
//! ```
//!
//! With default middleware disabled only the configured entries remain
//! (still preceded by `traceable` in debug mode).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::builtin::{
    prefixed, ADD_BUS_NAME_STAMP, DISPATCH_AFTER_CURRENT_BUS, FAILED_MESSAGE_PROCESSING,
    HANDLE_MESSAGE, REJECT_REDELIVERED, SEND_MESSAGE, TRACEABLE, VALIDATION,
};
use super::middleware::{MiddlewareContext, MiddlewareRegistry};
use super::MessageBus;
use crate::config::{BusConfig, Capabilities, DefaultMiddleware, MiddlewareEntry, ValidationPolicy};
use crate::error::ConfigurationError;

/// Aliases under which the default bus is also registered.
pub const DEFAULT_BUS_ALIASES: [&str; 2] = ["message_bus", "messenger.default_bus"];

/// Turns bus configurations into `MessageBus` instances.
pub struct BusAssembler<'a> {
    middleware: &'a MiddlewareRegistry,
    debug: bool,
    capabilities: Capabilities,
    validation: ValidationPolicy,
}

impl<'a> BusAssembler<'a> {
    pub fn new(middleware: &'a MiddlewareRegistry) -> Self {
        Self {
            middleware,
            debug: false,
            capabilities: Capabilities::default(),
            validation: ValidationPolicy::default(),
        }
    }

    /// Host debug flag; adds `traceable` when tracing is available.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn validation(mut self, validation: ValidationPolicy) -> Self {
        self.validation = validation;
        self
    }

    /// The ordered middleware entries of a bus, before id resolution.
    pub fn pipeline(&self, bus: &BusConfig) -> Result<Vec<MiddlewareEntry>, ConfigurationError> {
        for entry in &bus.middleware {
            if is_validation(&entry.id) && !self.validation.enabled {
                return Err(ConfigurationError::ValidationUnavailable {
                    bus: bus.name.clone(),
                });
            }
        }

        let bus_argument = || vec![Value::String(bus.name.clone())];
        let mut pipeline = Vec::with_capacity(bus.middleware.len() + 7);

        if self.debug && self.capabilities.tracing {
            pipeline.push(MiddlewareEntry::with_arguments(TRACEABLE, bus_argument()));
        }

        if bus.default_middleware.is_enabled() {
            pipeline.push(MiddlewareEntry::with_arguments(ADD_BUS_NAME_STAMP, bus_argument()));
            pipeline.push(MiddlewareEntry::new(REJECT_REDELIVERED));
            pipeline.push(MiddlewareEntry::new(DISPATCH_AFTER_CURRENT_BUS));
            pipeline.push(MiddlewareEntry::new(FAILED_MESSAGE_PROCESSING));
            pipeline.extend(bus.middleware.iter().cloned());
            pipeline.push(MiddlewareEntry::new(SEND_MESSAGE));
            let handle_arguments = match bus.default_middleware {
                DefaultMiddleware::AllowNoHandlers => vec![Value::Bool(true)],
                _ => Vec::new(),
            };
            pipeline.push(MiddlewareEntry::with_arguments(HANDLE_MESSAGE, handle_arguments));
        } else {
            pipeline.extend(bus.middleware.iter().cloned());
        }

        Ok(pipeline)
    }

    /// Like [`pipeline`](Self::pipeline), with every id resolved against
    /// the middleware registry. Entries carry the id that matched.
    pub fn resolved_pipeline(&self, bus: &BusConfig) -> Result<Vec<MiddlewareEntry>, ConfigurationError> {
        self.pipeline(bus)?
            .into_iter()
            .map(|entry| match self.middleware.resolve(&entry.id) {
                Some((id, _)) => Ok(MiddlewareEntry { id, ..entry }),
                None => Err(ConfigurationError::UnknownMiddleware {
                    bus: bus.name.clone(),
                    id: entry.id,
                }),
            })
            .collect()
    }

    /// Build every bus. `context` is used as a template; its bus name is
    /// replaced per bus.
    pub fn assemble(
        &self,
        buses: &[BusConfig],
        default_bus: &str,
        context: &MiddlewareContext,
    ) -> Result<BusRegistry, ConfigurationError> {
        let mut assembled = Vec::with_capacity(buses.len());
        let mut aliases = BTreeMap::new();

        for bus in buses {
            let entries = self.pipeline(bus)?;
            let bus_context = MiddlewareContext {
                bus: bus.name.clone(),
                ..context.clone()
            };

            let mut ids = Vec::with_capacity(entries.len());
            let mut pipeline = Vec::with_capacity(entries.len());
            for entry in &entries {
                let (id, factory) = self.middleware.resolve(&entry.id).ok_or_else(|| {
                    ConfigurationError::UnknownMiddleware {
                        bus: bus.name.clone(),
                        id: entry.id.clone(),
                    }
                })?;
                let middleware = factory.create(&bus_context, &entry.arguments).map_err(|reason| {
                    ConfigurationError::MiddlewareArguments {
                        bus: bus.name.clone(),
                        id: entry.id.clone(),
                        reason,
                    }
                })?;
                ids.push(id);
                pipeline.push(middleware);
            }

            if bus.name == default_bus {
                for alias in DEFAULT_BUS_ALIASES {
                    aliases.insert(alias.to_string(), bus.name.clone());
                }
            } else {
                aliases.insert(argument_alias(&bus.name)?, bus.name.clone());
            }

            debug!(bus = %bus.name, middleware = ?ids, "bus assembled");
            assembled.push(Arc::new(MessageBus::new(bus.name.clone(), ids, pipeline)));
        }

        let default_index = assembled
            .iter()
            .position(|b| b.name() == default_bus)
            .ok_or_else(|| ConfigurationError::UnknownDefaultBus {
                name: default_bus.to_string(),
                available: buses.iter().map(|b| b.name.clone()).collect(),
            })?;

        Ok(BusRegistry {
            buses: assembled,
            default_index,
            aliases,
        })
    }
}

fn is_validation(id: &str) -> bool {
    id == VALIDATION || id == prefixed(VALIDATION)
}

/// camelCase argument alias of a bus name: `messenger.bus.commands` →
/// `messengerBusCommands`. Must start with a letter or a non-ASCII character.
pub fn argument_alias(bus: &str) -> Result<String, ConfigurationError> {
    let mut alias = String::with_capacity(bus.len());
    for word in bus
        .split(|c: char| c.is_ascii() && !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            if alias.is_empty() {
                alias.extend(first.to_lowercase());
            } else {
                alias.extend(first.to_uppercase());
            }
            alias.push_str(chars.as_str());
        }
    }

    match alias.chars().next() {
        Some(first) if first.is_alphabetic() || !first.is_ascii() => Ok(alias),
        _ => Err(ConfigurationError::InvalidArgumentAlias {
            bus: bus.to_string(),
            alias,
        }),
    }
}

/// Assembled buses, addressable by name or alias.
#[derive(Clone, Debug)]
pub struct BusRegistry {
    buses: Vec<Arc<MessageBus>>,
    default_index: usize,
    aliases: BTreeMap<String, String>,
}

impl BusRegistry {
    /// Look up a bus by name, then by alias.
    pub fn get(&self, name: &str) -> Option<Arc<MessageBus>> {
        let name = self.aliases.get(name).map(String::as_str).unwrap_or(name);
        self.buses.iter().find(|b| b.name() == name).cloned()
    }

    pub fn default_bus(&self) -> &Arc<MessageBus> {
        &self.buses[self.default_index]
    }

    /// Alias → bus name.
    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    pub fn names(&self) -> Vec<&str> {
        self.buses.iter().map(|b| b.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<MessageBus>> {
        self.buses.iter()
    }
}
