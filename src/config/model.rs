//! Typed messenger configuration produced by the validator.

use serde::Serialize;
use serde_json::{Map, Value};

/// Name of the bus created when the configuration declares none.
pub const DEFAULT_BUS_NAME: &str = "messenger.bus.default";

/// Serializer used by transports that do not name one.
pub const DEFAULT_SERIALIZER_ID: &str = "messenger.transport.native_serializer";

/// Validated messenger configuration.
///
/// Lists keep declaration order. Names are unique within `buses` and
/// `transports` once `validate()` has passed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessengerConfig {
    pub routing: Vec<RoutingEntry>,
    pub serializer: SerializerConfig,
    pub transports: Vec<TransportConfig>,
    pub failure_transport: Option<String>,
    pub default_bus: Option<String>,
    pub buses: Vec<BusConfig>,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            routing: Vec::new(),
            serializer: SerializerConfig::default(),
            transports: Vec::new(),
            failure_transport: None,
            default_bus: None,
            buses: vec![BusConfig::new(DEFAULT_BUS_NAME)],
        }
    }
}

impl MessengerConfig {
    pub fn bus(&self, name: &str) -> Option<&BusConfig> {
        self.buses.iter().find(|b| b.name == name)
    }

    pub fn transport(&self, name: &str) -> Option<&TransportConfig> {
        self.transports.iter().find(|t| t.name == name)
    }

    pub fn bus_names(&self) -> Vec<String> {
        self.buses.iter().map(|b| b.name.clone()).collect()
    }
}

/// Message type → ordered sender names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingEntry {
    /// Concrete type, supertype or `*`
    pub message_type: String,
    pub senders: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SerializerConfig {
    pub default_serializer: String,
    pub symfony_serializer: SymfonySerializerConfig,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            default_serializer: DEFAULT_SERIALIZER_ID.to_string(),
            symfony_serializer: SymfonySerializerConfig::default(),
        }
    }
}

/// Options for the `messenger.transport.symfony_serializer` service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymfonySerializerConfig {
    pub format: String,
    pub context: Map<String, Value>,
}

impl Default for SymfonySerializerConfig {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
            context: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportConfig {
    pub name: String,
    pub dsn: String,
    /// Serializer service id; `None` means the default serializer.
    pub serializer: Option<String>,
    pub options: Map<String, Value>,
    pub retry_strategy: RetryStrategyConfig,
}

impl TransportConfig {
    pub fn new(name: impl Into<String>, dsn: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dsn: dsn.into(),
            serializer: None,
            options: Map::new(),
            retry_strategy: RetryStrategyConfig::default(),
        }
    }
}

/// How a transport computes retry delays.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategyConfig {
    /// Delegate to a strategy registered under this service id.
    Service(String),
    /// Multiplier backoff computed from these numbers.
    Policy(RetryPolicy),
}

impl Default for RetryStrategyConfig {
    fn default() -> Self {
        RetryStrategyConfig::Policy(RetryPolicy::default())
    }
}

/// Multiplier-based backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RetryPolicy {
    /// 0 disables retry
    pub max_retries: u32,
    /// Initial delay in milliseconds
    pub delay: u64,
    /// Growth factor per retry, at least 1
    pub multiplier: f64,
    /// Cap in milliseconds, 0 for no cap
    pub max_delay: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: 1000,
            multiplier: 2.0,
            max_delay: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultMiddleware {
    Enabled,
    Disabled,
    /// Default middleware, and dispatching a message nobody handles is not an error.
    AllowNoHandlers,
}

impl DefaultMiddleware {
    pub fn is_enabled(self) -> bool {
        !matches!(self, DefaultMiddleware::Disabled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusConfig {
    pub name: String,
    pub default_middleware: DefaultMiddleware,
    pub middleware: Vec<MiddlewareEntry>,
}

impl BusConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_middleware: DefaultMiddleware::Enabled,
            middleware: Vec::new(),
        }
    }
}

/// One pipeline stage: factory id plus the arguments passed to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MiddlewareEntry {
    pub id: String,
    pub arguments: Vec<Value>,
}

impl MiddlewareEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            arguments: Vec::new(),
        }
    }

    pub fn with_arguments(id: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            id: id.into(),
            arguments,
        }
    }
}
