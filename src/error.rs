use std::error::Error;
use std::fmt;

/// Invalid or contradictory messenger configuration.
///
/// Every variant names the key that caused it. Raised before any bus exists.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// Configuration text could not be parsed.
    Parse(String),
    /// A key that the schema does not know.
    UnrecognizedOption { path: String, key: String },
    /// A value of the wrong type or out of bounds.
    InvalidValue { path: String, reason: String },
    /// More than one bus and no `default_bus`.
    MissingDefaultBus,
    /// `default_bus` names a bus that is not configured.
    UnknownDefaultBus { name: String, available: Vec<String> },
    /// A transport entry without a DSN.
    MissingDsn { transport: String },
    /// `retry_strategy.service` combined with numeric retry options.
    ConflictingRetryStrategy { transport: String },
    /// A retry strategy service id nobody registered.
    UnknownRetryService { transport: String, service: String },
    /// A middleware entry that is neither an id, `{id, arguments}` nor `{id: arguments}`.
    InvalidMiddleware { bus: String, given: String },
    /// A middleware id with no registered factory.
    UnknownMiddleware { bus: String, id: String },
    /// A middleware factory rejected its arguments.
    MiddlewareArguments { bus: String, id: String, reason: String },
    /// The validation middleware was requested while validation is disabled.
    ValidationUnavailable { bus: String },
    /// A bus name that cannot be turned into an argument alias.
    InvalidArgumentAlias { bus: String, alias: String },
    /// A serializer id with no registered serializer.
    UnknownSerializer { transport: String, id: String },
    /// The JSON serializer was configured with a format it cannot produce.
    UnsupportedSerializerFormat(String),
    /// A routing key that is not a known message type.
    UnknownMessageType(String),
    /// A routing sender that is neither a transport nor a sender service.
    UnknownSender { message_type: String, sender: String },
    /// `failure_transport` is neither a transport nor a sender service.
    UnknownFailureTransport(String),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::Parse(msg) => write!(f, "invalid messenger configuration: {}", msg),
            ConfigurationError::UnrecognizedOption { path, key } => {
                write!(f, "unrecognized option \"{}\" under \"{}\"", key, path)
            }
            ConfigurationError::InvalidValue { path, reason } => {
                write!(f, "invalid value for \"{}\": {}", path, reason)
            }
            ConfigurationError::MissingDefaultBus => write!(
                f,
                "you must specify the \"default_bus\" if you define more than one bus"
            ),
            ConfigurationError::UnknownDefaultBus { name, available } => write!(
                f,
                "the specified default bus \"{}\" is not configured. Available buses are \"{}\"",
                name,
                available.join("\", \"")
            ),
            ConfigurationError::MissingDsn { transport } => {
                write!(f, "transport \"{}\" has no \"dsn\"", transport)
            }
            ConfigurationError::ConflictingRetryStrategy { transport } => write!(
                f,
                "transport \"{}\": the retry_strategy \"service\" cannot be used along with the other \"retry_strategy\" options",
                transport
            ),
            ConfigurationError::UnknownRetryService { transport, service } => write!(
                f,
                "transport \"{}\": retry strategy service \"{}\" is not registered",
                transport, service
            ),
            ConfigurationError::InvalidMiddleware { bus, given } => write!(
                f,
                "invalid middleware on bus \"{}\": a map with a single factory id as key and its arguments as value was expected, {} given",
                bus, given
            ),
            ConfigurationError::UnknownMiddleware { bus, id } => {
                write!(f, "bus \"{}\": no middleware factory registered for \"{}\"", bus, id)
            }
            ConfigurationError::MiddlewareArguments { bus, id, reason } => write!(
                f,
                "bus \"{}\": invalid arguments for middleware \"{}\": {}",
                bus, id, reason
            ),
            ConfigurationError::ValidationUnavailable { bus } => write!(
                f,
                "bus \"{}\": the validation middleware is only available when validation is enabled",
                bus
            ),
            ConfigurationError::InvalidArgumentAlias { bus, alias } => write!(
                f,
                "invalid argument name \"{}\" for bus \"{}\": the first character must be a letter",
                alias, bus
            ),
            ConfigurationError::UnknownSerializer { transport, id } => write!(
                f,
                "transport \"{}\": serializer \"{}\" is not registered",
                transport, id
            ),
            ConfigurationError::UnsupportedSerializerFormat(format) => {
                write!(f, "serializer format \"{}\" is not supported", format)
            }
            ConfigurationError::UnknownMessageType(message_type) => write!(
                f,
                "invalid routing configuration: message type \"{}\" not found",
                message_type
            ),
            ConfigurationError::UnknownSender {
                message_type,
                sender,
            } => write!(
                f,
                "invalid routing configuration: \"{}\" is routed to a sender called \"{}\", which is not a valid transport or service id",
                message_type, sender
            ),
            ConfigurationError::UnknownFailureTransport(name) => write!(
                f,
                "the failure transport \"{}\" is not a valid transport or service id",
                name
            ),
        }
    }
}

impl Error for ConfigurationError {}

/// A transport could not be built from its DSN.
#[derive(Debug)]
pub enum FactoryResolutionError {
    /// The DSN has no `scheme://` prefix.
    InvalidDsn { transport: String, dsn: String },
    /// No factory is registered for the DSN scheme.
    NoFactoryForScheme {
        transport: String,
        scheme: String,
        available: Vec<String>,
    },
    /// The factory was found but failed to create the transport.
    Factory {
        transport: String,
        source: Box<dyn Error + Send + Sync>,
    },
}

impl fmt::Display for FactoryResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactoryResolutionError::InvalidDsn { transport, dsn } => write!(
                f,
                "transport \"{}\": invalid DSN \"{}\" (expected \"scheme://...\")",
                transport, dsn
            ),
            FactoryResolutionError::NoFactoryForScheme {
                transport,
                scheme,
                available,
            } => write!(
                f,
                "transport \"{}\": no transport factory for scheme \"{}\" (available: {})",
                transport,
                scheme,
                available.join(", ")
            ),
            FactoryResolutionError::Factory { transport, source } => {
                write!(f, "transport \"{}\": factory failed: {}", transport, source)
            }
        }
    }
}

impl Error for FactoryResolutionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FactoryResolutionError::Factory { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Error returned by `MessengerBuilder::assemble`. No partial messenger is produced.
#[derive(Debug)]
pub enum AssemblyError {
    Configuration(ConfigurationError),
    FactoryResolution(FactoryResolutionError),
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyError::Configuration(e) => write!(f, "configuration error: {}", e),
            AssemblyError::FactoryResolution(e) => write!(f, "transport factory error: {}", e),
        }
    }
}

impl Error for AssemblyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AssemblyError::Configuration(e) => Some(e),
            AssemblyError::FactoryResolution(e) => Some(e),
        }
    }
}

impl From<ConfigurationError> for AssemblyError {
    fn from(err: ConfigurationError) -> Self {
        AssemblyError::Configuration(err)
    }
}

impl From<FactoryResolutionError> for AssemblyError {
    fn from(err: FactoryResolutionError) -> Self {
        AssemblyError::FactoryResolution(err)
    }
}

impl AssemblyError {
    /// The configuration error, if this is one.
    pub fn as_configuration(&self) -> Option<&ConfigurationError> {
        match self {
            AssemblyError::Configuration(e) => Some(e),
            _ => None,
        }
    }
}
