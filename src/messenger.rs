//! Messenger - one synchronous call from validated configuration to
//! assembled buses, transports, router and failure handling.
//!
//! ## Example
//!
//! ```
//! use messenger_bundle::{Envelope, Messenger, MessengerConfig};
//!
//! let config = MessengerConfig::from_json_str(r#"{
//!     "transports": { "async": "in-memory://" },
//!     "routing": { "SendEmail": "async" }
//! }"#).unwrap();
//!
//! let messenger = Messenger::builder(config)
//!     .handler("SendEmail", "mailer", |_envelope| Ok(()))
//!     .assemble()
//!     .unwrap();
//!
//! // Routed messages go to their transport...
//! let sent = messenger.default_bus().dispatch(Envelope::new("m-1", "SendEmail", Vec::new())).unwrap();
//! assert_eq!(sent.sent_to(), vec!["async"]);
//!
//! // ...and a worker consumes them.
//! let worker = messenger.worker(&["async"], None).unwrap();
//! assert_eq!(worker.run_once().unwrap().len(), 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::bus::{
    BusAssembler, BusRegistry, HandlersLocator, MessageBus, MiddlewareContext, MiddlewareFactory,
    MiddlewareRegistry, ValidatorFn,
};
use crate::config::{Capabilities, MessengerConfig, ValidationPolicy};
use crate::envelope::Envelope;
use crate::error::{AssemblyError, ConfigurationError};
use crate::failure::{FailedMessages, FailureTransport};
use crate::retry::{RetryStrategy, RetryStrategyLocator};
use crate::routing::{Router, SenderLocator};
use crate::serializer::{
    JsonSerializer, NativeSerializer, Serializer, SerializerRegistry, NATIVE_SERIALIZER_ID,
    SYMFONY_SERIALIZER_ID,
};
use crate::transport::{Transport, TransportFactory, TransportFactoryRegistry, TransportRegistry};
use crate::worker::Worker;

/// Collects the collaborator tables, then assembles a `Messenger`.
pub struct MessengerBuilder {
    config: MessengerConfig,
    debug: bool,
    validation: ValidationPolicy,
    capabilities: Capabilities,
    transport_factories: Vec<(String, Arc<dyn TransportFactory>)>,
    serializers: Vec<(String, Arc<dyn Serializer>)>,
    middleware: MiddlewareRegistry,
    handlers: HandlersLocator,
    retry_services: HashMap<String, Arc<dyn RetryStrategy>>,
    sender_services: HashMap<String, Arc<dyn Transport>>,
    known_message_types: Option<HashSet<String>>,
    validator: Option<Arc<ValidatorFn>>,
}

impl MessengerBuilder {
    fn new(config: MessengerConfig) -> Self {
        Self {
            config,
            debug: false,
            validation: ValidationPolicy::default(),
            capabilities: Capabilities::default(),
            transport_factories: Vec::new(),
            serializers: Vec::new(),
            middleware: MiddlewareRegistry::new(),
            handlers: HandlersLocator::new(),
            retry_services: HashMap::new(),
            sender_services: HashMap::new(),
            known_message_types: None,
            validator: None,
        }
    }

    /// Host debug flag. Adds `traceable` to every bus when tracing is available.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn validation(mut self, validation: ValidationPolicy) -> Self {
        self.validation = validation;
        self
    }

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Register a transport factory for a DSN scheme.
    pub fn transport_factory(mut self, scheme: &str, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport_factories.push((scheme.to_string(), factory));
        self
    }

    /// Register a serializer service that transports can name.
    pub fn serializer(mut self, id: &str, serializer: Arc<dyn Serializer>) -> Self {
        self.serializers.push((id.to_string(), serializer));
        self
    }

    /// Register a middleware factory under an id usable in bus configuration.
    pub fn middleware(mut self, id: &str, factory: Arc<dyn MiddlewareFactory>) -> Self {
        self.middleware.register(id, factory);
        self
    }

    /// Register a handler for a message type (or supertype).
    pub fn handler<F>(mut self, message_type: &str, name: &str, handler: F) -> Self
    where
        F: Fn(&Envelope) -> Result<(), Box<dyn Error + Send + Sync>> + Send + Sync + 'static,
    {
        self.handlers.register(message_type, name, Arc::new(handler));
        self
    }

    /// Register a retry strategy service for `retry_strategy.service`.
    pub fn retry_service(mut self, id: &str, strategy: Arc<dyn RetryStrategy>) -> Self {
        self.retry_services.insert(id.to_string(), strategy);
        self
    }

    /// Register an extra sender that routing may name.
    pub fn sender_service(mut self, id: &str, sender: Arc<dyn Transport>) -> Self {
        self.sender_services.insert(id.to_string(), sender);
        self
    }

    /// Restrict routing keys to these message types (plus `*`).
    pub fn known_message_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_message_types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Validator run by the `validation` middleware.
    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Envelope) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Validate the configuration and build everything. Nothing is returned
    /// unless every part assembled.
    pub fn assemble(self) -> Result<Messenger, AssemblyError> {
        let mut config = self.config;
        config.validate()?;
        let default_bus = config
            .default_bus
            .clone()
            .ok_or(ConfigurationError::MissingDefaultBus)?;

        let mut factories = TransportFactoryRegistry::new(self.capabilities);
        for (scheme, factory) in self.transport_factories {
            factories.register(&scheme, factory);
        }

        let mut serializers = SerializerRegistry::new();
        serializers.register(NATIVE_SERIALIZER_ID, Arc::new(NativeSerializer));
        if !config.transports.is_empty() {
            let symfony = &config.serializer.symfony_serializer;
            let json = JsonSerializer::new(&symfony.format, symfony.context.clone())?;
            serializers.register(SYMFONY_SERIALIZER_ID, Arc::new(json));
            serializers.set_default(config.serializer.default_serializer.clone());
        }
        for (id, serializer) in self.serializers {
            serializers.register(id, serializer);
        }

        let (transports, retry) = TransportRegistry::assemble(
            &config.transports,
            &factories,
            &serializers,
            &self.retry_services,
        )?;

        let senders = SenderLocator::new(&transports, &self.sender_services);
        let router = Arc::new(Router::build(
            &config.routing,
            senders.clone(),
            self.known_message_types.as_ref(),
        )?);

        let failure = match &config.failure_transport {
            Some(name) => {
                let transport = senders
                    .get(name)
                    .ok_or_else(|| ConfigurationError::UnknownFailureTransport(name.clone()))?;
                debug!(failure_transport = %name, "failure transport configured");
                Some(FailureTransport::new(senders.canonical_name(name), transport))
            }
            None => None,
        };

        let context = MiddlewareContext {
            bus: String::new(),
            router: Arc::clone(&router),
            handlers: Arc::new(self.handlers),
            validator: self.validator,
        };
        let buses = BusAssembler::new(&self.middleware)
            .debug(self.debug)
            .capabilities(self.capabilities)
            .validation(self.validation)
            .assemble(&config.buses, &default_bus, &context)?;

        info!(
            buses = buses.names().len(),
            transports = transports.len(),
            routes = router.routes().len(),
            default_bus = %default_bus,
            failure_transport = ?failure.as_ref().map(FailureTransport::name),
            "messenger assembled"
        );

        let failed = FailedMessages::new(failure.clone(), senders.clone());
        Ok(Messenger {
            config,
            buses,
            transports,
            senders,
            router,
            retry,
            failure,
            failed,
        })
    }
}

/// Everything assembled from one `MessengerConfig`.
pub struct Messenger {
    config: MessengerConfig,
    buses: BusRegistry,
    transports: TransportRegistry,
    senders: SenderLocator,
    router: Arc<Router>,
    retry: RetryStrategyLocator,
    failure: Option<FailureTransport>,
    failed: FailedMessages,
}

impl Messenger {
    pub fn builder(config: MessengerConfig) -> MessengerBuilder {
        MessengerBuilder::new(config)
    }

    /// The validated configuration the messenger was built from.
    pub fn config(&self) -> &MessengerConfig {
        &self.config
    }

    /// A bus by name or alias.
    pub fn bus(&self, name: &str) -> Option<Arc<MessageBus>> {
        self.buses.get(name)
    }

    pub fn default_bus(&self) -> Arc<MessageBus> {
        Arc::clone(self.buses.default_bus())
    }

    pub fn buses(&self) -> &BusRegistry {
        &self.buses
    }

    pub fn transports(&self) -> &TransportRegistry {
        &self.transports
    }

    /// A transport or sender service by name.
    pub fn transport(&self, name: &str) -> Option<Arc<dyn Transport>> {
        self.senders.get(name)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn retry_strategies(&self) -> &RetryStrategyLocator {
        &self.retry
    }

    pub fn failure_transport(&self) -> Option<&FailureTransport> {
        self.failure.as_ref()
    }

    pub fn failed_messages(&self) -> &FailedMessages {
        &self.failed
    }

    /// A worker consuming `receivers` in order. Envelopes are dispatched on
    /// the bus they were sent from, unless `bus` names one for all of them.
    pub fn worker(&self, receivers: &[&str], bus: Option<&str>) -> Result<Worker, ConfigurationError> {
        let bus = match bus {
            Some(name) => Some(self.buses.get(name).ok_or_else(|| ConfigurationError::InvalidValue {
                path: "bus".into(),
                reason: format!(
                    "\"{}\" is not a configured bus or alias. Available buses are \"{}\"",
                    name,
                    self.config.bus_names().join("\", \"")
                ),
            })?),
            None => None,
        };

        let mut resolved = Vec::with_capacity(receivers.len());
        for name in receivers {
            let transport = self
                .senders
                .get(name)
                .ok_or_else(|| ConfigurationError::InvalidValue {
                    path: format!("receivers.{}", name),
                    reason: "is not a configured transport".into(),
                })?;
            resolved.push((self.senders.canonical_name(name).to_string(), transport));
        }

        Ok(Worker::new(
            resolved,
            self.buses.clone(),
            bus,
            self.retry.clone(),
            self.failure.clone(),
        ))
    }

    /// JSON summary of buses, transports, routing and failure handling.
    pub fn describe(&self) -> Value {
        let default_name = self.buses.default_bus().name().to_string();
        let buses: Vec<Value> = self
            .buses
            .iter()
            .map(|bus| {
                let aliases: Vec<&str> = self
                    .buses
                    .aliases()
                    .iter()
                    .filter(|(_, target)| target.as_str() == bus.name())
                    .map(|(alias, _)| alias.as_str())
                    .collect();
                json!({
                    "name": bus.name(),
                    "default": bus.name() == default_name,
                    "aliases": aliases,
                    "middleware": bus.middleware(),
                })
            })
            .collect();

        let routing: Vec<Value> = self
            .router
            .routes()
            .iter()
            .map(|route| json!({ "message_type": route.message_type, "senders": route.senders }))
            .collect();

        json!({
            "default_bus": default_name,
            "buses": buses,
            "transports": self.transports.info(),
            "routing": routing,
            "failure_transport": self.failure.as_ref().map(FailureTransport::name),
            "default_serializer": self.config.serializer.default_serializer,
        })
    }
}
