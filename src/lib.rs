pub mod bus;
pub mod config;
pub mod envelope;
mod error;
pub mod failure;
#[cfg(feature = "http")]
pub mod http;
mod messenger;
pub mod retry;
pub mod routing;
pub mod serializer;
pub mod transport;
pub mod worker;

pub use bus::{BusRegistry, DispatchError, HandlersLocator, MessageBus, Middleware, Next};
pub use config::{Capabilities, MessengerConfig, ValidationPolicy};
pub use envelope::{Envelope, Stamp};
pub use error::{AssemblyError, ConfigurationError, FactoryResolutionError};
pub use failure::{FailedMessages, FailureError, FailureTransport};
pub use messenger::{Messenger, MessengerBuilder};
pub use retry::{MultiplierRetryStrategy, RetryStrategy};
pub use routing::Router;
pub use transport::{InMemoryTransport, Transport, TransportError};
pub use worker::{Outcome, Worker, WorkerHandle, WorkerStats};
