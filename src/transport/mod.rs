//! Transports - named channels that store and hand out envelopes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  TransportRegistry (per messenger)            │
//! │  - name → Arc<dyn Transport>                                  │
//! │  - built from TransportConfig via TransportFactoryRegistry    │
//! └──────────────────────────────────────────────────────────────┘
//!                            │ DSN scheme
//!                            ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    TransportFactory trait                     │
//! │  create(dsn, options, serializer) → Arc<dyn Transport>        │
//! └──────────────────────────────────────────────────────────────┘
//!          │                  │                     │
//!          ▼                  ▼                     ▼
//! ┌─────────────────┐  ┌─────────────┐   ┌──────────────────────┐
//! │InMemoryTransport│  │ amqp://     │   │ redis:// sqs:// ...  │
//! │   (included)    │  │ (embedder)  │   │     (embedder)       │
//! └─────────────────┘  └─────────────┘   └──────────────────────┘
//! ```

mod dsn;
mod error;
mod factory;
mod in_memory;
mod registry;

pub use dsn::Dsn;
pub use error::TransportError;
pub use factory::{TransportFactory, TransportFactoryRegistry, TransportOptions, IN_MEMORY_SCHEME};
pub use in_memory::InMemoryTransport;
pub use registry::{transport_service_id, TransportInfo, TransportRegistry};

use crate::envelope::Envelope;

/// A channel that can both send and receive envelopes.
///
/// Receiving is pull-based: `get()` hands out envelopes which stay reserved
/// until they are acknowledged or rejected. Delivery is at-least-once.
pub trait Transport: Send + Sync {
    /// Store an envelope. Returns it with the transport's message id stamped on.
    fn send(&self, envelope: Envelope) -> Result<Envelope, TransportError>;

    /// Take the next available envelopes (possibly none) for processing.
    fn get(&self) -> Result<Vec<Envelope>, TransportError>;

    /// Acknowledge that an envelope has been processed.
    fn ack(&self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Drop an envelope without processing it.
    fn reject(&self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Browse support, used by the failed-message administration.
    fn as_listable(&self) -> Option<&dyn ListableReceiver> {
        None
    }
}

/// A receiver whose stored envelopes can be browsed without consuming them.
pub trait ListableReceiver: Send + Sync {
    fn all(&self, limit: Option<usize>) -> Result<Vec<Envelope>, TransportError>;

    fn find(&self, id: &str) -> Result<Option<Envelope>, TransportError>;
}
