//! Message buses - named middleware pipelines.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  BusRegistry (per messenger)                 │
//! │  - name / alias → Arc<MessageBus>                            │
//! │  - default bus also as message_bus, messenger.default_bus    │
//! └─────────────────────────────────────────────────────────────┘
//!                            │ dispatch(envelope)
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Middleware pipeline (fixed)                  │
//! │  bus name stamp → redelivery reject → deferral → failed msg  │
//! │  → configured middleware → send_message → handle_message     │
//! └─────────────────────────────────────────────────────────────┘
//!          │                                         │
//!          ▼                                         ▼
//! ┌──────────────────────┐              ┌──────────────────────┐
//! │ Router → Transports  │              │   HandlersLocator    │
//! │   (routed messages)  │              │ (local + received)   │
//! └──────────────────────┘              └──────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use messenger_bundle::bus::{BusAssembler, HandlersLocator, MiddlewareContext, MiddlewareRegistry};
//! use messenger_bundle::config::BusConfig;
//! use messenger_bundle::envelope::Envelope;
//! use messenger_bundle::routing::{Router, SenderLocator};
//!
//! let registry = MiddlewareRegistry::new();
//! let context = MiddlewareContext {
//!     bus: String::new(),
//!     router: Arc::new(Router::build(&[], SenderLocator::default(), None).unwrap()),
//!     handlers: Arc::new(HandlersLocator::new().handler("Ping", "pong", |_| Ok(()))),
//!     validator: None,
//! };
//!
//! let buses = BusAssembler::new(&registry)
//!     .assemble(&[BusConfig::new("messenger.bus.default")], "messenger.bus.default", &context)
//!     .unwrap();
//!
//! let handled = buses.default_bus().dispatch(Envelope::new("m-1", "Ping", Vec::new())).unwrap();
//! assert!(handled.was_handled_by("pong"));
//! ```

mod assembler;
mod builtin;
mod error;
mod handlers;
mod message_bus;
mod middleware;

pub use assembler::{argument_alias, BusAssembler, BusRegistry, DEFAULT_BUS_ALIASES};
pub use builtin::{
    ADD_BUS_NAME_STAMP, DISPATCH_AFTER_CURRENT_BUS, FAILED_MESSAGE_PROCESSING, HANDLE_MESSAGE,
    REJECT_REDELIVERED, SEND_MESSAGE, TRACEABLE, VALIDATION,
};
pub use error::{DispatchError, HandlerFailure};
pub use handlers::{HandlerFn, HandlersLocator};
pub use message_bus::MessageBus;
pub use middleware::{
    Middleware, MiddlewareContext, MiddlewareFactory, MiddlewareRegistry, Next, ValidatorFn,
    MIDDLEWARE_ID_PREFIX,
};
