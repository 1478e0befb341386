//! Middleware trait, the pipeline cursor and middleware factories.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::{DispatchError, HandlersLocator};
use crate::envelope::Envelope;
use crate::routing::Router;

/// Prefix tried when a middleware id is not registered as given.
pub const MIDDLEWARE_ID_PREFIX: &str = "messenger.middleware.";

/// One stage of a bus pipeline.
pub trait Middleware: Send + Sync {
    /// Process the envelope, usually by calling `next.handle(envelope)`.
    fn handle(&self, envelope: Envelope, next: Next<'_>) -> Result<Envelope, DispatchError>;
}

/// The rest of the pipeline after the current middleware.
///
/// `Copy`, so a middleware may run it more than once.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(pipeline: &'a [Arc<dyn Middleware>]) -> Self {
        Self { rest: pipeline }
    }

    pub fn handle(self, envelope: Envelope) -> Result<Envelope, DispatchError> {
        match self.rest.split_first() {
            Some((middleware, rest)) => middleware.handle(envelope, Next { rest }),
            None => Ok(envelope),
        }
    }
}

/// Validator used by the `validation` middleware.
pub type ValidatorFn = dyn Fn(&Envelope) -> Result<(), String> + Send + Sync;

/// What a middleware factory can see while a bus is assembled.
#[derive(Clone)]
pub struct MiddlewareContext {
    pub bus: String,
    pub router: Arc<Router>,
    pub handlers: Arc<HandlersLocator>,
    pub validator: Option<Arc<ValidatorFn>>,
}

/// Builds a middleware instance for one bus.
///
/// Implemented for closures. Returning `Err` rejects the configured
/// arguments and fails assembly.
pub trait MiddlewareFactory: Send + Sync {
    fn create(
        &self,
        context: &MiddlewareContext,
        arguments: &[Value],
    ) -> Result<Arc<dyn Middleware>, String>;
}

impl<F> MiddlewareFactory for F
where
    F: Fn(&MiddlewareContext, &[Value]) -> Result<Arc<dyn Middleware>, String> + Send + Sync,
{
    fn create(
        &self,
        context: &MiddlewareContext,
        arguments: &[Value],
    ) -> Result<Arc<dyn Middleware>, String> {
        self(context, arguments)
    }
}

/// Middleware id → factory.
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    factories: BTreeMap<String, Arc<dyn MiddlewareFactory>>,
}

impl MiddlewareRegistry {
    /// A registry holding the built-in middleware.
    pub fn new() -> Self {
        let mut registry = Self::default();
        super::builtin::register(&mut registry);
        registry
    }

    /// An empty registry, without the built-in middleware.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: impl Into<String>, factory: Arc<dyn MiddlewareFactory>) {
        self.factories.insert(id.into(), factory);
    }

    /// Look up `id`, then `messenger.middleware.<id>`. Returns the id that matched.
    pub fn resolve(&self, id: &str) -> Option<(String, Arc<dyn MiddlewareFactory>)> {
        if let Some(factory) = self.factories.get(id) {
            return Some((id.to_string(), Arc::clone(factory)));
        }
        let prefixed = format!("{}{}", MIDDLEWARE_ID_PREFIX, id);
        self.factories
            .get(&prefixed)
            .map(|factory| (prefixed, Arc::clone(factory)))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
