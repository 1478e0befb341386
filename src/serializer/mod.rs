//! Serializers - envelope ⇄ bytes + headers for transports.

mod json;
mod native;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub use json::{JsonSerializer, SYMFONY_SERIALIZER_ID};
pub use native::{NativeSerializer, NATIVE_SERIALIZER_ID};

use crate::envelope::{Envelope, Stamp};
use crate::transport::TransportError;

/// Alias resolving to `serializer.default_serializer`.
pub const DEFAULT_SERIALIZER_ALIAS: &str = "messenger.default_serializer";

/// What a transport actually stores.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedEnvelope {
    pub body: Vec<u8>,
    pub headers: BTreeMap<String, String>,
}

pub trait Serializer: Send + Sync {
    fn encode(&self, envelope: &Envelope) -> Result<EncodedEnvelope, TransportError>;

    fn decode(&self, encoded: &EncodedEnvelope) -> Result<Envelope, TransportError>;
}

/// Stamps that describe one delivery and must not travel with the message.
pub(crate) fn is_local_stamp(stamp: &Stamp) -> bool {
    matches!(
        stamp,
        Stamp::Received { .. } | Stamp::TransportMessageId(_)
    )
}

/// Serializer id → serializer, plus the default-serializer alias.
#[derive(Clone, Default)]
pub struct SerializerRegistry {
    serializers: HashMap<String, Arc<dyn Serializer>>,
    default_alias: Option<String>,
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: impl Into<String>, serializer: Arc<dyn Serializer>) {
        self.serializers.insert(id.into(), serializer);
    }

    /// Point `messenger.default_serializer` at `id`.
    pub fn set_default(&mut self, id: impl Into<String>) {
        self.default_alias = Some(id.into());
    }

    pub fn default_id(&self) -> Option<&str> {
        self.default_alias.as_deref()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Look up an id, following the default alias.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Serializer>> {
        if id == DEFAULT_SERIALIZER_ALIAS {
            return self
                .default_alias
                .as_deref()
                .and_then(|target| self.serializers.get(target))
                .cloned();
        }
        self.serializers.get(id).cloned()
    }
}
