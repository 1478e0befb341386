use std::collections::BTreeMap;

use super::{is_local_stamp, EncodedEnvelope, Serializer};
use crate::envelope::Envelope;
use crate::transport::TransportError;

pub const NATIVE_SERIALIZER_ID: &str = "messenger.transport.native_serializer";

/// Compact binary encoding of the whole envelope with bitcode.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeSerializer;

impl Serializer for NativeSerializer {
    fn encode(&self, envelope: &Envelope) -> Result<EncodedEnvelope, TransportError> {
        let sendable = envelope.clone().without(is_local_stamp);
        let body = bitcode::serialize(&sendable)?;

        let mut headers = BTreeMap::new();
        headers.insert("type".to_string(), envelope.message_type.clone());
        Ok(EncodedEnvelope { body, headers })
    }

    fn decode(&self, encoded: &EncodedEnvelope) -> Result<Envelope, TransportError> {
        if encoded.body.is_empty() {
            return Err(TransportError::SerializationFailed(
                "encoded envelope body is empty".into(),
            ));
        }
        Ok(bitcode::deserialize(&encoded.body)?)
    }
}
