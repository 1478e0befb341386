use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{is_local_stamp, EncodedEnvelope, Serializer};
use crate::envelope::{Envelope, Stamp};
use crate::error::ConfigurationError;
use crate::transport::TransportError;

pub const SYMFONY_SERIALIZER_ID: &str = "messenger.transport.symfony_serializer";

/// Human-readable JSON encoding; the message body is base64 encoded.
///
/// Configured by `serializer.symfony_serializer.{format, context}`. Only the
/// `json` format exists. A `pretty_print: true` context entry indents the
/// output; the whole context travels in the `X-Message-Context` header.
#[derive(Debug, Clone)]
pub struct JsonSerializer {
    format: String,
    context: Map<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct JsonEnvelope {
    id: String,
    message_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    supertypes: Vec<String>,
    #[serde(with = "body_serde")]
    body: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    stamps: Vec<Stamp>,
}

mod body_serde {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(body: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(body).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

impl Default for JsonSerializer {
    fn default() -> Self {
        Self {
            format: "json".to_string(),
            context: Map::new(),
        }
    }
}

impl JsonSerializer {
    pub fn new(format: &str, context: Map<String, Value>) -> Result<Self, ConfigurationError> {
        if !format.eq_ignore_ascii_case("json") {
            return Err(ConfigurationError::UnsupportedSerializerFormat(format.to_string()));
        }
        Ok(Self {
            format: format.to_ascii_lowercase(),
            context,
        })
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    fn pretty(&self) -> bool {
        self.context
            .get("pretty_print")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

impl Serializer for JsonSerializer {
    fn encode(&self, envelope: &Envelope) -> Result<EncodedEnvelope, TransportError> {
        let sendable = envelope.clone().without(is_local_stamp);
        let json = JsonEnvelope {
            id: sendable.id,
            message_type: sendable.message_type,
            supertypes: sendable.supertypes,
            body: sendable.body,
            stamps: sendable.stamps,
        };
        let body = if self.pretty() {
            serde_json::to_vec_pretty(&json)?
        } else {
            serde_json::to_vec(&json)?
        };

        let mut headers = BTreeMap::new();
        headers.insert("type".to_string(), envelope.message_type.clone());
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        if !self.context.is_empty() {
            headers.insert(
                "X-Message-Context".to_string(),
                Value::Object(self.context.clone()).to_string(),
            );
        }
        Ok(EncodedEnvelope { body, headers })
    }

    fn decode(&self, encoded: &EncodedEnvelope) -> Result<Envelope, TransportError> {
        let json: JsonEnvelope = serde_json::from_slice(&encoded.body)?;
        Ok(Envelope {
            id: json.id,
            message_type: json.message_type,
            supertypes: json.supertypes,
            body: json.body,
            stamps: json.stamps,
        })
    }
}
