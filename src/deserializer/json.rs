// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON deserializer over text or byte bodies.
//!
//! Strict by default: a JSON object field that the target type does not know is an
//! error. The check decodes the value, encodes it again and looks for raw fields missing
//! from that echo, so it works for any `Serialize + DeserializeOwned` type without
//! requiring `#[serde(deny_unknown_fields)]` on it. A field whose raw value is `null`
//! is tolerated, since skipped `None` fields are not echoed either.

use super::MessageDeserializer;
use crate::error::{BridgeError, BridgeResult};
use crate::transport::{Message, MessageBody};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::marker::PhantomData;

pub struct JsonDeserializer<V> {
    strict: bool,
    _value: PhantomData<fn() -> V>,
}

impl<V> JsonDeserializer<V> {
    pub fn new() -> Self {
        Self {
            strict: true,
            _value: PhantomData,
        }
    }

    /// Accept JSON objects carrying fields the target type does not declare
    pub fn ignore_unknown_fields(mut self) -> Self {
        self.strict = false;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }
}

impl<V> Default for JsonDeserializer<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for JsonDeserializer<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonDeserializer")
            .field("strict", &self.strict)
            .finish()
    }
}

impl<V> MessageDeserializer<V> for JsonDeserializer<V>
where
    V: DeserializeOwned + Serialize,
{
    fn deserialize(&self, message: &dyn Message) -> BridgeResult<V> {
        let payload = match message.body() {
            MessageBody::Text(text) => text.as_bytes(),
            MessageBody::Bytes(bytes) => bytes.as_slice(),
            other => {
                return Err(BridgeError::unsupported_message(
                    other.kind_name(),
                    "JsonDeserializer",
                ))
            }
        };

        let raw: JsonValue = serde_json::from_slice(payload)
            .map_err(|e| BridgeError::deserialization(format!("Invalid JSON payload: {}", e), e))?;

        if !self.strict {
            return serde_json::from_value(raw).map_err(|e| {
                BridgeError::deserialization(format!("JSON does not match target type: {}", e), e)
            });
        }

        let value: V = serde_json::from_value(raw.clone()).map_err(|e| {
            BridgeError::deserialization(format!("JSON does not match target type: {}", e), e)
        })?;
        let echo = serde_json::to_value(&value).map_err(|e| {
            BridgeError::deserialization(format!("Decoded value cannot be checked: {}", e), e)
        })?;

        let mut unknown = Vec::new();
        collect_unknown_fields(&raw, &echo, "", &mut unknown);
        if !unknown.is_empty() {
            return Err(BridgeError::Deserialization {
                message: format!("Unknown fields: {}", unknown.join(", ")),
                source: None,
            });
        }
        Ok(value)
    }
}

fn collect_unknown_fields(raw: &JsonValue, echo: &JsonValue, path: &str, unknown: &mut Vec<String>) {
    match (raw, echo) {
        (JsonValue::Object(raw_fields), JsonValue::Object(echo_fields)) => {
            for (key, raw_value) in raw_fields {
                let field_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                match echo_fields.get(key) {
                    Some(echo_value) => {
                        collect_unknown_fields(raw_value, echo_value, &field_path, unknown)
                    }
                    None if raw_value.is_null() => {}
                    None => unknown.push(field_path),
                }
            }
        }
        (JsonValue::Array(raw_items), JsonValue::Array(echo_items)) => {
            for (index, (raw_item, echo_item)) in raw_items.iter().zip(echo_items).enumerate() {
                collect_unknown_fields(raw_item, echo_item, &format!("{}[{}]", path, index), unknown);
            }
        }
        _ => {}
    }
}
