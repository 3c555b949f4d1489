// SPDX-License-Identifier: MIT OR Apache-2.0

use super::MessageDeserializer;
use crate::error::{BridgeError, BridgeResult};
use crate::transport::{Message, MessageBody};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Decodes object bodies written by the producer's OBJECT encoding (bincode)
pub struct ObjectDeserializer<V> {
    _value: PhantomData<fn() -> V>,
}

impl<V> ObjectDeserializer<V> {
    pub fn new() -> Self {
        Self {
            _value: PhantomData,
        }
    }
}

impl<V> Default for ObjectDeserializer<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for ObjectDeserializer<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ObjectDeserializer")
    }
}

impl<V: DeserializeOwned> MessageDeserializer<V> for ObjectDeserializer<V> {
    fn deserialize(&self, message: &dyn Message) -> BridgeResult<V> {
        match message.body() {
            MessageBody::Object(object) => bincode::deserialize(&object.data).map_err(|e| {
                BridgeError::deserialization(
                    format!("Failed to decode object of type '{}': {}", object.type_name, e),
                    e,
                )
            }),
            other => Err(BridgeError::unsupported_message(
                other.kind_name(),
                "ObjectDeserializer",
            )),
        }
    }
}
