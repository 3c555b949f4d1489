// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound records and the values they carry.

use crate::error::{BridgeError, BridgeResult};
use crate::transport::Destination;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Encoding requested for a record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Bytes,
    Object,
    /// Picks Text, Bytes or Object from the value itself
    #[default]
    Auto,
}

impl MessageKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TEXT" => Some(Self::Text),
            "BYTES" => Some(Self::Bytes),
            "OBJECT" => Some(Self::Object),
            "AUTO" => Some(Self::Auto),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Bytes => "BYTES",
            Self::Object => "OBJECT",
            Self::Auto => "AUTO",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Encoder = dyn Fn() -> bincode::Result<Vec<u8>> + Send + Sync;

/// A value with a serialization contract, encoded with bincode on demand
#[derive(Clone)]
pub struct ObjectValue {
    type_name: &'static str,
    encode: Arc<Encoder>,
}

impl ObjectValue {
    pub fn new<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self {
            type_name: std::any::type_name::<T>(),
            encode: Arc::new(move || bincode::serialize(&value)),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Serialize the value; a failure is reported as not serializable
    pub fn encode(&self) -> BridgeResult<Vec<u8>> {
        (self.encode)().map_err(|e| {
            BridgeError::not_serializable_with_reason(self.type_name, e.to_string())
        })
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// A value without any serialization contract
#[derive(Clone)]
pub struct OpaqueValue {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl OpaqueValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            value: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaqueValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Runtime value of a record
#[derive(Debug, Clone)]
pub enum RecordValue {
    Text(String),
    Bytes(Vec<u8>),
    Object(ObjectValue),
    Opaque(OpaqueValue),
}

impl RecordValue {
    pub fn object<T>(value: T) -> Self
    where
        T: Serialize + Send + Sync + 'static,
    {
        Self::Object(ObjectValue::new(value))
    }

    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Self::Opaque(OpaqueValue::new(value))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "String",
            Self::Bytes(_) => "Vec<u8>",
            Self::Object(object) => object.type_name(),
            Self::Opaque(opaque) => opaque.type_name(),
        }
    }
}

impl From<String> for RecordValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for RecordValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for RecordValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for RecordValue {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

/// One message to send
#[derive(Debug, Clone)]
pub struct ProduceRecord {
    pub destination: Destination,
    pub kind: MessageKind,
    pub value: RecordValue,
}

impl ProduceRecord {
    pub fn new(destination: Destination, kind: MessageKind, value: impl Into<RecordValue>) -> Self {
        Self {
            destination,
            kind,
            value: value.into(),
        }
    }

    /// Record with [`MessageKind::Auto`]
    pub fn auto(destination: Destination, value: impl Into<RecordValue>) -> Self {
        Self::new(destination, MessageKind::Auto, value)
    }
}

/// Tallies of one batch send, handed to the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProduceMeters {
    pub records_to_produce: usize,
    pub produced_bytes: usize,
    pub produced_records: usize,
}
