// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Producer Converter
//!
//! Maps a [`ProduceRecord`] to a transport message, using the session as message factory.
//!
//! | Kind     | Accepted value          | Message | Counted bytes |
//! |----------|-------------------------|---------|---------------|
//! | `TEXT`   | `Text`                  | text    | UTF-8 length  |
//! | `BYTES`  | `Bytes`                 | bytes   | payload length|
//! | `OBJECT` | `Text`, `Bytes`, `Object` | object | 0            |
//! | `AUTO`   | any                     | resolved from the value | as resolved |
//!
//! Encoding failures (`ValueMismatch`, `NotSerializable`) happen before the session is
//! asked for a message.

use super::record::{MessageKind, ProduceRecord, RecordValue};
use crate::error::{BridgeError, BridgeResult};
use crate::transport::{Message, ObjectPayload, Session};

/// Message ready to send plus the bytes it adds to the batch tally
#[derive(Debug)]
pub struct EncodedMessage {
    pub message: Box<dyn Message>,
    pub payload_bytes: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProducerConverter;

impl ProducerConverter {
    pub fn convert(&self, record: &ProduceRecord, session: &dyn Session) -> BridgeResult<EncodedMessage> {
        match (record.kind, &record.value) {
            (MessageKind::Text, RecordValue::Text(text)) | (MessageKind::Auto, RecordValue::Text(text)) => {
                Self::text(text, session)
            }
            (MessageKind::Bytes, RecordValue::Bytes(bytes))
            | (MessageKind::Auto, RecordValue::Bytes(bytes)) => Self::bytes(bytes, session),
            (MessageKind::Text, other) | (MessageKind::Bytes, other) => Err(BridgeError::value_mismatch(
                record.kind.as_str(),
                other.type_name(),
            )),
            (MessageKind::Object, value) | (MessageKind::Auto, value) => Self::object(value, session),
        }
    }

    fn text(text: &str, session: &dyn Session) -> BridgeResult<EncodedMessage> {
        Ok(EncodedMessage {
            message: session.create_text_message(text.to_string())?,
            payload_bytes: text.len(),
        })
    }

    fn bytes(bytes: &[u8], session: &dyn Session) -> BridgeResult<EncodedMessage> {
        Ok(EncodedMessage {
            message: session.create_bytes_message(bytes.to_vec())?,
            payload_bytes: bytes.len(),
        })
    }

    fn object(value: &RecordValue, session: &dyn Session) -> BridgeResult<EncodedMessage> {
        let payload = match value {
            RecordValue::Object(object) => ObjectPayload {
                type_name: object.type_name().to_string(),
                data: object.encode()?,
            },
            RecordValue::Text(text) => ObjectPayload {
                type_name: value.type_name().to_string(),
                data: bincode::serialize(text).map_err(|e| {
                    BridgeError::not_serializable_with_reason(value.type_name(), e.to_string())
                })?,
            },
            RecordValue::Bytes(bytes) => ObjectPayload {
                type_name: value.type_name().to_string(),
                data: bincode::serialize(bytes).map_err(|e| {
                    BridgeError::not_serializable_with_reason(value.type_name(), e.to_string())
                })?,
            },
            RecordValue::Opaque(opaque) => {
                return Err(BridgeError::not_serializable(opaque.type_name()))
            }
        };

        Ok(EncodedMessage {
            message: session.create_object_message(payload)?,
            payload_bytes: 0,
        })
    }
}
