// SPDX-License-Identifier: MIT OR Apache-2.0

use super::MessageDeserializer;
use crate::error::BridgeResult;
use crate::transport::{Message, MessageBody};

/// UTF-8 string deserializer, falling back to lossy decoding of byte bodies
#[derive(Debug, Clone, Copy, Default)]
pub struct StringDeserializer;

impl MessageDeserializer<String> for StringDeserializer {
    fn deserialize(&self, message: &dyn Message) -> BridgeResult<String> {
        Ok(match message.body() {
            MessageBody::Text(text) => text.clone(),
            MessageBody::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            MessageBody::Object(_) | MessageBody::Empty => String::new(),
        })
    }
}
