// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Message Deserializers
//!
//! Turn the body of an inbound message into the value handed downstream.
//!
//! | Deserializer         | Text body        | Bytes body           | Object body  |
//! |----------------------|------------------|----------------------|--------------|
//! | `StringDeserializer` | as is            | UTF-8 (lossy)        | `""`         |
//! | `JsonDeserializer`   | JSON             | JSON                 | error        |
//! | `ObjectDeserializer` | error            | error                | bincode      |
//!
//! Failures are returned to the caller; the consumer never swallows them.

pub mod json;
pub mod object;
pub mod string;

pub use json::JsonDeserializer;
pub use object::ObjectDeserializer;
pub use string::StringDeserializer;

use crate::error::BridgeResult;
use crate::transport::Message;

/// Decoder from a transport message to a typed value
pub trait MessageDeserializer<V>: Send + Sync {
    fn deserialize(&self, message: &dyn Message) -> BridgeResult<V>;
}
