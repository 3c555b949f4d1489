// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Transport Boundary
//!
//! Traits describing the message-queue client that the consumer and producer drive.
//! The connector never implements broker semantics itself; it only opens connections,
//! sessions, senders and receivers through these traits.
//!
//! ```text
//! ConnectionFactory ──create_connection()──▶ Connection ──create_session()──▶ Session
//!                                                                 │
//!                         ┌───────────────────────────────────────┼──────────────────┐
//!                         ▼                                       ▼                  ▼
//!              create_receiver(dest, listener)          create_sender(dest)   create_*_message()
//! ```
//!
//! Two implementations ship with the crate: [`memory::InMemoryBroker`] (in-process) and
//! [`amqp::AmqpConnectionFactory`] (AMQP 0-9-1 through `lapin`).

pub mod amqp;
pub mod memory;

use crate::error::BridgeResult;
use async_trait::async_trait;
use std::fmt::{self, Debug, Display};
use std::sync::Arc;

/// Kind of a transport destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationKind {
    /// Point-to-point: each message is consumed by one receiver
    Queue,
    /// Publish/subscribe: each message reaches every active subscriber
    Topic,
}

impl DestinationKind {
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DestinationKind::Queue => "queue",
            DestinationKind::Topic => "topic",
        }
    }
}

/// Identity of a queue or topic.
///
/// Two destinations are equal when both kind and name match, which is what the
/// sender registry keys on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    kind: DestinationKind,
    name: Arc<str>,
}

impl Destination {
    pub fn queue(name: impl AsRef<str>) -> Self {
        Self {
            kind: DestinationKind::Queue,
            name: Arc::from(name.as_ref()),
        }
    }

    pub fn topic(name: impl AsRef<str>) -> Self {
        Self {
            kind: DestinationKind::Topic,
            name: Arc::from(name.as_ref()),
        }
    }

    #[inline]
    pub fn kind(&self) -> DestinationKind {
        self.kind
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_queue(&self) -> bool {
        self.kind == DestinationKind::Queue
    }
}

impl Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.kind.as_str(), self.name)
    }
}

/// Serialized object carried by an object message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPayload {
    /// Rust type name of the value that was serialized
    pub type_name: String,
    /// bincode encoding of the value
    pub data: Vec<u8>,
}

/// Body of a transport message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Bytes(Vec<u8>),
    Object(ObjectPayload),
    Empty,
}

impl MessageBody {
    pub fn kind_name(&self) -> &'static str {
        match self {
            MessageBody::Text(_) => "text",
            MessageBody::Bytes(_) => "bytes",
            MessageBody::Object(_) => "object",
            MessageBody::Empty => "empty",
        }
    }
}

/// A message as seen by the connector.
///
/// Header reads are fallible because some clients decode them lazily; callers that only
/// need best-effort metadata turn a failed read into an absent value.
pub trait Message: Debug + Send + Sync {
    /// Destination the message was sent to or received from
    fn destination(&self) -> Option<Destination>;

    fn body(&self) -> &MessageBody;

    fn message_id(&self) -> BridgeResult<Option<String>> {
        Ok(None)
    }

    fn correlation_id(&self) -> BridgeResult<Option<String>> {
        Ok(None)
    }

    /// Priority from 0 (lowest) to 9 (highest)
    fn priority(&self) -> BridgeResult<Option<i32>> {
        Ok(None)
    }

    /// Expiration as epoch milliseconds
    fn expiration(&self) -> BridgeResult<Option<i64>> {
        Ok(None)
    }

    /// Earliest delivery time as epoch milliseconds
    fn delivery_time(&self) -> BridgeResult<Option<i64>> {
        Ok(None)
    }

    /// Time the message was handed off to the transport, as epoch milliseconds
    fn timestamp(&self) -> BridgeResult<Option<i64>> {
        Ok(None)
    }
}

/// Message headers kept by [`TransportMessage`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    pub priority: Option<i32>,
    pub expiration: Option<i64>,
    pub delivery_time: Option<i64>,
    pub timestamp: Option<i64>,
}

/// Plain message value created by session message factories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    pub destination: Option<Destination>,
    pub body: MessageBody,
    pub headers: MessageHeaders,
}

impl TransportMessage {
    pub fn new(body: MessageBody) -> Self {
        Self {
            destination: None,
            body,
            headers: MessageHeaders::default(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(MessageBody::Text(text.into()))
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(MessageBody::Bytes(bytes.into()))
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_headers(mut self, headers: MessageHeaders) -> Self {
        self.headers = headers;
        self
    }

    /// Copy the body and headers of any message into a plain value
    pub fn from_message(message: &dyn Message) -> Self {
        Self {
            destination: message.destination(),
            body: message.body().clone(),
            headers: MessageHeaders {
                message_id: message.message_id().ok().flatten(),
                correlation_id: message.correlation_id().ok().flatten(),
                priority: message.priority().ok().flatten(),
                expiration: message.expiration().ok().flatten(),
                delivery_time: message.delivery_time().ok().flatten(),
                timestamp: message.timestamp().ok().flatten(),
            },
        }
    }
}

impl Message for TransportMessage {
    fn destination(&self) -> Option<Destination> {
        self.destination.clone()
    }

    fn body(&self) -> &MessageBody {
        &self.body
    }

    fn message_id(&self) -> BridgeResult<Option<String>> {
        Ok(self.headers.message_id.clone())
    }

    fn correlation_id(&self) -> BridgeResult<Option<String>> {
        Ok(self.headers.correlation_id.clone())
    }

    fn priority(&self) -> BridgeResult<Option<i32>> {
        Ok(self.headers.priority)
    }

    fn expiration(&self) -> BridgeResult<Option<i64>> {
        Ok(self.headers.expiration)
    }

    fn delivery_time(&self) -> BridgeResult<Option<i64>> {
        Ok(self.headers.delivery_time)
    }

    fn timestamp(&self) -> BridgeResult<Option<i64>> {
        Ok(self.headers.timestamp)
    }
}

/// Callback invoked by the transport, on its own delivery context, for every message
/// delivered to a receiver.
pub trait MessageListener: Send + Sync {
    /// An error is fatal for the delivery attempt and must be surfaced by the transport.
    fn on_message(&self, message: Box<dyn Message>) -> BridgeResult<()>;
}

/// Supplier of connections, invoked once per `start()`
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create_connection(&self) -> BridgeResult<Arc<dyn Connection>>;
}

#[async_trait]
pub trait Connection: Send + Sync {
    async fn create_session(&self) -> BridgeResult<Arc<dyn Session>>;

    /// Start (or resume) message delivery to the receivers of this connection
    async fn start(&self) -> BridgeResult<()>;

    /// Pause message delivery; the connection stays usable
    async fn stop(&self) -> BridgeResult<()>;

    /// Release the connection
    async fn close(&self) -> BridgeResult<()> {
        Ok(())
    }
}

#[async_trait]
pub trait Session: Send + Sync {
    fn create_text_message(&self, text: String) -> BridgeResult<Box<dyn Message>>;

    fn create_bytes_message(&self, bytes: Vec<u8>) -> BridgeResult<Box<dyn Message>>;

    fn create_object_message(&self, object: ObjectPayload) -> BridgeResult<Box<dyn Message>>;

    async fn create_sender(&self, destination: &Destination) -> BridgeResult<Box<dyn Sender>>;

    async fn create_receiver(
        &self,
        destination: &Destination,
        listener: Arc<dyn MessageListener>,
    ) -> BridgeResult<Box<dyn Receiver>>;
}

#[async_trait]
pub trait Sender: Send + Sync {
    fn destination(&self) -> &Destination;

    async fn send(&self, message: Box<dyn Message>) -> BridgeResult<()>;

    async fn close(&self) -> BridgeResult<()>;
}

#[async_trait]
pub trait Receiver: Send + Sync {
    fn destination(&self) -> &Destination;

    async fn close(&self) -> BridgeResult<()>;
}
