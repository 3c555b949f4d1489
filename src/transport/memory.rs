// SPDX-License-Identifier: MIT OR Apache-2.0

//! # In-Memory Broker
//!
//! Process-local implementation of the transport boundary, used by tests and for
//! rehearsing a scenario without a broker.
//!
//! - **Queues** are point-to-point: a message goes to one receiver of a started connection
//!   (round-robin), or stays in the queue backlog until such a receiver exists.
//! - **Topics** are publish/subscribe: every receiver gets a copy. Receivers of a stopped
//!   connection get it once the connection starts again; without any receiver the message
//!   is dropped.
//!
//! Delivery happens synchronously on the context that sends (or starts the connection).
//! The broker also counts what the connector does to it (senders and receivers opened,
//! sender creations per destination, message factory calls) and can be told to fail sends
//! to a destination.

use super::{
    Connection, ConnectionFactory, Destination, Message, MessageBody, MessageHeaders,
    MessageListener, ObjectPayload, Receiver, Sender, Session, TransportMessage,
};
use crate::error::{BridgeError, BridgeResult};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Default priority stamped on messages that do not carry one
const DEFAULT_PRIORITY: i32 = 4;

/// Number of calls made to each session message factory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageFactoryCalls {
    pub text: usize,
    pub bytes: usize,
    pub object: usize,
}

impl MessageFactoryCalls {
    pub fn total(&self) -> usize {
        self.text + self.bytes + self.object
    }
}

/// Shared, cheaply cloneable in-process broker
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

#[derive(Default)]
struct BrokerInner {
    routing: Mutex<RoutingState>,
    next_id: AtomicU64,
    connections_created: AtomicUsize,
    open_senders: AtomicUsize,
    sender_creations: DashMap<Destination, usize>,
    failing_destinations: DashSet<Destination>,
    text_messages: AtomicUsize,
    bytes_messages: AtomicUsize,
    object_messages: AtomicUsize,
    sends: AtomicUsize,
    delivery_failures: AtomicUsize,
}

#[derive(Default)]
struct RoutingState {
    receivers: Vec<ReceiverEntry>,
    backlog: HashMap<Destination, VecDeque<TransportMessage>>,
    cursors: HashMap<Destination, usize>,
}

#[derive(Clone)]
struct ReceiverEntry {
    id: u64,
    destination: Destination,
    listener: Arc<dyn MessageListener>,
    connection: Arc<ConnectionState>,
}

#[derive(Default)]
struct ConnectionState {
    started: AtomicBool,
    closed: AtomicBool,
    pending: Mutex<Vec<(Arc<dyn MessageListener>, TransportMessage)>>,
}

type Delivery = (Arc<dyn MessageListener>, TransportMessage);

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory creating connections to this broker
    pub fn connection_factory(&self) -> Arc<dyn ConnectionFactory> {
        Arc::new(InMemoryConnectionFactory {
            broker: self.clone(),
        })
    }

    /// Publish a message from outside the connector, as another client of the broker would
    pub fn publish(&self, destination: &Destination, message: TransportMessage) {
        let message = self.stamp(destination, message);
        self.route(destination, message);
    }

    /// Number of connections created through any factory of this broker
    pub fn connections_created(&self) -> usize {
        self.inner.connections_created.load(Ordering::SeqCst)
    }

    /// Number of senders created and not yet closed
    pub fn open_senders(&self) -> usize {
        self.inner.open_senders.load(Ordering::SeqCst)
    }

    /// Number of receivers created and not yet closed
    pub fn open_receivers(&self) -> usize {
        self.routing().receivers.len()
    }

    /// Number of times a sender was created for `destination`
    pub fn sender_creations(&self, destination: &Destination) -> usize {
        self.inner
            .sender_creations
            .get(destination)
            .map(|count| *count)
            .unwrap_or(0)
    }

    pub fn message_factory_calls(&self) -> MessageFactoryCalls {
        MessageFactoryCalls {
            text: self.inner.text_messages.load(Ordering::SeqCst),
            bytes: self.inner.bytes_messages.load(Ordering::SeqCst),
            object: self.inner.object_messages.load(Ordering::SeqCst),
        }
    }

    /// Number of messages accepted by senders
    pub fn sends(&self) -> usize {
        self.inner.sends.load(Ordering::SeqCst)
    }

    /// Number of deliveries a listener refused
    pub fn delivery_failures(&self) -> usize {
        self.inner.delivery_failures.load(Ordering::SeqCst)
    }

    /// Number of messages waiting in a queue for a receiver
    pub fn backlog(&self, destination: &Destination) -> usize {
        self.routing()
            .backlog
            .get(destination)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// Remove and return the messages waiting in a queue
    pub fn drain_backlog(&self, destination: &Destination) -> Vec<TransportMessage> {
        self.routing()
            .backlog
            .remove(destination)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Make every send to `destination` fail until [`Self::restore_sends_to`] is called
    pub fn fail_sends_to(&self, destination: Destination) {
        self.inner.failing_destinations.insert(destination);
    }

    pub fn restore_sends_to(&self, destination: &Destination) {
        self.inner.failing_destinations.remove(destination);
    }

    fn routing(&self) -> std::sync::MutexGuard<'_, RoutingState> {
        // A panicking listener must not make the broker unusable for the rest of a test run
        self.inner
            .routing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn stamp(&self, destination: &Destination, mut message: TransportMessage) -> TransportMessage {
        let now = chrono::Utc::now().timestamp_millis();
        let headers = &mut message.headers;
        if headers.message_id.is_none() {
            headers.message_id = Some(format!("ID:{}", uuid::Uuid::new_v4()));
        }
        headers.timestamp.get_or_insert(now);
        headers.delivery_time.get_or_insert(now);
        headers.priority.get_or_insert(DEFAULT_PRIORITY);
        headers.expiration.get_or_insert(0);
        message.destination = Some(destination.clone());
        message
    }

    fn route(&self, destination: &Destination, message: TransportMessage) {
        let deliveries = {
            let mut routing = self.routing();
            if destination.is_queue() {
                Self::route_to_queue(&mut routing, destination, message)
            } else {
                Self::route_to_topic(&routing, destination, message)
            }
        };
        self.deliver(deliveries);
    }

    fn route_to_queue(
        routing: &mut RoutingState,
        destination: &Destination,
        message: TransportMessage,
    ) -> Vec<Delivery> {
        let active: Vec<Arc<dyn MessageListener>> = routing
            .receivers
            .iter()
            .filter(|r| &r.destination == destination && r.connection.is_started())
            .map(|r| Arc::clone(&r.listener))
            .collect();

        if active.is_empty() {
            routing
                .backlog
                .entry(destination.clone())
                .or_default()
                .push_back(message);
            return Vec::new();
        }

        let cursor = routing.cursors.entry(destination.clone()).or_insert(0);
        let listener = Arc::clone(&active[*cursor % active.len()]);
        *cursor = cursor.wrapping_add(1);
        vec![(listener, message)]
    }

    fn route_to_topic(
        routing: &RoutingState,
        destination: &Destination,
        message: TransportMessage,
    ) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        for receiver in routing.receivers.iter().filter(|r| &r.destination == destination) {
            if receiver.connection.is_started() {
                deliveries.push((Arc::clone(&receiver.listener), message.clone()));
            } else {
                receiver
                    .connection
                    .pending()
                    .push((Arc::clone(&receiver.listener), message.clone()));
            }
        }
        deliveries
    }

    /// Hand queued messages to receivers that became able to take them
    fn flush_backlog(&self) {
        let deliveries = {
            let mut routing = self.routing();
            let destinations: Vec<Destination> = routing.backlog.keys().cloned().collect();
            let mut deliveries = Vec::new();
            for destination in destinations {
                let waiting = routing.backlog.remove(&destination).unwrap_or_default();
                for message in waiting {
                    deliveries.extend(Self::route_to_queue(&mut routing, &destination, message));
                }
            }
            deliveries
        };
        self.deliver(deliveries);
    }

    fn deliver(&self, deliveries: Vec<Delivery>) {
        for (listener, message) in deliveries {
            let destination = message.destination.clone();
            if let Err(e) = listener.on_message(Box::new(message)) {
                self.inner.delivery_failures.fetch_add(1, Ordering::SeqCst);
                log::error!(
                    "[InMemoryBroker] Listener failed to accept a message from {:?}: {}",
                    destination.map(|d| d.to_string()),
                    e
                );
            }
        }
    }

    fn register_receiver(&self, entry: ReceiverEntry) {
        self.routing().receivers.push(entry);
        self.flush_backlog();
    }

    fn unregister_receiver(&self, id: u64) {
        self.routing().receivers.retain(|r| r.id != id);
    }
}

impl std::fmt::Debug for InMemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBroker")
            .field("open_receivers", &self.open_receivers())
            .field("open_senders", &self.open_senders())
            .field("sends", &self.sends())
            .finish()
    }
}

impl ConnectionState {
    fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, Vec<Delivery>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct InMemoryConnectionFactory {
    broker: InMemoryBroker,
}

#[async_trait]
impl ConnectionFactory for InMemoryConnectionFactory {
    async fn create_connection(&self) -> BridgeResult<Arc<dyn Connection>> {
        self.broker
            .inner
            .connections_created
            .fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(InMemoryConnection {
            broker: self.broker.clone(),
            state: Arc::new(ConnectionState::default()),
        }))
    }
}

struct InMemoryConnection {
    broker: InMemoryBroker,
    state: Arc<ConnectionState>,
}

#[async_trait]
impl Connection for InMemoryConnection {
    async fn create_session(&self) -> BridgeResult<Arc<dyn Session>> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(BridgeError::transport("Connection is closed"));
        }
        Ok(Arc::new(InMemorySession {
            broker: self.broker.clone(),
            connection: Arc::clone(&self.state),
        }))
    }

    async fn start(&self) -> BridgeResult<()> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(BridgeError::transport("Connection is closed"));
        }
        self.state.started.store(true, Ordering::SeqCst);
        let held = std::mem::take(&mut *self.state.pending());
        self.broker.deliver(held);
        self.broker.flush_backlog();
        Ok(())
    }

    async fn stop(&self) -> BridgeResult<()> {
        self.state.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> BridgeResult<()> {
        self.state.started.store(false, Ordering::SeqCst);
        self.state.closed.store(true, Ordering::SeqCst);
        self.state.pending().clear();
        Ok(())
    }
}

struct InMemorySession {
    broker: InMemoryBroker,
    connection: Arc<ConnectionState>,
}

#[async_trait]
impl Session for InMemorySession {
    fn create_text_message(&self, text: String) -> BridgeResult<Box<dyn Message>> {
        self.broker.inner.text_messages.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TransportMessage::text(text)))
    }

    fn create_bytes_message(&self, bytes: Vec<u8>) -> BridgeResult<Box<dyn Message>> {
        self.broker.inner.bytes_messages.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TransportMessage::bytes(bytes)))
    }

    fn create_object_message(&self, object: ObjectPayload) -> BridgeResult<Box<dyn Message>> {
        self.broker
            .inner
            .object_messages
            .fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TransportMessage::new(MessageBody::Object(object))))
    }

    async fn create_sender(&self, destination: &Destination) -> BridgeResult<Box<dyn Sender>> {
        *self
            .broker
            .inner
            .sender_creations
            .entry(destination.clone())
            .or_insert(0) += 1;
        self.broker.inner.open_senders.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemorySender {
            broker: self.broker.clone(),
            destination: destination.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn create_receiver(
        &self,
        destination: &Destination,
        listener: Arc<dyn MessageListener>,
    ) -> BridgeResult<Box<dyn Receiver>> {
        let id = self.broker.next_id();
        self.broker.register_receiver(ReceiverEntry {
            id,
            destination: destination.clone(),
            listener,
            connection: Arc::clone(&self.connection),
        });
        Ok(Box::new(InMemoryReceiver {
            broker: self.broker.clone(),
            destination: destination.clone(),
            id,
        }))
    }
}

struct InMemorySender {
    broker: InMemoryBroker,
    destination: Destination,
    closed: AtomicBool,
}

#[async_trait]
impl Sender for InMemorySender {
    fn destination(&self) -> &Destination {
        &self.destination
    }

    async fn send(&self, message: Box<dyn Message>) -> BridgeResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BridgeError::transport(format!(
                "Sender for {} is closed",
                self.destination
            )));
        }
        if self.broker.inner.failing_destinations.contains(&self.destination) {
            return Err(BridgeError::transport(format!(
                "Send to {} rejected by the broker",
                self.destination
            )));
        }

        let plain = TransportMessage {
            destination: None,
            body: message.body().clone(),
            headers: MessageHeaders {
                message_id: message.message_id().ok().flatten(),
                correlation_id: message.correlation_id().ok().flatten(),
                priority: message.priority().ok().flatten(),
                ..Default::default()
            },
        };
        let stamped = self.broker.stamp(&self.destination, plain);
        self.broker.inner.sends.fetch_add(1, Ordering::SeqCst);
        self.broker.route(&self.destination, stamped);
        Ok(())
    }

    async fn close(&self) -> BridgeResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.broker.inner.open_senders.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct InMemoryReceiver {
    broker: InMemoryBroker,
    destination: Destination,
    id: u64,
}

#[async_trait]
impl Receiver for InMemoryReceiver {
    fn destination(&self) -> &Destination {
        &self.destination
    }

    async fn close(&self) -> BridgeResult<()> {
        self.broker.unregister_receiver(self.id);
        Ok(())
    }
}
