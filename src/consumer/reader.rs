// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Consumer Reader
//!
//! Owns the transport resources of a consumer stage: one connection (queue or topic,
//! never both), one session on it and one receiver per configured destination, all
//! feeding the same [`PushPullBridge`].
//!
//! ## Lifecycle
//!
//! ```text
//! CREATED ──start()──▶ STARTED ──stop()──▶ STOPPED ──start()──▶ STARTED ...
//! ```
//!
//! `start()` validates the configuration before touching the transport. Receivers are
//! kept as soon as they are created, so a `stop()` after a failed `start()` still
//! closes whatever was opened.
//!
//! `next()` fails with `NotStarted` until the first successful `start()`. After that it
//! keeps draining the bridge, including messages buffered before a `stop()`.

use super::bridge::PushPullBridge;
use super::IterativeReader;
use crate::config::{ConsumerConfig, CONSUMER_QUEUES_KEY, CONSUMER_TOPICS_KEY};
use crate::context::StageContext;
use crate::error::{BridgeError, BridgeResult};
use crate::transport::{Connection, ConnectionFactory, Destination, Message, Receiver};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub struct ConsumerReader {
    queue_connection_factory: Option<Arc<dyn ConnectionFactory>>,
    topic_connection_factory: Option<Arc<dyn ConnectionFactory>>,
    queues: Vec<String>,
    topics: Vec<String>,
    bridge: PushPullBridge,
    running: AtomicBool,
    started: AtomicBool,
    receivers: Mutex<Vec<Box<dyn Receiver>>>,
    connections: Mutex<Vec<Arc<dyn Connection>>>,
}

impl ConsumerReader {
    /// Reader over the destinations of `config`; a connection factory must be set before start
    pub fn new(config: &ConsumerConfig) -> Self {
        Self {
            queue_connection_factory: None,
            topic_connection_factory: None,
            queues: config.queues.clone(),
            topics: config.topics.clone(),
            bridge: PushPullBridge::new(),
            running: AtomicBool::new(false),
            started: AtomicBool::new(false),
            receivers: Mutex::new(Vec::new()),
            connections: Mutex::new(Vec::new()),
        }
    }

    pub fn for_queues<I, S>(factory: Arc<dyn ConnectionFactory>, queues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let config = ConsumerConfig {
            queues: queues.into_iter().map(Into::into).collect(),
            ..Default::default()
        };
        Self::new(&config).with_queue_connection_factory(factory)
    }

    pub fn for_topics<I, S>(factory: Arc<dyn ConnectionFactory>, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let config = ConsumerConfig {
            topics: topics.into_iter().map(Into::into).collect(),
            ..Default::default()
        };
        Self::new(&config).with_topic_connection_factory(factory)
    }

    pub fn with_queue_connection_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.queue_connection_factory = Some(factory);
        self
    }

    pub fn with_topic_connection_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.topic_connection_factory = Some(factory);
        self
    }

    /// Receivers currently held
    pub fn receiver_count(&self) -> usize {
        self.lock_receivers().len()
    }

    /// Connections currently held
    pub fn connection_count(&self) -> usize {
        self.lock_connections().len()
    }

    /// Messages delivered but not pulled yet
    pub fn buffered(&self) -> usize {
        self.bridge.buffered()
    }

    fn validate(&self) -> BridgeResult<()> {
        if !self.queues.is_empty() && !self.topics.is_empty() {
            return Err(BridgeError::configuration(format!(
                "Queues ({}) and topics ({}) cannot be consumed together, configure only one of '{}' or '{}'",
                self.queues.join(","),
                self.topics.join(","),
                CONSUMER_QUEUES_KEY,
                CONSUMER_TOPICS_KEY
            )));
        }
        match (&self.queue_connection_factory, &self.topic_connection_factory) {
            (Some(_), Some(_)) => Err(BridgeError::configuration(
                "Queue and topic connections cannot be used together, configure only one of them",
            )),
            (None, None) => Err(BridgeError::configuration(
                "Either a queue connection or a topic connection is required",
            )),
            (Some(_), None) if self.queues.is_empty() => Err(BridgeError::configuration_with_key(
                "At least one queue is required when a queue connection is set",
                CONSUMER_QUEUES_KEY,
            )),
            (None, Some(_)) if self.topics.is_empty() => Err(BridgeError::configuration_with_key(
                "At least one topic is required when a topic connection is set",
                CONSUMER_TOPICS_KEY,
            )),
            _ => Ok(()),
        }
    }

    async fn open(&self, context: &StageContext) -> BridgeResult<()> {
        if let Some(factory) = &self.topic_connection_factory {
            let topics = self.topics.iter().map(Destination::topic).collect();
            self.subscribe(context, factory.as_ref(), topics).await?;
        }
        if let Some(factory) = &self.queue_connection_factory {
            let queues = self.queues.iter().map(Destination::queue).collect();
            self.subscribe(context, factory.as_ref(), queues).await?;
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        context: &StageContext,
        factory: &dyn ConnectionFactory,
        destinations: Vec<Destination>,
    ) -> BridgeResult<()> {
        let connection = factory.create_connection().await?;
        self.lock_connections().push(connection.clone());

        let session = connection.create_session().await?;
        let listener = self.bridge.listener();
        for destination in destinations {
            let receiver = session.create_receiver(&destination, listener.clone()).await?;
            log::debug!(
                "[ConsumerReader] Stage '{}' subscribed to {}",
                context.stage_name,
                destination
            );
            self.lock_receivers().push(receiver);
        }

        connection.start().await
    }

    fn lock_receivers(&self) -> MutexGuard<'_, Vec<Box<dyn Receiver>>> {
        // A poisoned list is still a valid list of handles to close
        self.receivers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_connections(&self) -> MutexGuard<'_, Vec<Arc<dyn Connection>>> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl IterativeReader<Box<dyn Message>> for ConsumerReader {
    async fn start(&self, context: &StageContext) -> BridgeResult<()> {
        if self.running.load(Ordering::SeqCst) {
            log::warn!(
                "[ConsumerReader] Stage '{}' is already started",
                context.stage_name
            );
            return Ok(());
        }
        self.validate()?;

        if let Err(e) = self.open(context).await {
            log::error!(
                "[ConsumerReader] Stage '{}' failed to open its receivers: {}",
                context.stage_name,
                e
            );
            return Err(BridgeError::resource_setup(context.stage_name.clone(), e));
        }

        self.started.store(true, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        log::info!(
            "[ConsumerReader] Stage '{}' started with {} receiver(s)",
            context.stage_name,
            self.receiver_count()
        );
        Ok(())
    }

    async fn stop(&self, context: &StageContext) {
        self.running.store(false, Ordering::SeqCst);

        let receivers = std::mem::take(&mut *self.lock_receivers());
        for receiver in receivers {
            if let Err(e) = receiver.close().await {
                log::warn!(
                    "[ConsumerReader] Stage '{}' failed to close receiver of {}: {}",
                    context.stage_name,
                    receiver.destination(),
                    e
                );
            }
        }

        let connections = std::mem::take(&mut *self.lock_connections());
        for connection in connections {
            if let Err(e) = connection.stop().await {
                log::warn!(
                    "[ConsumerReader] Stage '{}' failed to stop connection: {}",
                    context.stage_name,
                    e
                );
            }
            if let Err(e) = connection.close().await {
                log::warn!(
                    "[ConsumerReader] Stage '{}' failed to close connection: {}",
                    context.stage_name,
                    e
                );
            }
        }

        log::debug!("[ConsumerReader] Stage '{}' stopped", context.stage_name);
    }

    fn has_next(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn next(&self) -> BridgeResult<Box<dyn Message>> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(BridgeError::not_started("ConsumerReader"));
        }
        self.bridge.next().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::InMemoryBroker;
    use crate::transport::{MessageBody, TransportMessage};

    struct RefusingFactory;

    #[async_trait]
    impl ConnectionFactory for RefusingFactory {
        async fn create_connection(&self) -> BridgeResult<Arc<dyn Connection>> {
            Err(BridgeError::transport("connection refused"))
        }
    }

    fn context() -> StageContext {
        StageContext::new("scenario", "consume")
    }

    #[tokio::test]
    async fn test_both_connection_kinds_rejected() {
        let broker = InMemoryBroker::new();
        let config = ConsumerConfig {
            queues: vec!["q".to_string()],
            topics: vec!["t".to_string()],
            ..Default::default()
        };
        let reader = ConsumerReader::new(&config)
            .with_queue_connection_factory(broker.connection_factory())
            .with_topic_connection_factory(broker.connection_factory());

        let error = reader.start(&context()).await.unwrap_err();
        assert!(error.is_configuration());
        assert_eq!(broker.connections_created(), 0);
        assert!(!reader.has_next());
    }

    #[tokio::test]
    async fn test_no_connection_rejected() {
        let config = ConsumerConfig {
            queues: vec!["q".to_string()],
            ..Default::default()
        };
        let error = ConsumerReader::new(&config)
            .start(&context())
            .await
            .unwrap_err();
        assert!(error.is_configuration());
    }

    #[tokio::test]
    async fn test_connection_without_names_rejected() {
        let broker = InMemoryBroker::new();
        let queues = ConsumerReader::for_queues(broker.connection_factory(), Vec::<String>::new());
        let topics = ConsumerReader::for_topics(broker.connection_factory(), Vec::<String>::new());

        for reader in [queues, topics] {
            let error = reader.start(&context()).await.unwrap_err();
            assert!(error.is_configuration());
        }
        assert_eq!(broker.connections_created(), 0);
    }

    #[tokio::test]
    async fn test_setup_failure_is_wrapped_with_stage() {
        let reader = ConsumerReader::for_queues(Arc::new(RefusingFactory), ["q"]);
        let error = reader.start(&context()).await.unwrap_err();

        match &error {
            BridgeError::ResourceSetup { stage, .. } => assert_eq!(stage, "consume"),
            other => panic!("expected resource setup error, got {:?}", other),
        }
        assert!(!reader.has_next());
        reader.stop(&context()).await;
    }

    #[tokio::test]
    async fn test_one_receiver_per_destination() {
        let broker = InMemoryBroker::new();
        let reader = ConsumerReader::for_topics(broker.connection_factory(), ["a", "b", "c"]);

        reader.start(&context()).await.unwrap();
        assert!(reader.has_next());
        assert_eq!(reader.receiver_count(), 3);
        assert_eq!(reader.connection_count(), 1);
        assert_eq!(broker.open_receivers(), 3);

        broker.publish(&Destination::topic("b"), TransportMessage::text("hello"));
        let message = reader.next().await.unwrap();
        assert_eq!(message.body(), &MessageBody::Text("hello".to_string()));
        assert_eq!(message.destination(), Some(Destination::topic("b")));

        reader.stop(&context()).await;
        assert!(!reader.has_next());
        assert_eq!(reader.receiver_count(), 0);
        assert_eq!(reader.connection_count(), 0);
        assert_eq!(broker.open_receivers(), 0);
    }

    #[tokio::test]
    async fn test_has_next_ignores_buffer() {
        let broker = InMemoryBroker::new();
        let reader = ConsumerReader::for_queues(broker.connection_factory(), ["q"]);

        reader.start(&context()).await.unwrap();
        assert!(reader.has_next());
        assert_eq!(reader.buffered(), 0);

        broker.publish(&Destination::queue("q"), TransportMessage::text("pending"));
        assert_eq!(reader.buffered(), 1);

        reader.stop(&context()).await;
        assert!(!reader.has_next());
        assert_eq!(reader.buffered(), 1);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_harmless() {
        let broker = InMemoryBroker::new();
        let reader = ConsumerReader::for_queues(broker.connection_factory(), ["q"]);
        reader.stop(&context()).await;
        reader.stop(&context()).await;
        assert!(!reader.has_next());
    }

    #[tokio::test]
    async fn test_next_before_start_fails_fast() {
        let broker = InMemoryBroker::new();
        let reader = ConsumerReader::for_queues(broker.connection_factory(), ["q"]);

        let result = tokio::time::timeout(std::time::Duration::from_millis(200), reader.next())
            .await
            .expect("next() before start must not wait");
        assert!(matches!(result, Err(BridgeError::NotStarted { .. })));

        let failed = ConsumerReader::for_queues(Arc::new(RefusingFactory), ["q"]);
        assert!(failed.start(&context()).await.is_err());
        assert!(matches!(
            failed.next().await,
            Err(BridgeError::NotStarted { .. })
        ));
        failed.stop(&context()).await;
    }

    #[tokio::test]
    async fn test_buffered_message_pulled_after_stop() {
        let broker = InMemoryBroker::new();
        let reader = ConsumerReader::for_queues(broker.connection_factory(), ["q"]);

        reader.start(&context()).await.unwrap();
        broker.publish(&Destination::queue("q"), TransportMessage::text("kept"));
        reader.stop(&context()).await;

        let message = reader.next().await.unwrap();
        assert_eq!(message.body(), &MessageBody::Text("kept".to_string()));
    }

    #[tokio::test]
    async fn test_queue_and_topic_names_rejected_with_single_factory() {
        let broker = InMemoryBroker::new();
        let config = ConsumerConfig {
            queues: vec!["q".to_string()],
            topics: vec!["t".to_string()],
            ..Default::default()
        };
        let reader = ConsumerReader::new(&config).with_topic_connection_factory(broker.connection_factory());

        let error = reader.start(&context()).await.unwrap_err();
        assert!(error.is_configuration());
        assert_eq!(broker.connections_created(), 0);
        assert_eq!(reader.receiver_count(), 0);
    }
}
