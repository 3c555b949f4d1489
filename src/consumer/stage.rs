// SPDX-License-Identifier: MIT OR Apache-2.0

use super::converter::ConsumerConverter;
use super::reader::ConsumerReader;
use super::record::ConsumedResult;
use super::IterativeReader;
use crate::config::ConsumerConfig;
use crate::context::StageContext;
use crate::deserializer::MessageDeserializer;
use crate::error::BridgeResult;
use crate::monitoring::{EventsLogger, MeterRegistry, Monitoring};
use crate::transport::ConnectionFactory;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// First offset assigned by a consumer stage
pub const INITIAL_OFFSET: i64 = 1;

/// Consumer pipeline stage: reader plus converter, yielding one [`ConsumedResult`] per pull.
///
/// Offsets keep increasing across stop/start cycles of the same stage.
pub struct ConsumerStage<V> {
    reader: ConsumerReader,
    converter: ConsumerConverter<V>,
    offset: AtomicI64,
}

impl<V> ConsumerStage<V> {
    pub fn new(
        reader: ConsumerReader,
        deserializer: Arc<dyn MessageDeserializer<V>>,
        monitoring: Monitoring,
    ) -> Self {
        Self {
            reader,
            converter: ConsumerConverter::new(deserializer, monitoring),
            offset: AtomicI64::new(INITIAL_OFFSET),
        }
    }

    /// Stage over a single connection factory; `config` decides whether it serves queues or topics.
    ///
    /// A config naming both queues and topics is accepted here and rejected by `start()`.
    pub fn from_config(
        config: &ConsumerConfig,
        factory: Arc<dyn ConnectionFactory>,
        deserializer: Arc<dyn MessageDeserializer<V>>,
        registry: Arc<dyn MeterRegistry>,
        logger: Arc<dyn EventsLogger>,
    ) -> Self {
        let reader = ConsumerReader::new(config);
        let reader = if config.topics.is_empty() {
            reader.with_queue_connection_factory(factory)
        } else {
            reader.with_topic_connection_factory(factory)
        };
        Self::new(
            reader,
            deserializer,
            Monitoring::new(&config.monitoring, registry, logger),
        )
    }

    pub fn reader(&self) -> &ConsumerReader {
        &self.reader
    }

    /// Offset the next consumed record will get
    pub fn next_offset(&self) -> i64 {
        self.offset.load(Ordering::SeqCst)
    }

    pub async fn start(&self, context: &StageContext) -> BridgeResult<()> {
        self.reader.start(context).await?;
        self.converter.start(context);
        Ok(())
    }

    pub fn has_next(&self) -> bool {
        self.reader.has_next()
    }

    pub async fn next(&self) -> BridgeResult<ConsumedResult<V>> {
        let message = self.reader.next().await?;
        self.converter.supply(&self.offset, message.as_ref())
    }

    pub async fn stop(&self, context: &StageContext) {
        self.reader.stop(context).await;
        self.converter.stop(context);
    }
}
