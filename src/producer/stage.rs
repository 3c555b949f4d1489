// SPDX-License-Identifier: MIT OR Apache-2.0

use super::producer::Producer;
use super::record::{ProduceMeters, ProduceRecord};
use crate::config::ProducerConfig;
use crate::context::StageContext;
use crate::error::BridgeResult;
use crate::monitoring::{EventsLogger, MeterRegistry, Monitoring};
use crate::transport::ConnectionFactory;
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Builds the records to send for one upstream input
#[async_trait]
pub trait RecordFactory<I>: Send + Sync {
    async fn records(&self, context: &StageContext, input: &I) -> BridgeResult<Vec<ProduceRecord>>;
}

/// [`RecordFactory`] backed by an async closure
pub struct FnRecordFactory<F, I> {
    function: F,
    _input: PhantomData<fn(&I)>,
}

impl<F, I> FnRecordFactory<F, I> {
    pub fn new(function: F) -> Self {
        Self {
            function,
            _input: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, I> RecordFactory<I> for FnRecordFactory<F, I>
where
    F: Fn(&StageContext, &I) -> Fut + Send + Sync,
    Fut: Future<Output = BridgeResult<Vec<ProduceRecord>>> + Send,
    I: Sync,
{
    async fn records(&self, context: &StageContext, input: &I) -> BridgeResult<Vec<ProduceRecord>> {
        (self.function)(context, input).await
    }
}

/// Input forwarded downstream with the tallies of the batch it produced
#[derive(Debug, Clone, PartialEq)]
pub struct ProduceResult<I> {
    pub input: I,
    pub meters: ProduceMeters,
}

/// Producer pipeline stage: one record batch per input
pub struct ProducerStage<I> {
    producer: Producer,
    record_factory: Arc<dyn RecordFactory<I>>,
}

impl<I: Send + Sync> ProducerStage<I> {
    pub fn new(producer: Producer, record_factory: Arc<dyn RecordFactory<I>>) -> Self {
        Self {
            producer,
            record_factory,
        }
    }

    pub fn from_config(
        config: &ProducerConfig,
        factory: Arc<dyn ConnectionFactory>,
        record_factory: Arc<dyn RecordFactory<I>>,
        registry: Arc<dyn MeterRegistry>,
        logger: Arc<dyn EventsLogger>,
    ) -> Self {
        let monitoring = Monitoring::new(&config.monitoring, registry, logger);
        Self::new(Producer::new(factory, monitoring), record_factory)
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub async fn start(&self, context: &StageContext) -> BridgeResult<()> {
        self.producer.start(context).await
    }

    /// Build the records for `input`, send them, and hand the input back with the tallies
    pub async fn execute(&self, context: &StageContext, input: I) -> BridgeResult<ProduceResult<I>> {
        let records = self.record_factory.records(context, &input).await?;
        let meters = self
            .producer
            .execute(context, &records, &context.event_tags())
            .await?;
        Ok(ProduceResult { input, meters })
    }

    pub async fn stop(&self, context: &StageContext) {
        self.producer.stop(context).await;
    }
}
