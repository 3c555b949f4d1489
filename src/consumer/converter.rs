// SPDX-License-Identifier: MIT OR Apache-2.0

//! Converts one pulled message into a [`ConsumedResult`].
//!
//! For every message, in order: records event and counter, byte estimate (event and
//! counter), offset assignment, deserialization. A deserialization error is returned
//! as is; the offset it consumed is not reused.

use super::record::{ConsumeMeters, ConsumedRecord, ConsumedResult};
use crate::context::StageContext;
use crate::deserializer::MessageDeserializer;
use crate::error::BridgeResult;
use crate::monitoring::{
    Counter, Monitoring, Tags, CONSUMER_RECORDS_EVENT, CONSUMER_RECORDS_METER,
    CONSUMER_VALUE_BYTES_EVENT, CONSUMER_VALUE_BYTES_METER,
};
use crate::transport::{Message, MessageBody};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
struct ConsumerCounters {
    records: Arc<dyn Counter>,
    value_bytes: Arc<dyn Counter>,
}

#[derive(Default)]
struct ConverterState {
    counters: Option<ConsumerCounters>,
    event_tags: Tags,
}

pub struct ConsumerConverter<V> {
    deserializer: Arc<dyn MessageDeserializer<V>>,
    monitoring: Monitoring,
    // Swapped whole on start/stop; `supply` only clones the Arc
    state: Mutex<Arc<ConverterState>>,
}

impl<V> ConsumerConverter<V> {
    pub fn new(deserializer: Arc<dyn MessageDeserializer<V>>, monitoring: Monitoring) -> Self {
        Self {
            deserializer,
            monitoring,
            state: Mutex::new(Arc::new(ConverterState::default())),
        }
    }

    pub fn start(&self, context: &StageContext) {
        let meter_tags = context.meter_tags();
        let meters = self.monitoring.meters();
        let counters = ConsumerCounters {
            records: meters.counter(&context.scenario_name, CONSUMER_RECORDS_METER, &meter_tags),
            value_bytes: meters.counter(
                &context.scenario_name,
                CONSUMER_VALUE_BYTES_METER,
                &meter_tags,
            ),
        };

        *self.lock_state() = Arc::new(ConverterState {
            counters: Some(counters),
            event_tags: context.event_tags(),
        });
    }

    /// Detach the counters; they are created again on the next start
    pub fn stop(&self, _context: &StageContext) {
        let mut state = self.lock_state();
        *state = Arc::new(ConverterState {
            counters: None,
            event_tags: state.event_tags.clone(),
        });
    }

    /// Bytes accounted for a message: text length in UTF-8, byte body length, else 0
    pub fn value_bytes(message: &dyn Message) -> usize {
        match message.body() {
            MessageBody::Text(text) => text.len(),
            MessageBody::Bytes(bytes) => bytes.len(),
            MessageBody::Object(_) | MessageBody::Empty => 0,
        }
    }

    pub fn supply(&self, offset: &AtomicI64, message: &dyn Message) -> BridgeResult<ConsumedResult<V>> {
        let state = Arc::clone(&*self.lock_state());
        let events = self.monitoring.events();

        events.info(CONSUMER_RECORDS_EVENT, 1.0, &state.event_tags);
        if let Some(counters) = &state.counters {
            counters.records.increment(1.0);
        }

        let consumed_bytes = Self::value_bytes(message);
        events.info(
            CONSUMER_VALUE_BYTES_EVENT,
            consumed_bytes as f64,
            &state.event_tags,
        );
        if let Some(counters) = &state.counters {
            counters.value_bytes.increment(consumed_bytes as f64);
        }

        let offset = offset.fetch_add(1, Ordering::SeqCst);
        let value = self.deserializer.deserialize(message)?;

        Ok(ConsumedResult {
            record: ConsumedRecord {
                destination: message.destination(),
                offset,
                message_id: message.message_id().ok().flatten(),
                correlation_id: message.correlation_id().ok().flatten(),
                priority: message.priority().ok().flatten(),
                expiration: message.expiration().ok().flatten(),
                delivered_time: message.delivery_time().ok().flatten(),
                timestamp: message.timestamp().ok().flatten(),
                value,
            },
            meters: ConsumeMeters { consumed_bytes },
        })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, Arc<ConverterState>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
