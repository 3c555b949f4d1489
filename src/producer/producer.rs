// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Producer
//!
//! Owns one connection and one session, and sends batches of records through senders
//! cached per destination.
//!
//! ## Batch Flow
//!
//! ```text
//! execute(records)
//!   ├── debug event + counter: records to produce
//!   ├── for each record, in order:
//!   │     registry.get_or_create(destination) → convert → sender.send
//!   │     failure: logged, record skipped, batch continues
//!   └── info events + counters: produced records, produced bytes
//! ```
//!
//! Per-record failures never fail the batch; they only lower the produced tallies.

use super::converter::ProducerConverter;
use super::record::{ProduceMeters, ProduceRecord};
use super::registry::SenderRegistry;
use crate::context::StageContext;
use crate::error::{BridgeError, BridgeResult};
use crate::monitoring::{
    Counter, Monitoring, Tags, PRODUCER_PRODUCED_BYTES_EVENT, PRODUCER_PRODUCED_BYTES_METER,
    PRODUCER_PRODUCED_RECORDS_EVENT, PRODUCER_PRODUCED_RECORDS_METER,
    PRODUCER_PRODUCING_RECORDS_EVENT, PRODUCER_PRODUCING_RECORDS_METER,
};
use crate::transport::{Connection, ConnectionFactory, Session};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
struct ProducerCounters {
    producing_records: Arc<dyn Counter>,
    produced_bytes: Arc<dyn Counter>,
    produced_records: Arc<dyn Counter>,
}

#[derive(Default)]
struct ProducerState {
    connection: Option<Arc<dyn Connection>>,
    session: Option<Arc<dyn Session>>,
    counters: Option<ProducerCounters>,
}

pub struct Producer {
    connection_factory: Arc<dyn ConnectionFactory>,
    converter: ProducerConverter,
    monitoring: Monitoring,
    registry: SenderRegistry,
    state: Mutex<ProducerState>,
}

impl Producer {
    pub fn new(connection_factory: Arc<dyn ConnectionFactory>, monitoring: Monitoring) -> Self {
        Self {
            connection_factory,
            converter: ProducerConverter,
            monitoring,
            registry: SenderRegistry::new(),
            state: Mutex::new(ProducerState::default()),
        }
    }

    /// Senders currently cached
    pub fn sender_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_started(&self) -> bool {
        self.lock_state().session.is_some()
    }

    pub async fn start(&self, context: &StageContext) -> BridgeResult<()> {
        if self.is_started() {
            log::warn!("[Producer] Stage '{}' is already started", context.stage_name);
            return Ok(());
        }

        let meter_tags = context.meter_tags();
        let meters = self.monitoring.meters();
        let counters = ProducerCounters {
            producing_records: meters.counter(
                &context.scenario_name,
                PRODUCER_PRODUCING_RECORDS_METER,
                &meter_tags,
            ),
            produced_bytes: meters.counter(
                &context.scenario_name,
                PRODUCER_PRODUCED_BYTES_METER,
                &meter_tags,
            ),
            produced_records: meters.counter(
                &context.scenario_name,
                PRODUCER_PRODUCED_RECORDS_METER,
                &meter_tags,
            ),
        };

        let (connection, session) = match self.open().await {
            Ok(opened) => opened,
            Err(e) => {
                log::error!(
                    "[Producer] Stage '{}' failed to open its session: {}",
                    context.stage_name,
                    e
                );
                return Err(BridgeError::resource_setup(context.stage_name.clone(), e));
            }
        };
        self.registry.clear();

        let mut state = self.lock_state();
        state.connection = Some(connection);
        state.session = Some(session);
        state.counters = Some(counters);
        drop(state);

        log::info!("[Producer] Stage '{}' started", context.stage_name);
        Ok(())
    }

    async fn open(&self) -> BridgeResult<(Arc<dyn Connection>, Arc<dyn Session>)> {
        let connection = self.connection_factory.create_connection().await?;
        let session = async {
            connection.start().await?;
            connection.create_session().await
        }
        .await;

        match session {
            Ok(session) => Ok((connection, session)),
            Err(e) => {
                if let Err(close_error) = connection.close().await {
                    log::warn!("[Producer] Failed to close connection: {}", close_error);
                }
                Err(e)
            }
        }
    }

    /// Send a batch; only a producer that is not started makes this fail
    pub async fn execute(
        &self,
        context: &StageContext,
        records: &[ProduceRecord],
        tags: &Tags,
    ) -> BridgeResult<ProduceMeters> {
        let (session, counters) = {
            let state = self.lock_state();
            match &state.session {
                Some(session) => (session.clone(), state.counters.clone()),
                None => return Err(BridgeError::not_started("Producer")),
            }
        };
        let events = self.monitoring.events();

        let records_to_produce = records.len();
        events.debug(PRODUCER_PRODUCING_RECORDS_EVENT, records_to_produce as f64, tags);
        if let Some(counters) = &counters {
            counters.producing_records.increment(records_to_produce as f64);
        }

        let mut produced_records = 0;
        let mut produced_bytes = 0;
        for record in records {
            match self.send(record, session.as_ref()).await {
                Ok(bytes) => {
                    produced_records += 1;
                    produced_bytes += bytes;
                }
                Err(e) => log::warn!(
                    "[Producer] Stage '{}' dropped a {} record for {}: {}",
                    context.stage_name,
                    record.kind,
                    record.destination,
                    e
                ),
            }
        }

        events.info(PRODUCER_PRODUCED_RECORDS_EVENT, produced_records as f64, tags);
        events.info(PRODUCER_PRODUCED_BYTES_EVENT, produced_bytes as f64, tags);
        if let Some(counters) = &counters {
            counters.produced_records.increment(produced_records as f64);
            counters.produced_bytes.increment(produced_bytes as f64);
        }

        Ok(ProduceMeters {
            records_to_produce,
            produced_bytes,
            produced_records,
        })
    }

    async fn send(&self, record: &ProduceRecord, session: &dyn Session) -> BridgeResult<usize> {
        let sender = self.registry.get_or_create(&record.destination, session).await?;
        let encoded = self.converter.convert(record, session)?;
        sender.send(encoded.message).await?;
        Ok(encoded.payload_bytes)
    }

    /// Close every sender and the connection; failures are logged, never returned
    pub async fn stop(&self, context: &StageContext) {
        let (connection, session) = {
            let mut state = self.lock_state();
            state.counters = None;
            (state.connection.take(), state.session.take())
        };

        self.registry.close_all().await;
        drop(session);

        if let Some(connection) = connection {
            if let Err(e) = connection.stop().await {
                log::warn!(
                    "[Producer] Stage '{}' failed to stop connection: {}",
                    context.stage_name,
                    e
                );
            }
            if let Err(e) = connection.close().await {
                log::warn!(
                    "[Producer] Stage '{}' failed to close connection: {}",
                    context.stage_name,
                    e
                );
            }
        }
        log::debug!("[Producer] Stage '{}' stopped", context.stage_name);
    }

    fn lock_state(&self) -> MutexGuard<'_, ProducerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
