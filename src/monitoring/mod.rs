// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Monitoring Facade
//!
//! Counters and events emitted by the consumer and producer stages.
//!
//! Both sinks are always present: when a monitoring flag is off, [`Monitoring::new`]
//! substitutes the no-op implementation, so the stages emit the same call sequence
//! whether anything listens or not.
//!
//! ```text
//! MonitoringConfig { events, meters }
//!        │
//!        ▼
//! Monitoring::new(config, registry, logger)
//!        ├── meters  → registry         | NoopMeterRegistry
//!        └── events  → logger           | NoopEventsLogger
//! ```

pub mod memory;

pub use memory::{InMemoryCounter, InMemoryEventsLogger, InMemoryMeterRegistry, RecordedEvent};

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Tags attached to meters and events
pub type Tags = BTreeMap<String, String>;

pub const CONSUMER_RECORDS_METER: &str = "mq-consume-records";
pub const CONSUMER_VALUE_BYTES_METER: &str = "mq-consume-value-bytes";
pub const PRODUCER_PRODUCING_RECORDS_METER: &str = "mq-produce-producing-records";
pub const PRODUCER_PRODUCED_BYTES_METER: &str = "mq-produce-produced-value-bytes";
pub const PRODUCER_PRODUCED_RECORDS_METER: &str = "mq-produce-produced-records";

pub const CONSUMER_RECORDS_EVENT: &str = "mq.consume.received.records";
pub const CONSUMER_VALUE_BYTES_EVENT: &str = "mq.consume.received.value-bytes";
pub const PRODUCER_PRODUCING_RECORDS_EVENT: &str = "mq.produce.producing.records";
pub const PRODUCER_PRODUCED_RECORDS_EVENT: &str = "mq.produce.produced.records";
pub const PRODUCER_PRODUCED_BYTES_EVENT: &str = "mq.produce.produced.bytes";

/// Monotonic counter handed out by a [`MeterRegistry`]
pub trait Counter: Send + Sync + Debug {
    fn increment(&self, amount: f64);

    fn count(&self) -> f64;
}

pub trait MeterRegistry: Send + Sync {
    /// Get or create the counter identified by scope, name and tags
    fn counter(&self, scope: &str, name: &str, tags: &Tags) -> Arc<dyn Counter>;
}

/// Severity of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventLevel {
    Debug,
    Info,
}

impl EventLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventLevel::Debug => "debug",
            EventLevel::Info => "info",
        }
    }
}

pub trait EventsLogger: Send + Sync {
    fn log(&self, level: EventLevel, name: &str, value: f64, tags: &Tags);

    fn debug(&self, name: &str, value: f64, tags: &Tags) {
        self.log(EventLevel::Debug, name, value, tags);
    }

    fn info(&self, name: &str, value: f64, tags: &Tags) {
        self.log(EventLevel::Info, name, value, tags);
    }
}

#[derive(Debug, Default)]
pub struct NoopCounter;

impl Counter for NoopCounter {
    fn increment(&self, _amount: f64) {}

    fn count(&self) -> f64 {
        0.0
    }
}

#[derive(Debug, Default)]
pub struct NoopMeterRegistry;

impl MeterRegistry for NoopMeterRegistry {
    fn counter(&self, _scope: &str, _name: &str, _tags: &Tags) -> Arc<dyn Counter> {
        Arc::new(NoopCounter)
    }
}

#[derive(Debug, Default)]
pub struct NoopEventsLogger;

impl EventsLogger for NoopEventsLogger {
    fn log(&self, _level: EventLevel, _name: &str, _value: f64, _tags: &Tags) {}
}

/// Events logger writing through the `log` facade
#[derive(Debug, Default)]
pub struct LogEventsLogger;

impl EventsLogger for LogEventsLogger {
    fn log(&self, level: EventLevel, name: &str, value: f64, tags: &Tags) {
        match level {
            EventLevel::Debug => {
                log::debug!(target: "mqbridge::events", "{} = {} {:?}", name, value, tags)
            }
            EventLevel::Info => {
                log::info!(target: "mqbridge::events", "{} = {} {:?}", name, value, tags)
            }
        }
    }
}

/// Which sinks a stage reports to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub events: bool,
    pub meters: bool,
}

impl MonitoringConfig {
    pub fn all() -> Self {
        Self {
            events: true,
            meters: true,
        }
    }
}

/// Sinks resolved for one stage
#[derive(Clone)]
pub struct Monitoring {
    meters: Arc<dyn MeterRegistry>,
    events: Arc<dyn EventsLogger>,
}

impl Monitoring {
    pub fn new(
        config: &MonitoringConfig,
        registry: Arc<dyn MeterRegistry>,
        logger: Arc<dyn EventsLogger>,
    ) -> Self {
        Self {
            meters: if config.meters {
                registry
            } else {
                Arc::new(NoopMeterRegistry)
            },
            events: if config.events {
                logger
            } else {
                Arc::new(NoopEventsLogger)
            },
        }
    }

    pub fn disabled() -> Self {
        Self::new(
            &MonitoringConfig::default(),
            Arc::new(NoopMeterRegistry),
            Arc::new(NoopEventsLogger),
        )
    }

    pub fn meters(&self) -> &dyn MeterRegistry {
        self.meters.as_ref()
    }

    pub fn events(&self) -> &dyn EventsLogger {
        self.events.as_ref()
    }
}

impl Default for Monitoring {
    fn default() -> Self {
        Self::disabled()
    }
}

impl Debug for Monitoring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitoring").finish_non_exhaustive()
    }
}
