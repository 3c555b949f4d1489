// SPDX-License-Identifier: MIT OR Apache-2.0

//! # mqbridge
//!
//! Message-queue connector for load-generation pipelines.
//!
//! - [`consumer`]: subscribes to queues or topics and turns pushed deliveries into a
//!   pull-based stream of [`consumer::ConsumedResult`]s.
//! - [`producer`]: sends batches of records to dynamically discovered destinations,
//!   one cached sender per destination, and reports per-batch tallies.
//! - [`transport`]: the client boundary, with an in-process broker and an AMQP adapter.
//! - [`monitoring`]: optional counters and events, no-op when disabled.

pub mod config;
pub mod consumer;
pub mod context;
pub mod deserializer;
pub mod error;
pub mod monitoring;
pub mod producer;
pub mod transport;

pub use config::{ConsumerConfig, ProducerConfig};
pub use context::StageContext;
pub use error::{BridgeError, BridgeResult};
pub use monitoring::{Monitoring, MonitoringConfig, Tags};
pub use transport::{Destination, DestinationKind, Message, MessageBody};
