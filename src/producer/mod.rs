// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Producer
//!
//! Sends records to any number of queues and topics discovered at runtime.
//!
//! ```text
//!  input ──RecordFactory──▶ Vec<ProduceRecord> ──Producer::execute──▶ ProduceMeters
//!                                                 │
//!                                 SenderRegistry ─┼─ ProducerConverter
//!                                                 ▼
//!                                           Sender::send
//! ```

pub mod converter;
#[allow(clippy::module_inception)]
pub mod producer;
pub mod record;
pub mod registry;
pub mod stage;

pub use converter::{EncodedMessage, ProducerConverter};
pub use producer::Producer;
pub use record::{MessageKind, ObjectValue, OpaqueValue, ProduceMeters, ProduceRecord, RecordValue};
pub use registry::SenderRegistry;
pub use stage::{FnRecordFactory, ProduceResult, ProducerStage, RecordFactory};
