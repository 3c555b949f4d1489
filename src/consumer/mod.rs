// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Consumer
//!
//! Receives messages from queues or topics and hands them to the pipeline one at a time.
//!
//! ```text
//!  ConsumerStage
//!  ├── ConsumerReader ── receivers ──▶ PushPullBridge
//!  │        (queue XOR topic connection, one receiver per destination)
//!  └── ConsumerConverter ── deserializer, meters, events, offset ──▶ ConsumedResult<V>
//! ```

pub mod bridge;
pub mod converter;
pub mod reader;
pub mod record;
pub mod stage;

pub use bridge::{ChannelForwarder, PushPullBridge};
pub use converter::ConsumerConverter;
pub use reader::ConsumerReader;
pub use record::{ConsumeMeters, ConsumedRecord, ConsumedResult};
pub use stage::ConsumerStage;

use crate::context::StageContext;
use crate::error::BridgeResult;
use async_trait::async_trait;

/// Pull-based source driven by a sequential pipeline.
///
/// Callers check [`has_next`](IterativeReader::has_next) before every
/// [`next`](IterativeReader::next); `next` waits until an item is available and fails
/// with `NotStarted` before the first successful start.
#[async_trait]
pub trait IterativeReader<T>: Send + Sync {
    async fn start(&self, context: &StageContext) -> BridgeResult<()>;

    /// Never fails; teardown problems are logged
    async fn stop(&self, context: &StageContext);

    /// Liveness of the reader, not emptiness of its buffer
    fn has_next(&self) -> bool;

    async fn next(&self) -> BridgeResult<T>;
}
