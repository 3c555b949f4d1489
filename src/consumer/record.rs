// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::transport::Destination;

/// One consumed message, immutable once built.
///
/// `offset` is local to the consuming stage (1-based, in consumption order). Header
/// fields are best-effort: a header the transport failed to read is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumedRecord<V> {
    pub destination: Option<Destination>,
    pub offset: i64,
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    pub priority: Option<i32>,
    /// Epoch milliseconds
    pub expiration: Option<i64>,
    /// Epoch milliseconds
    pub delivered_time: Option<i64>,
    /// Epoch milliseconds
    pub timestamp: Option<i64>,
    pub value: V,
}

/// Size of the current message only, never a running total
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeMeters {
    pub consumed_bytes: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsumedResult<V> {
    pub record: ConsumedRecord<V>,
    pub meters: ConsumeMeters,
}
