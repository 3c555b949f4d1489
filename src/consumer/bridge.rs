// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Push-to-Pull Bridge
//!
//! The transport pushes messages into a listener on its own delivery context; the
//! pipeline pulls them one at a time. The two sides meet in an unbounded, ordered
//! tokio channel.
//!
//! ```text
//! transport delivery ──on_message()──▶ ChannelForwarder ──unbounded mpsc──▶ PushPullBridge::next()
//! ```
//!
//! Enqueueing never blocks the delivery context. A closed channel is reported back to
//! the transport as an error for that delivery.

use crate::error::{BridgeError, BridgeResult};
use crate::transport::{Message, MessageListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Listener forwarding every delivered message into the bridge channel
#[derive(Debug, Clone)]
pub struct ChannelForwarder {
    sender: mpsc::UnboundedSender<Box<dyn Message>>,
    buffered: Arc<AtomicUsize>,
}

impl MessageListener for ChannelForwarder {
    fn on_message(&self, message: Box<dyn Message>) -> BridgeResult<()> {
        // Counted before the send so a concurrent pull never decrements below zero
        self.buffered.fetch_add(1, Ordering::SeqCst);
        self.sender.send(message).map_err(|_| {
            self.buffered.fetch_sub(1, Ordering::SeqCst);
            BridgeError::channel_closed("Bridge receiver dropped, message lost")
        })
    }
}

/// Unbounded FIFO between the transport listener and the pulling caller
pub struct PushPullBridge {
    forwarder: Arc<ChannelForwarder>,
    receiver: Mutex<mpsc::UnboundedReceiver<Box<dyn Message>>>,
    buffered: Arc<AtomicUsize>,
}

impl PushPullBridge {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let buffered = Arc::new(AtomicUsize::new(0));
        Self {
            forwarder: Arc::new(ChannelForwarder {
                sender,
                buffered: buffered.clone(),
            }),
            receiver: Mutex::new(receiver),
            buffered,
        }
    }

    /// Listener to register on every receiver
    pub fn listener(&self) -> Arc<dyn MessageListener> {
        self.forwarder.clone()
    }

    /// Wait for the next message in delivery order
    pub async fn next(&self) -> BridgeResult<Box<dyn Message>> {
        let message = self
            .receiver
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| BridgeError::channel_closed("Bridge channel closed"))?;
        self.buffered.fetch_sub(1, Ordering::SeqCst);
        Ok(message)
    }

    /// Take a message if one is already buffered
    pub fn try_next(&self) -> Option<Box<dyn Message>> {
        let message = self.receiver.try_lock().ok()?.try_recv().ok()?;
        self.buffered.fetch_sub(1, Ordering::SeqCst);
        Some(message)
    }

    /// Messages buffered and not yet pulled, also while a caller is waiting in `next()`
    pub fn buffered(&self) -> usize {
        self.buffered.load(Ordering::SeqCst)
    }
}

impl Default for PushPullBridge {
    fn default() -> Self {
        Self::new()
    }
}
