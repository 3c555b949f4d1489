// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-destination sender cache of one producer session.
//!
//! Each destination maps to a `OnceCell`; the map entry is inserted atomically and the
//! cell runs at most one successful creation, so concurrent batches targeting the same
//! destination share a single sender. A failed creation leaves the cell empty and the
//! next lookup tries again.

use crate::error::BridgeResult;
use crate::transport::{Destination, Sender, Session};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

type SenderCell = Arc<OnceCell<Arc<dyn Sender>>>;

#[derive(Default)]
pub struct SenderRegistry {
    senders: DashMap<Destination, SenderCell>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sender for `destination`, created through `session` on first use
    pub async fn get_or_create(
        &self,
        destination: &Destination,
        session: &dyn Session,
    ) -> BridgeResult<Arc<dyn Sender>> {
        // Clone the cell out so no map shard lock is held across the await
        let cell = self
            .senders
            .entry(destination.clone())
            .or_default()
            .clone();

        let sender = cell
            .get_or_try_init(|| async {
                log::debug!("[SenderRegistry] Creating sender for {}", destination);
                session
                    .create_sender(destination)
                    .await
                    .map(Arc::<dyn Sender>::from)
            })
            .await?;
        Ok(sender.clone())
    }

    /// Number of senders created
    pub fn len(&self) -> usize {
        self.senders
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close and forget every sender; close failures are logged
    pub async fn close_all(&self) {
        let cells: Vec<SenderCell> = self
            .senders
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.senders.clear();

        for cell in cells {
            if let Some(sender) = cell.get() {
                if let Err(e) = sender.close().await {
                    log::warn!(
                        "[SenderRegistry] Failed to close sender of {}: {}",
                        sender.destination(),
                        e
                    );
                }
            }
        }
    }

    /// Forget every sender without closing them
    pub fn clear(&self) {
        self.senders.clear();
    }
}

impl std::fmt::Debug for SenderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderRegistry")
            .field("senders", &self.len())
            .finish()
    }
}
