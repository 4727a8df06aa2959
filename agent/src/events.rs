//! Typed outbound events.
//!
//! Sync used to be observable only through callbacks; here every signal is
//! a value on a broadcast channel. Emission never blocks and never fails:
//! subscribers that lag or disappear miss events, which is acceptable for
//! notifications (the status record remains the source of truth).

use tokio::sync::broadcast;

use tillsync_engine::Item;

use crate::cycle::CycleSummary;

const CHANNEL_CAPACITY: usize = 64;

/// Discrete signals emitted by the sync engine.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// An order appeared during a pull that was not known locally.
    NewOrder(Item),
    /// A known order was overwritten by a newer remote copy.
    UpdatedOrder(Item),
    /// A cycle finished (successfully or not).
    SyncCompleted(CycleSummary),
    /// Newly pulled storefront orders, post-cooldown; drives notifications.
    NewOrderAlert { count: usize },
    /// The outbound queue overflowed and dropped its oldest entries.
    QueueOverflow { dropped: usize },
}

/// Broadcast fan-out for [`SyncEvent`].
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; a send with no subscribers is fine.
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
