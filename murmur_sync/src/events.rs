//! Event contract between the engine and view layers.
//!
//! Events are emitted only after the owning storage transaction has
//! committed, so subscribers never observe uncommitted state. Subscribers
//! that fall behind miss events rather than blocking the engine.

use crate::database::models::ContentStatus;
use crate::notifications::UnreadCountMap;
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    ObjectAdded {
        group_id: String,
        trx_id: String,
    },
    ObjectStatusChanged {
        trx_id: String,
        status: ContentStatus,
    },
    UnreadCountChanged {
        group_id: String,
        unread_count: i64,
    },
    NotificationListChanged {
        group_id: String,
        unread: UnreadCountMap,
    },
    /// The node process has been unreachable for the configured number of
    /// consecutive fetches; the UI should offer a reconnect.
    NodeUnreachable {
        consecutive_failures: u32,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: SyncEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("sync event dropped: no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_emitted_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.emit(SyncEvent::ObjectAdded {
            group_id: "g".into(),
            trx_id: "t".into(),
        });
        let event = rx.try_recv().unwrap();
        assert_eq!(
            event,
            SyncEvent::ObjectAdded {
                group_id: "g".into(),
                trx_id: "t".into(),
            }
        );
    }

    #[test]
    fn emitting_without_subscribers_is_a_no_op() {
        let bus = EventBus::default();
        bus.emit(SyncEvent::NodeUnreachable {
            consecutive_failures: 3,
        });
    }
}
