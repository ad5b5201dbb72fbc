//! # Broadcast Channel
//!
//! Fans worker events out to every open page. Pages that fall behind lose
//! the oldest events; status snapshots are self-contained, so the next one
//! brings a lagging page back in line.
//!
//! ## Envelope
//! ```json
//! { "id": "7d0c…", "type": "FORM_SYNCED", "payload": { "key": "f1", "remaining": 0 } }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use inspekt_core::WorkerEvent;

use crate::agent::SyncEventEmitter;

/// Events buffered per subscriber before it starts lagging.
pub const BROADCAST_CAPACITY: usize = 256;

/// A [`WorkerEvent`] with a correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEnvelope {
    pub id: Uuid,
    #[serde(flatten)]
    pub event: WorkerEvent,
}

impl BroadcastEnvelope {
    pub fn new(event: WorkerEvent) -> Self {
        BroadcastEnvelope {
            id: Uuid::new_v4(),
            event,
        }
    }
}

/// [`SyncEventEmitter`] backed by a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastEmitter {
    tx: broadcast::Sender<BroadcastEnvelope>,
}

impl Default for BroadcastEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastEmitter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        BroadcastEmitter { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEnvelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl SyncEventEmitter for BroadcastEmitter {
    fn emit(&self, event: &WorkerEvent) {
        // No open pages is not an error
        if self.tx.send(BroadcastEnvelope::new(event.clone())).is_err() {
            trace!(event = event.type_name(), "No subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let emitter = BroadcastEmitter::new();
        let mut a = emitter.subscribe();
        let mut b = emitter.subscribe();

        emitter.emit(&WorkerEvent::SyncStarted { count: 2 });

        assert_eq!(a.recv().await.unwrap().event, WorkerEvent::SyncStarted { count: 2 });
        assert_eq!(b.recv().await.unwrap().event, WorkerEvent::SyncStarted { count: 2 });
    }

    #[test]
    fn test_emit_without_subscribers() {
        let emitter = BroadcastEmitter::new();
        emitter.emit(&WorkerEvent::SyncError { error: "x".into() });
        assert_eq!(emitter.subscriber_count(), 0);
    }

    #[test]
    fn test_envelope_wire_format() {
        let envelope = BroadcastEnvelope::new(WorkerEvent::FormSynced {
            key: "f1".into(),
            remaining: 0,
        });
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["type"], "FORM_SYNCED");
        assert_eq!(value["payload"], json!({ "key": "f1", "remaining": 0 }));
        assert!(value["id"].is_string());
    }
}
