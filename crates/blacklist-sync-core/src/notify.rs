//! Sync progress events and the last-attempt result shown to the user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Outcome of the last sync attempt, kept for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncResult {
    Success { timestamp: DateTime<Utc> },
    Error { message: String },
}

impl SyncResult {
    pub fn success() -> Self {
        Self::Success {
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Progress events emitted around a sync attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    SyncStarted,
    SyncFinished(SyncResult),
}

/// One-way event sink. Delivery is never acknowledged and never blocks the sender.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: SyncEvent);
}

/// Notifier backed by a broadcast channel; events without subscribers are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<SyncEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(16)
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, event: SyncEvent) {
        if self.sender.send(event).is_err() {
            trace!("no subscribers for sync event");
        }
    }
}
