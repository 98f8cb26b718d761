//! Process-wide notification channel for UI collaborators
//!
//! Fire-and-forget broadcast: senders never wait for acknowledgement and a
//! missing subscriber is not an error.

use tokio::sync::broadcast;

/// Outcome reporting for a batch push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveAllStatus {
    /// Local edits are pending (emitted by the editing UI, not the core)
    Dirty,
    /// A non-empty batch push has started
    Processing,
    /// The batch aborted on a per-record failure
    Failed,
    /// The whole batch reconciled
    Success,
}

/// Notifications the sync core emits for external collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Free-form status line for the UI status field
    StatusMessage(String),
    /// Batch push progress
    SaveAllStatus(SaveAllStatus),
    /// A draft was acknowledged by the remote authority under a new id
    RecordIdChanged { old: i64, new: i64 },
    /// A record was removed from the local cache
    RecordDeleted(i64),
    /// A push conflict was merged; an open editor should swap in this text
    ConflictMerged { id: i64, text: String },
}

/// Cloneable handle on the process-wide event channel
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    /// Subscribe to all events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Emit an event. Dropped silently when nobody is listening.
    pub fn emit(&self, event: SyncEvent) {
        let _ = self.sender.send(event);
    }

    /// Emit a free-form status message.
    pub fn status(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("status: {message}");
        self.emit(SyncEvent::StatusMessage(message));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
