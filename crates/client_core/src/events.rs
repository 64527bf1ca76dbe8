//! Engine notifications: settled/rolled-back cards and toast-style messages.

use shared::{domain::JobId, protocol::Card};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    CardSettled { job_id: JobId, card: Card },
    CardRolledBack { job_id: JobId, card: Card },
    BundleRefreshed { job_id: JobId },
    ActivityReloaded { job_id: JobId, items: usize },
    Toast(Toast),
}

#[derive(Clone)]
pub struct EventSink {
    tx: broadcast::Sender<EngineEvent>,
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: EngineEvent) {
        // No subscribers is fine; nobody is looking at the board.
        let _ = self.tx.send(event);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(EngineEvent::Toast(Toast {
            kind: ToastKind::Success,
            message: message.into(),
        }));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(EngineEvent::Toast(Toast {
            kind: ToastKind::Error,
            message: message.into(),
        }));
    }
}
