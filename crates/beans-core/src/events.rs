use std::sync::atomic::{AtomicBool, Ordering};

use beans_model::DocumentId;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;

/// Lifecycle notifications of a document.
///
/// Delivered after the corresponding state change is visible and without any document lock held.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentEvent {
    ReadStarted { document: DocumentId },
    ReadFinished { document: DocumentId },
    Reset { document: DocumentId },
    ExtensionAdded { document: DocumentId, extension: String },
    ExtensionRemoved { document: DocumentId, extension: String },
}

impl DocumentEvent {
    pub fn document(&self) -> &DocumentId {
        match self {
            DocumentEvent::ReadStarted { document }
            | DocumentEvent::ReadFinished { document }
            | DocumentEvent::Reset { document }
            | DocumentEvent::ExtensionAdded { document, .. }
            | DocumentEvent::ExtensionRemoved { document, .. } => document,
        }
    }
}

pub trait DocumentListener: Send + Sync {
    fn on_event(&self, event: &DocumentEvent);

    /// Closed listeners are dropped after the next delivery.
    fn is_closed(&self) -> bool {
        false
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

/// Forwards events into a bounded channel; see [`crate::DocumentNode::subscribe`].
///
/// Events are dropped when the receiver falls behind.
#[derive(Debug)]
pub struct ChannelListener {
    tx: Sender<DocumentEvent>,
    closed: AtomicBool,
}

pub(crate) const CHANNEL_CAPACITY: usize = 1024;

impl ChannelListener {
    pub fn new() -> (Self, Receiver<DocumentEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
        (
            Self {
                tx,
                closed: AtomicBool::new(false),
            },
            rx,
        )
    }
}

impl DocumentListener for ChannelListener {
    fn on_event(&self, event: &DocumentEvent) {
        match self.tx.try_send(event.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => self.closed.store(true, Ordering::Relaxed),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

/// Keeps every event it receives.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<DocumentEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DocumentEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<DocumentEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl DocumentListener for RecordingListener {
    fn on_event(&self, event: &DocumentEvent) {
        self.events.lock().push(event.clone());
    }
}
