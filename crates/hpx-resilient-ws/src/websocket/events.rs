//! Typed observer registry for connection events.
//!
//! Listeners run synchronously on the controller task, in registration order.
//! Firing iterates a snapshot, so a listener may register, unregister, send or
//! close without corrupting the list. A panicking listener is logged and the
//! remaining listeners still run.

use std::{
    collections::HashMap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use tracing::error;

use super::{protocol::WsMessage, types::EventKind};
use crate::error::ClientError;

/// Close notification details.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close code from the peer's close frame, if one was received.
    pub code: Option<u16>,
    /// Close reason, possibly empty.
    pub reason: String,
}

impl CloseInfo {
    /// A normal (1000) close.
    pub fn normal() -> Self {
        Self {
            code: Some(1000),
            reason: String::new(),
        }
    }

    /// A close without a close frame (connection dropped or never opened).
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: None,
            reason: reason.into(),
        }
    }
}

/// An event delivered to listeners.
#[derive(Debug)]
pub enum Event {
    /// The transport opened.
    Open,
    /// The transport closed.
    Close(CloseInfo),
    /// A raw inbound frame.
    Message(WsMessage),
    /// A transport error or a synthetic lifecycle error.
    Error(ClientError),
}

impl Event {
    /// The kind listeners subscribe to for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Open => EventKind::Open,
            Self::Close(_) => EventKind::Close,
            Self::Message(_) => EventKind::Message,
            Self::Error(_) => EventKind::Error,
        }
    }
}

/// A registered event callback.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Clone)]
struct Entry {
    id: u64,
    listener: Listener,
    once: bool,
}

/// Observer registry keyed by [`EventKind`].
#[derive(Default)]
pub struct EventHub {
    listeners: Mutex<HashMap<EventKind, Vec<Entry>>>,
    next_id: AtomicU64,
}

impl EventHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener. Registering the same `Arc` twice for a kind is a no-op.
    pub fn register(&self, kind: EventKind, listener: Listener) {
        self.insert(kind, listener, false);
    }

    /// Add a listener that removes itself before its first invocation.
    pub fn register_once(&self, kind: EventKind, listener: Listener) {
        self.insert(kind, listener, true);
    }

    fn insert(&self, kind: EventKind, listener: Listener, once: bool) {
        let mut listeners = self.listeners.lock();
        let entries = listeners.entry(kind).or_default();
        if entries
            .iter()
            .any(|e| e.once == once && Arc::ptr_eq(&e.listener, &listener))
        {
            return;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        entries.push(Entry { id, listener, once });
    }

    /// Remove every listener for `kind`.
    pub fn unregister(&self, kind: EventKind) {
        self.listeners.lock().remove(&kind);
    }

    /// Remove every listener.
    pub fn unregister_all(&self) {
        self.listeners.lock().clear();
    }

    /// Number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Invoke every listener registered for the event's kind.
    pub fn fire(&self, event: &Event) {
        let kind = event.kind();
        let snapshot = match self.listeners.lock().get(&kind) {
            Some(entries) => entries.clone(),
            None => return,
        };

        for entry in snapshot {
            // A once-listener fires only if this call is the one that removed it.
            if entry.once && !self.remove_entry(kind, entry.id) {
                continue;
            }
            let listener = &entry.listener;
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!(event = %kind, "Event listener panicked");
            }
        }
    }

    fn remove_entry(&self, kind: EventKind, id: u64) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(entries) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }
}
