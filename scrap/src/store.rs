//! MessageStore - the single source of truth for messages
//!
//! Concurrency Model:
//! - The collection lives behind a RwLock; every mutation re-sorts it by date
//!   (most recent first) before the lock is released, so readers never see an
//!   unsorted list.
//! - The snapshot is written to durable storage while the write lock is held,
//!   so persisted snapshots follow mutation order.
//! - Listeners run after the lock is released, with a cloned snapshot.
//! - Persistence failures are logged; memory stays authoritative.

use crate::database::KeyValueStorage;
use crate::models::{sort_by_recency, Message, MessagePatch, PersistedMessage};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Called with the latest sorted list after every change
pub type MessageListener = Arc<dyn Fn(&[Message]) + Send + Sync>;

/// Handle returned by `subscribe`
pub type ListenerId = u64;

/// Snapshot envelope. Same layout the app's persisted state has always used,
/// so existing installs hydrate without migration.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    state: SnapshotState,
    #[serde(default)]
    version: u32,
}

#[derive(Serialize, Deserialize)]
struct SnapshotState {
    #[serde(default)]
    messages: Vec<serde_json::Value>,
}

const SNAPSHOT_VERSION: u32 = 0;

/// Outcome of `hydrate`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HydrateSummary {
    pub loaded: usize,
    pub dropped: usize,
}

pub struct MessageStore {
    storage: Arc<dyn KeyValueStorage>,
    storage_key: String,
    messages: RwLock<Vec<Message>>,
    listeners: Mutex<Vec<(ListenerId, MessageListener)>>,
    next_listener_id: AtomicU64,
}

impl MessageStore {
    /// Create an empty store. Call `hydrate` to load the persisted snapshot.
    pub fn new(storage: Arc<dyn KeyValueStorage>, storage_key: impl Into<String>) -> Self {
        Self {
            storage,
            storage_key: storage_key.into(),
            messages: RwLock::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Create a store and hydrate it from storage
    pub fn open(storage: Arc<dyn KeyValueStorage>, storage_key: impl Into<String>) -> Self {
        let store = Self::new(storage, storage_key);
        store.hydrate();
        store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Current messages, most recent first
    pub fn list(&self) -> Vec<Message> {
        self.messages.read().clone()
    }

    pub fn get(&self, id: &str) -> Option<Message> {
        self.messages.read().iter().find(|m| m.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Write Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a fully-formed message.
    /// Returns `false` for blank text or an id already in the store.
    pub fn add(&self, message: Message) -> bool {
        if !message.is_valid() {
            debug!("Rejected message with blank id or text");
            return false;
        }

        let snapshot = {
            let mut messages = self.messages.write();
            if messages.iter().any(|m| m.id == message.id) {
                warn!(id = %message.id, "Rejected message with duplicate id");
                return false;
            }
            messages.push(message);
            sort_by_recency(&mut messages);
            self.persist(&messages);
            messages.clone()
        };

        self.notify(&snapshot);
        true
    }

    /// Build a message from raw text and insert it. `None` for blank text.
    pub fn add_text(&self, text: &str) -> Option<Message> {
        let message = Message::from_text(text)?;
        self.add(message.clone()).then_some(message)
    }

    /// Shallow-merge `patch` onto the message with `id`.
    /// Returns `false` if no such message exists or the patch would blank the text.
    pub fn update(&self, id: &str, patch: MessagePatch) -> bool {
        let snapshot = {
            let mut messages = self.messages.write();
            let Some(message) = messages.iter_mut().find(|m| m.id == id) else {
                debug!(id, "Update for unknown message ignored");
                return false;
            };
            if !message.apply(patch) {
                debug!(id, "Update would blank message text, ignored");
                return false;
            }
            sort_by_recency(&mut messages);
            self.persist(&messages);
            messages.clone()
        };

        self.notify(&snapshot);
        true
    }

    /// Hard delete. Returns `false` if no such message exists.
    pub fn delete(&self, id: &str) -> bool {
        let snapshot = {
            let mut messages = self.messages.write();
            let before = messages.len();
            messages.retain(|m| m.id != id);
            if messages.len() == before {
                return false;
            }
            self.persist(&messages);
            messages.clone()
        };

        self.notify(&snapshot);
        true
    }

    /// Replace the whole collection. Invalid and duplicate-id records are dropped.
    pub fn set_messages(&self, incoming: Vec<Message>) {
        let (accepted, _) = dedupe_valid(incoming);

        let snapshot = {
            let mut messages = self.messages.write();
            *messages = accepted;
            sort_by_recency(&mut messages);
            self.persist(&messages);
            messages.clone()
        };

        self.notify(&snapshot);
    }

    /// Load the persisted snapshot and adopt it as the in-memory state.
    ///
    /// Records that fail validation are dropped. A missing, unreadable or
    /// unparsable snapshot leaves the store empty; nothing here is fatal.
    pub fn hydrate(&self) -> HydrateSummary {
        let raw = match self.storage.get_string(&self.storage_key) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, key = %self.storage_key, "Failed to read persisted messages");
                None
            }
        };

        let (loaded, summary) = match raw {
            Some(raw) => parse_snapshot(&raw),
            None => (Vec::new(), HydrateSummary::default()),
        };

        if summary.dropped > 0 {
            warn!(dropped = summary.dropped, "Dropped malformed persisted messages");
        }
        debug!(loaded = summary.loaded, "Hydrated message store");

        let snapshot = {
            let mut messages = self.messages.write();
            *messages = loaded;
            messages.clone()
        };

        self.notify(&snapshot);
        summary
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Subscriptions
    // ─────────────────────────────────────────────────────────────────────────

    pub fn subscribe(&self, listener: MessageListener) -> ListenerId {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, listener));
        id
    }

    /// Returns `false` if the id was not subscribed
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn notify(&self, snapshot: &[Message]) {
        // Clone out so a listener may (un)subscribe without deadlocking
        let listeners: Vec<MessageListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(snapshot);
        }
    }

    fn persist(&self, messages: &[Message]) {
        let snapshot = Snapshot {
            state: SnapshotState {
                messages: messages
                    .iter()
                    .filter_map(|m| serde_json::to_value(m.to_persisted()).ok())
                    .collect(),
            },
            version: SNAPSHOT_VERSION,
        };

        let json = match serde_json::to_string(&snapshot) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize messages");
                return;
            }
        };

        if let Err(e) = self.storage.set(&self.storage_key, &json) {
            warn!(error = %e, key = %self.storage_key, "Failed to persist messages");
        }
    }
}

/// Parse a persisted snapshot: the envelope `{"state":{"messages":[..]}}` or a bare array
fn parse_snapshot(raw: &str) -> (Vec<Message>, HydrateSummary) {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Persisted messages are not valid JSON");
            return (Vec::new(), HydrateSummary::default());
        }
    };

    let records = match value {
        serde_json::Value::Array(records) => records,
        other => match serde_json::from_value::<Snapshot>(other) {
            Ok(snapshot) => snapshot.state.messages,
            Err(e) => {
                warn!(error = %e, "Persisted messages have an unknown layout");
                return (Vec::new(), HydrateSummary::default());
            }
        },
    };

    let total = records.len();
    let parsed: Vec<Message> = records
        .into_iter()
        .filter_map(|record| serde_json::from_value::<PersistedMessage>(record).ok())
        .filter_map(PersistedMessage::into_message)
        .collect();

    let (mut messages, _) = dedupe_valid(parsed);
    sort_by_recency(&mut messages);

    let summary = HydrateSummary {
        loaded: messages.len(),
        dropped: total - messages.len(),
    };
    (messages, summary)
}

/// Keep valid messages, first occurrence of each id wins
fn dedupe_valid(messages: Vec<Message>) -> (Vec<Message>, usize) {
    let mut seen = HashSet::new();
    let total = messages.len();
    let kept: Vec<Message> = messages
        .into_iter()
        .filter(|m| m.is_valid() && seen.insert(m.id.clone()))
        .collect();
    let dropped = total - kept.len();
    (kept, dropped)
}
