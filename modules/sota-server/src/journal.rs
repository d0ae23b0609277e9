//! EventJournal: an in-memory audit trail of every broadcast event.
//!
//! Attaches as an ordinary subscriber, so it sees events in dispatch order.
//! Sequence numbers are assigned on arrival.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use sota_common::{Command, Event};
use sota_interpreter::{EventLike, GlobalHandle, InterpretError, Subscription};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub seq: i64,
    pub ts: DateTime<Utc>,
    pub event: Event,
}

impl JournalEntry {
    pub fn event_type(&self) -> &'static str {
        self.event.event_type()
    }

    /// The audit-log line for this entry.
    pub fn to_json(&self) -> serde_json::Value {
        let payload = serde_json::to_value(&self.event).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to serialize event");
            serde_json::Value::Null
        });
        serde_json::json!({
            "seq": self.seq,
            "ts": self.ts.to_rfc3339(),
            "event_type": self.event_type(),
            "payload": payload,
        })
    }
}

/// Thread-safe journal. Share it through `Arc` for assertions.
pub struct EventJournal {
    next_seq: AtomicI64,
    entries: Mutex<Vec<JournalEntry>>,
    appended: Notify,
}

impl EventJournal {
    pub fn new() -> Self {
        Self {
            next_seq: AtomicI64::new(1),
            entries: Mutex::new(Vec::new()),
            appended: Notify::new(),
        }
    }

    /// Subscribe to `global` and record every event until the dispatcher stops.
    pub async fn attach(
        global: &GlobalHandle<Command, Event>,
    ) -> Result<(Arc<Self>, JoinHandle<()>), InterpretError> {
        let subscription = global.subscribe().await?;
        let journal = Arc::new(Self::new());
        let task = tokio::spawn(Arc::clone(&journal).follow(subscription));
        Ok((journal, task))
    }

    async fn follow(self: Arc<Self>, mut subscription: Subscription<Event>) {
        while let Some(event) = subscription.recv().await {
            let entry = self.record(event);
            debug!(seq = entry.seq, event = entry.event_type(), "Journaled");
        }
        debug!(entries = self.len(), "Journal subscription closed");
    }

    pub fn record(&self, event: Event) -> JournalEntry {
        let entry = JournalEntry {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            ts: Utc::now(),
            event,
        };
        self.lock().push(entry.clone());
        self.appended.notify_waiters();
        entry
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.lock().clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().iter().map(|e| e.event.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Wait until an event matching `predicate` has been journaled.
    pub async fn wait_for(&self, predicate: impl Fn(&Event) -> bool) -> JournalEntry {
        loop {
            let appended = self.appended.notified();
            let found = self.lock().iter().find(|e| predicate(&e.event)).cloned();
            if let Some(entry) = found {
                return entry;
            }
            appended.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<JournalEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for EventJournal {
    fn default() -> Self {
        Self::new()
    }
}
