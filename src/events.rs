//! Adapter lifecycle events.
//!
//! Events are fire-and-forget notifications mirroring the outcome of each
//! operation; they carry the success/failure payload but are not part of the
//! core's correctness surface. Subscribers that disappear are pruned on the
//! next emission.

use std::sync::mpsc::{channel, Receiver, Sender};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::models::Row;

/// A notification about a completed or failed adapter operation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AdapterEvent {
    QueryCompleted { rows: Vec<Row> },
    QueryFailed { statement: String, error: String },
    NonQueryCompleted { affected_rows: u64 },
    NonQueryFailed { statement: String, error: String },
    ConnectionError { error: String },
    TransactionStarted,
    TransactionCommitted,
    TransactionRolledBack,
    TransactionFailed { error: String },
}

/// Fan-out of adapter events to any number of subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<AdapterEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber and return its receiving end.
    pub fn subscribe(&self) -> Receiver<AdapterEvent> {
        let (tx, rx) = channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver an event to every live subscriber, dropping the dead ones.
    pub fn emit(&self, event: AdapterEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        debug!(?event, listeners = subscribers.len(), "Event emitted");
    }

    /// Number of live subscribers at last emission.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
