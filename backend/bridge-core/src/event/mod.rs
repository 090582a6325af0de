//! Backend → UI events and in-process listeners.
//!
//! [`EventEmitter::emit`] notifies listeners registered for the exact event
//! name, then wildcard listeners, then pushes the event to the bridge. Each
//! emit works on a snapshot of the listener lists taken when it starts, so
//! subscribing or unsubscribing from inside a listener never disturbs the
//! emit in progress.

mod emitter;

pub use emitter::{EventEmitter, Listener, ListenerId, Subscription};

use crate::ipc::protocol::EventEnvelope;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;

/// One emitted event. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    name: String,
    payload: Value,
    timestamp: u64,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            timestamp: epoch_millis(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Milliseconds since the Unix epoch at construction.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn envelope(&self) -> EventEnvelope {
        EventEnvelope {
            payload: self.payload.clone(),
            timestamp: self.timestamp,
        }
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
