use crate::bridge::Bridge;
use crate::error::emit::EmitError;
use crate::event::Event;
use crate::ipc::protocol::event_script;

use common::ErrorLocation;

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, Location, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, error, warn};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

/// Callback invoked for each matching event.
///
/// Identity is the `Arc` pointer: two listeners built from identical
/// closures are still distinct subscriptions.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Entry {
    id: ListenerId,
    listener: Listener,
    once: bool,
    fired: AtomicBool,
}

#[derive(Default)]
struct Listeners {
    named: HashMap<String, Vec<Arc<Entry>>>,
    wildcard: Vec<Arc<Entry>>,
}

#[derive(Default)]
struct EmitterInner {
    listeners: RwLock<Listeners>,
    bridge: RwLock<Option<Arc<dyn Bridge>>>,
    next_id: AtomicU64,
}

/// Pub/sub hub shared by the host, plugins and the bridge push path.
///
/// `Clone` is cheap and every clone talks to the same listener table.
#[derive(Clone, Default)]
pub struct EventEmitter {
    inner: Arc<EmitterInner>,
}

/// Capability to remove exactly one subscription.
///
/// Dropping it leaves the subscription in place.
#[derive(Debug)]
pub struct Subscription {
    id: ListenerId,
    event: Option<String>,
    emitter: Weak<EmitterInner>,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Removes this subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.emitter.upgrade() {
            Some(inner) => remove_entry(&inner, self.event.as_deref(), self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for EmitterInner {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("EmitterInner").finish_non_exhaustive()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emitter that pushes every event to `bridge` after local listeners ran.
    pub fn with_bridge(bridge: Arc<dyn Bridge>) -> Self {
        let emitter = Self::new();
        emitter.attach_bridge(bridge);
        emitter
    }

    pub fn attach_bridge(&self, bridge: Arc<dyn Bridge>) {
        *self.inner.bridge.write() = Some(bridge);
    }

    pub fn detach_bridge(&self) {
        *self.inner.bridge.write() = None;
    }

    pub fn on<F>(&self, event: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.on_listener(event, Arc::new(callback))
    }

    /// Subscribes an existing listener, so it can later be passed to [`EventEmitter::off`].
    pub fn on_listener(&self, event: impl Into<String>, listener: Listener) -> Subscription {
        self.subscribe(Some(event.into()), listener, false)
    }

    /// Subscribes for a single delivery.
    ///
    /// The subscription is removed before the callback body runs, so a
    /// callback that emits the same event is not re-entered.
    pub fn once<F>(&self, event: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe(Some(event.into()), Arc::new(callback), true)
    }

    /// Subscribes to every event.
    pub fn on_all<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe(None, Arc::new(callback), false)
    }

    /// Removes every subscription of `listener` (by pointer identity) under `event`.
    pub fn off(&self, event: &str, listener: &Listener) -> usize {
        let mut listeners = self.inner.listeners.write();
        let Some(entries) = listeners.named.get_mut(event) else {
            return 0;
        };

        let before = entries.len();
        entries.retain(|entry| !Arc::ptr_eq(&entry.listener, listener));
        let removed = before - entries.len();
        if entries.is_empty() {
            listeners.named.remove(event);
        }
        removed
    }

    /// Removes a subscription by id, whichever list it lives in.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let named: Vec<String> = self.inner.listeners.read().named.keys().cloned().collect();
        named
            .iter()
            .any(|event| remove_entry(&self.inner, Some(event), id))
            || remove_entry(&self.inner, None, id)
    }

    pub fn clear(&self) {
        let mut listeners = self.inner.listeners.write();
        listeners.named.clear();
        listeners.wildcard.clear();
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner
            .listeners
            .read()
            .named
            .get(event)
            .map_or(0, Vec::len)
    }

    pub fn wildcard_count(&self) -> usize {
        self.inner.listeners.read().wildcard.len()
    }

    /// Delivers `payload` as event `event`.
    ///
    /// Listeners run synchronously on the calling thread, exact-name listeners
    /// first, then wildcard listeners, each group in subscription order. A
    /// listener that panics is logged and skipped. Finally the event is pushed
    /// to the bridge, best-effort; push failures are logged, never returned.
    pub fn emit(&self, event: &str, payload: Value) {
        let event = Event::new(event, payload);

        let (named, wildcard) = {
            let listeners = self.inner.listeners.read();
            (
                listeners.named.get(event.name()).cloned().unwrap_or_default(),
                listeners.wildcard.clone(),
            )
        };

        for entry in &named {
            self.deliver(entry, Some(event.name()), &event);
        }
        for entry in &wildcard {
            self.deliver(entry, None, &event);
        }

        if let Err(e) = self.push(&event) {
            warn!("Event '{}' not pushed to bridge: {e}", event.name());
        }
    }

    /// Serializes `payload` and emits it.
    ///
    /// A payload that cannot be represented as JSON is logged and dropped.
    pub fn emit_serialized<P: Serialize>(&self, event: &str, payload: &P) {
        match serde_json::to_value(payload) {
            Ok(value) => self.emit(event, value),
            Err(e) => error!("Event '{event}' dropped: payload not serializable: {e}"),
        }
    }

    fn subscribe(&self, event: Option<String>, listener: Listener, once: bool) -> Subscription {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(Entry {
            id,
            listener,
            once,
            fired: AtomicBool::new(false),
        });

        {
            let mut listeners = self.inner.listeners.write();
            match &event {
                Some(name) => listeners.named.entry(name.clone()).or_default().push(entry),
                None => listeners.wildcard.push(entry),
            }
        }

        Subscription {
            id,
            event,
            emitter: Arc::downgrade(&self.inner),
        }
    }

    fn deliver(&self, entry: &Entry, scope: Option<&str>, event: &Event) {
        if entry.once {
            if entry.fired.swap(true, Ordering::SeqCst) {
                return;
            }
            remove_entry(&self.inner, scope, entry.id);
        }

        let listener = &entry.listener;
        if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
            error!(
                "Listener {:?} panicked while handling event '{}'",
                entry.id,
                event.name()
            );
        }
    }

    fn push(&self, event: &Event) -> Result<(), EmitError> {
        let Some(bridge) = self.inner.bridge.read().clone() else {
            return Ok(());
        };

        let script = event_script(event).map_err(|e| EmitError::Serialize {
            event: event.name().to_string(),
            message: e.to_string(),
            location: ErrorLocation::from(Location::caller()),
        })?;

        bridge.eval(&script)?;
        debug!("Pushed event '{}' to bridge", event.name());
        Ok(())
    }
}

fn remove_entry(inner: &EmitterInner, event: Option<&str>, id: ListenerId) -> bool {
    let mut listeners = inner.listeners.write();
    match event {
        Some(name) => {
            let Some(entries) = listeners.named.get_mut(name) else {
                return false;
            };
            let before = entries.len();
            entries.retain(|entry| entry.id != id);
            let removed = entries.len() != before;
            if entries.is_empty() {
                listeners.named.remove(name);
            }
            removed
        }
        None => {
            let before = listeners.wildcard.len();
            listeners.wildcard.retain(|entry| entry.id != id);
            listeners.wildcard.len() != before
        }
    }
}
