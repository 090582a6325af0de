use crate::bridge::{Bridge, HookCallback};
use crate::error::bridge::BridgeError;
use crate::ipc::protocol::CorrelationId;

use common::ErrorLocation;

use std::collections::HashMap;
use std::panic::Location;

use log::debug;
use parking_lot::RwLock;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// In-process bridge.
///
/// The embedder plays the UI: [`MemoryBridge::trigger`] calls a bound hook,
/// and every evaluated script shows up on the receiver returned by
/// [`MemoryBridge::new`].
pub struct MemoryBridge {
    hooks: RwLock<HashMap<String, HookCallback>>,
    scripts: UnboundedSender<String>,
}

impl MemoryBridge {
    pub fn new() -> (Self, UnboundedReceiver<String>) {
        let (scripts, receiver) = unbounded_channel();
        let bridge = Self {
            hooks: RwLock::new(HashMap::new()),
            scripts,
        };
        (bridge, receiver)
    }

    /// Calls hook `name` as the UI would. Returns `false` if nothing is bound there.
    pub fn trigger(&self, name: &str, id: impl Into<CorrelationId>, raw: impl Into<String>) -> bool {
        let Some(callback) = self.hooks.read().get(name).cloned() else {
            debug!("No hook bound under '{name}'");
            return false;
        };
        callback(id.into(), raw.into());
        true
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.hooks.read().contains_key(name)
    }
}

impl Bridge for MemoryBridge {
    #[track_caller]
    fn bind(&self, name: &str, callback: HookCallback) -> Result<(), BridgeError> {
        let mut hooks = self.hooks.write();
        if hooks.contains_key(name) {
            return Err(BridgeError::Bind {
                message: format!("hook '{name}' is already bound"),
                location: ErrorLocation::from(Location::caller()),
            });
        }
        hooks.insert(name.to_string(), callback);
        Ok(())
    }

    #[track_caller]
    fn eval(&self, script: &str) -> Result<(), BridgeError> {
        self.scripts
            .send(script.to_string())
            .map_err(|_| BridgeError::Eval {
                message: String::from("script receiver was dropped"),
                location: ErrorLocation::from(Location::caller()),
            })
    }
}
