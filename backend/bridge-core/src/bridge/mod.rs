//! The boundary between the backend and the UI surface.
//!
//! A bridge offers two primitives and nothing else: `bind` a named hook the UI
//! can call with `(correlation id, raw request)`, and `eval` a script on the
//! UI side. Responses and events are both delivered through `eval`; no
//! acknowledgement comes back.
//!
//! Two implementations ship with the crate:
//!
//! - [`WsBridge`]: localhost WebSocket transport with a token handshake
//! - [`MemoryBridge`]: in-process hooks with scripts captured on a channel

mod connection_state;
mod memory;
mod ws;

pub use memory::MemoryBridge;
pub use ws::WsBridge;

use crate::error::bridge::BridgeError;
use crate::ipc::protocol::CorrelationId;

use std::sync::Arc;

/// Receives `(correlation id, raw request JSON)` for one bound hook.
///
/// May be called from any thread and must return promptly.
pub type HookCallback = Arc<dyn Fn(CorrelationId, String) + Send + Sync>;

pub trait Bridge: Send + Sync {
    /// Exposes `callback` to the UI under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Bind`] if the name is already bound.
    fn bind(&self, name: &str, callback: HookCallback) -> Result<(), BridgeError>;

    /// Runs `script` on the UI surface. Fire-and-forget.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Eval`] if the script could not be handed to the UI.
    fn eval(&self, script: &str) -> Result<(), BridgeError>;
}
