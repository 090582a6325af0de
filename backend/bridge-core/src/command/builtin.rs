//! Commands provided by the bridge itself under the reserved `bridge:` prefix.

use crate::command::registrar::{CommandHandler, CommandMap, Registrar};
use crate::error::command::{InvokeError, RegistrarError};
use crate::registry::{CommandRegistry, WeakCommandRegistry};
use crate::serializer::{CommandSpec, ValueKind};

use std::sync::Arc;

use serde_json::{Value, json};

pub const LIST_COMMANDS: &str = "bridge:commands";
pub const PING: &str = "bridge:ping";

/// Introspection commands the UI can call before anything else is loaded.
///
/// - `bridge:commands` lists every registered command with its parameter plan.
/// - `bridge:ping` answers `{"pong": true, "version": <crate version>}`.
pub struct BridgeCommands {
    registry: WeakCommandRegistry,
}

impl BridgeCommands {
    /// Holds only a weak handle, since the registry in turn owns these invokers.
    pub fn new(registry: &CommandRegistry) -> Self {
        Self {
            registry: registry.downgrade(),
        }
    }
}

impl CommandHandler for BridgeCommands {
    fn create_invokers(self: Arc<Self>) -> Result<CommandMap, RegistrarError> {
        Registrar::reserved(self)
            .command_sync(
                CommandSpec::new(LIST_COMMANDS).returns(ValueKind::Array),
                |commands, _args| {
                    let registry = commands
                        .registry
                        .upgrade()
                        .ok_or_else(|| InvokeError::handler("command registry is gone"))?;
                    Ok(registry.specs())
                },
            )
            .command_sync(
                CommandSpec::new(PING).returns(ValueKind::Record),
                |_commands, _args| -> Result<Value, InvokeError> {
                    Ok(json!({ "pong": true, "version": env!("CARGO_PKG_VERSION") }))
                },
            )
            .finish()
    }
}
