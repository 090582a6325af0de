//! Independently-loaded extensions of the command and event surface.
//!
//! A plugin is registered with the [`PluginLoader`], initialized with a
//! [`PluginContext`], contributes command handlers, and is shut down in
//! reverse registration order. Plugins never talk to each other directly;
//! they share the event emitter and the command registry.

pub mod context;
pub mod loader;
pub mod permissions;
pub mod state;

pub use context::{PluginContext, PluginLogger, PluginServices};
pub use loader::{InitReport, PluginLoader};
pub use permissions::{PermissionPolicy, PermissionSet};
pub use state::PluginState;

use crate::command::registrar::CommandHandler;
use crate::error::plugin::PluginError;

use std::sync::Arc;

pub trait Plugin: Send {
    /// Stable unique id; also the plugin's directory and settings-table name.
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Permissions the plugin needs. Checked against the policy before `initialize`.
    fn required_permissions(&self) -> Vec<String> {
        Vec::new()
    }

    /// # Errors
    ///
    /// Returning an error (usually [`PluginError::Init`]) marks this plugin
    /// failed; other plugins are unaffected.
    fn initialize(&mut self, context: &PluginContext) -> Result<(), PluginError>;

    /// # Errors
    ///
    /// Shutdown errors are logged by the loader and otherwise ignored.
    fn shutdown(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Handlers whose commands are merged into the registry after initialization.
    fn command_handlers(&self) -> Vec<Arc<dyn CommandHandler>>;
}
