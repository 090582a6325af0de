pub mod bridge;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod emit;
pub mod ipc;
pub mod plugin;
pub mod registry;

pub use bridge::BridgeError;
pub use command::{InvokeError, RegistrarError};
pub use config::ConfigError;
pub use dispatch::DispatchError;
pub use emit::EmitError;
pub use ipc::IpcError;
pub use plugin::PluginError;
pub use registry::RegistryError;

use thiserror::Error;

/// Failures that can abort host startup or shutdown.
///
/// Per-request failures never show up here; they are delivered back to the
/// caller as a [`DispatchError`].
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ipc(#[from] IpcError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}
