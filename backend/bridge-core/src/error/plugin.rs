use crate::error::registry::RegistryError;
use crate::plugin::state::PluginState;

use common::ErrorLocation;

use std::fmt::Display;
use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum PluginError {
    /// A plugin's `initialize` failed. Isolates that plugin only.
    #[error("Plugin Init Error: '{plugin}': {message} {location}")]
    Init {
        plugin: String,
        message: String,
        location: ErrorLocation,
    },

    #[error("Plugin Shutdown Error: '{plugin}': {message} {location}")]
    Shutdown {
        plugin: String,
        message: String,
        location: ErrorLocation,
    },

    #[error("Duplicate Plugin Error: '{plugin}' is already registered {location}")]
    DuplicatePlugin {
        plugin: String,
        location: ErrorLocation,
    },

    #[error("Plugin Not Found Error: '{plugin}' {location}")]
    NotFound {
        plugin: String,
        location: ErrorLocation,
    },

    #[error("Invalid Transition Error: '{plugin}': {from} -> {to} {location}")]
    InvalidTransition {
        plugin: String,
        from: PluginState,
        to: PluginState,
        location: ErrorLocation,
    },

    #[error("Permission Denied Error: '{plugin}' was not granted '{permission}' {location}")]
    PermissionDenied {
        plugin: String,
        permission: String,
        location: ErrorLocation,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl PluginError {
    /// Builds the error a plugin returns from a failed `initialize`.
    #[track_caller]
    pub fn init(plugin: impl Into<String>, error: impl Display) -> Self {
        PluginError::Init {
            plugin: plugin.into(),
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn shutdown(plugin: impl Into<String>, error: impl Display) -> Self {
        PluginError::Shutdown {
            plugin: plugin.into(),
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
