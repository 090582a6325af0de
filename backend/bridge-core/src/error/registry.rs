use crate::error::command::RegistrarError;

use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, Clone, ThisError)]
pub enum RegistryError {
    /// Registration-time name collision. Fatal to startup.
    #[error("Duplicate Command Error: '{name}' is already registered {location}")]
    DuplicateCommand {
        name: String,
        location: ErrorLocation,
    },

    #[error("Unknown Command Error: '{name}' is not registered {location}")]
    UnknownCommand {
        name: String,
        location: ErrorLocation,
    },

    #[error(transparent)]
    Registrar(#[from] RegistrarError),
}
