use common::ErrorLocation;

use std::fmt::Display;
use std::panic::Location;

use thiserror::Error as ThisError;

/// Failure raised while running a single [`Invoker`](crate::command::Invoker).
///
/// Decoding and handler failures are kept apart so the caller can tell a
/// malformed argument from a command that ran and refused.
#[derive(Debug, Clone, ThisError)]
pub enum InvokeError {
    #[error("Decoding Error: parameter '{parameter}': {message} {location}")]
    Decoding {
        parameter: String,
        message: String,
        location: ErrorLocation,
    },

    #[error("Handler Error: {message} {location}")]
    Handler {
        message: String,
        location: ErrorLocation,
    },

    #[error("Encoding Error: {message} {location}")]
    Encoding {
        message: String,
        location: ErrorLocation,
    },
}

impl InvokeError {
    /// Wraps a handler's own failure, keeping its message verbatim.
    #[track_caller]
    pub fn handler(error: impl Display) -> Self {
        InvokeError::Handler {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn decoding(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        InvokeError::Decoding {
            parameter: parameter.into(),
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// The message without the location suffix.
    pub fn message(&self) -> &str {
        match self {
            InvokeError::Decoding { message, .. }
            | InvokeError::Handler { message, .. }
            | InvokeError::Encoding { message, .. } => message,
        }
    }
}

/// Errors raised while a registrar builds the invokers of one handler type.
#[derive(Debug, Clone, ThisError)]
pub enum RegistrarError {
    #[error("Reserved Name Error: command '{name}' uses reserved prefix '{prefix}' {location}")]
    ReservedName {
        name: String,
        prefix: &'static str,
        location: ErrorLocation,
    },

    #[error("Invalid Name Error: command '{name}': {message} {location}")]
    InvalidName {
        name: String,
        message: String,
        location: ErrorLocation,
    },

    #[error("Duplicate Declaration Error: '{name}' declared twice by {handler} {location}")]
    DuplicateDeclaration {
        name: String,
        handler: &'static str,
        location: ErrorLocation,
    },

    #[error("Invalid Parameter Error: command '{name}': {message} {location}")]
    InvalidParameter {
        name: String,
        message: String,
        location: ErrorLocation,
    },
}
