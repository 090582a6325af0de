use crate::error::command::InvokeError;
use crate::ipc::protocol::ErrorKind;

use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

/// A failed request, as reported back to the one caller that issued it.
///
/// Every variant is converted into a response envelope at the dispatch
/// boundary; none of them escape into process-level error handling.
#[derive(Debug, Clone, ThisError)]
pub enum DispatchError {
    #[error("Protocol Error: {message} {location}")]
    Protocol {
        message: String,
        location: ErrorLocation,
    },

    #[error("Unknown Command Error: '{name}' {location}")]
    UnknownCommand {
        name: String,
        location: ErrorLocation,
    },

    #[error("Decoding Error: {command}: parameter '{parameter}': {message} {location}")]
    Decoding {
        command: String,
        parameter: String,
        message: String,
        location: ErrorLocation,
    },

    #[error("Handler Error: {command}: {message} {location}")]
    Handler {
        command: String,
        message: String,
        location: ErrorLocation,
    },
}

impl DispatchError {
    #[track_caller]
    pub fn protocol(message: impl Into<String>) -> Self {
        DispatchError::Protocol {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// Attributes an invoker failure to the command that raised it.
    ///
    /// Encoding failures are the handler's output not fitting the wire, so
    /// they are reported under the handler kind.
    pub fn from_invoke(command: &str, error: InvokeError) -> Self {
        match error {
            InvokeError::Decoding {
                parameter,
                message,
                location,
            } => DispatchError::Decoding {
                command: command.to_string(),
                parameter,
                message,
                location,
            },
            InvokeError::Handler { message, location } => DispatchError::Handler {
                command: command.to_string(),
                message,
                location,
            },
            InvokeError::Encoding { message, location } => DispatchError::Handler {
                command: command.to_string(),
                message: format!("failed to encode result: {message}"),
                location,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Protocol { .. } => ErrorKind::Protocol,
            DispatchError::UnknownCommand { .. } => ErrorKind::UnknownCommand,
            DispatchError::Decoding { .. } => ErrorKind::Decoding,
            DispatchError::Handler { .. } => ErrorKind::Handler,
        }
    }

    /// Error string sent to the UI. Source locations stay in the backend log.
    pub fn wire_message(&self) -> String {
        match self {
            DispatchError::Protocol { message, .. } => message.clone(),
            DispatchError::UnknownCommand { name, .. } => format!("unknown command '{name}'"),
            DispatchError::Decoding {
                parameter, message, ..
            } => format!("invalid parameter '{parameter}': {message}"),
            DispatchError::Handler { message, .. } => message.clone(),
        }
    }
}
