use crate::error::bridge::BridgeError;

use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

/// Failures of the dispatch loop itself, as opposed to a request's outcome.
#[derive(Debug, ThisError)]
pub enum IpcError {
    #[error("Duplicate Correlation Error: request '{correlation_id}' is already in flight {location}")]
    DuplicateCorrelation {
        correlation_id: String,
        location: ErrorLocation,
    },

    #[error("Completion Error: request '{correlation_id}' has no pending entry {location}")]
    CompletionRejected {
        correlation_id: String,
        location: ErrorLocation,
    },

    #[error("Runtime Error: {message} {location}")]
    Runtime {
        message: String,
        location: ErrorLocation,
    },

    #[error("Serialize Error: {message} {location}")]
    Serialize {
        message: String,
        location: ErrorLocation,
    },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl From<serde_json::Error> for IpcError {
    #[track_caller]
    fn from(error: serde_json::Error) -> Self {
        IpcError::Serialize {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
