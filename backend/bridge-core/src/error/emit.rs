use crate::error::bridge::BridgeError;

use common::ErrorLocation;

use thiserror::Error as ThisError;

/// Failure to push an event to the UI surface.
///
/// Only ever logged; `emit` callers never see it.
#[derive(Debug, ThisError)]
pub enum EmitError {
    #[error("Event Serialize Error: '{event}': {message} {location}")]
    Serialize {
        event: String,
        message: String,
        location: ErrorLocation,
    },

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}
