use common::ErrorLocation;

use serde::Serialize;
use thiserror::Error;

/// Errors that can stop the host from starting or shutting down cleanly.
///
/// They are serializable so the same structure can be reported to a UI, but
/// the source location stays attached for the log.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum HostError {
    /// Error from this app
    #[error("Host Error: {message} {location}")]
    Host {
        message: String,
        location: ErrorLocation,
    },

    /// Configuration could not be loaded or is invalid
    #[error("Config Error: {message} {location}")]
    Config {
        message: String,
        location: ErrorLocation,
    },

    /// Error from bridge-core while wiring the dispatch loop
    #[error("Core Error: {message} {location}")]
    Core {
        message: String,
        location: ErrorLocation,
    },

    /// Logger could not be set up
    #[error("Logger Error: {message} {location}")]
    Logger {
        message: String,
        location: ErrorLocation,
    },
}

/// Failures of the notes store.
#[derive(Debug, Error)]
pub enum NotesError {
    #[error("Notes Error: cannot read {path}: {message} {location}")]
    Read {
        path: String,
        message: String,
        location: ErrorLocation,
    },

    #[error("Notes Error: cannot parse {path}: {message} {location}")]
    Parse {
        path: String,
        message: String,
        location: ErrorLocation,
    },

    #[error("Notes Error: cannot write {path}: {message} {location}")]
    Write {
        path: String,
        message: String,
        location: ErrorLocation,
    },

    #[error("Notes Error: note limit of {limit} reached {location}")]
    LimitReached {
        limit: usize,
        location: ErrorLocation,
    },
}

impl NotesError {
    /// The message without its source location, as shown to the UI.
    pub fn reason(&self) -> String {
        match self {
            NotesError::Read { path, message, .. } => format!("cannot read {path}: {message}"),
            NotesError::Parse { path, message, .. } => format!("cannot parse {path}: {message}"),
            NotesError::Write { path, message, .. } => format!("cannot write {path}: {message}"),
            NotesError::LimitReached { limit, .. } => format!("note limit of {limit} reached"),
        }
    }
}
