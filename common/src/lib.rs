//! Shared building blocks for the bridge workspace.
//!
//! Every error enum in `bridge-core` and `bridge-host` carries an
//! [`ErrorLocation`] so a failure logged far away from its origin still
//! points at the line that produced it.

pub mod error;


pub use error::error_location::ErrorLocation;
