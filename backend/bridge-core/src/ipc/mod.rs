//! Request dispatch between the UI and registered commands.
//!
//! - [`protocol`]: request parsing, response envelopes and script rendering
//! - [`PendingRequests`]: in-flight bookkeeping with at-most-once completion
//! - [`IpcHandler`]: the dispatch loop bound to a [`Bridge`](crate::bridge::Bridge)

mod handler;
mod pending;
pub mod protocol;

pub use handler::IpcHandler;
pub use pending::{PendingRequests, RequestPhase};
pub use protocol::{CorrelationId, ErrorKind, EventEnvelope, Request, Response};
