//! Command bridge core.
//!
//! Exposes typed backend commands to an embedded UI surface and pushes events
//! back to it over a two-primitive bridge (`bind` + `eval`).
//!
//! - [`serializer`]: parameter plans, argument decoding, result encoding
//! - [`command`]: invokers, registrars, built-in `bridge:` commands
//! - [`registry`]: the process-wide command table
//! - [`event`]: event emitter with local listeners and bridge push
//! - [`plugin`]: plugin contract, context and loader
//! - [`ipc`]: wire protocol and the dispatch loop
//! - [`bridge`]: bridge trait plus WebSocket and in-memory transports
//! - [`config`]: host configuration and per-plugin settings

pub mod bridge;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod ipc;
pub mod plugin;
pub mod registry;
pub mod serializer;

#[cfg(test)]
mod tests;

pub use error::CoreError;
