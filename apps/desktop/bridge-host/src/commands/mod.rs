pub mod app;

pub use app::{AppCommands, PluginStates};
