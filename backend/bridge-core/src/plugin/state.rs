use std::fmt::{Display, Formatter, Result as FormatResult};

use serde::Serialize;

/// Lifecycle of one plugin inside the loader.
///
/// Legal moves: `Registered -> Initialized -> ShutDown`, and
/// `Registered -> Failed` when initialization does not succeed. `Failed`
/// and `ShutDown` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PluginState {
    Registered,
    Initialized,
    Failed,
    ShutDown,
}

impl PluginState {
    pub fn can_transition_to(self, next: PluginState) -> bool {
        matches!(
            (self, next),
            (PluginState::Registered, PluginState::Initialized)
                | (PluginState::Registered, PluginState::Failed)
                | (PluginState::Initialized, PluginState::ShutDown)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PluginState::Failed | PluginState::ShutDown)
    }
}

impl Display for PluginState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        let state = match self {
            PluginState::Registered => "Registered",
            PluginState::Initialized => "Initialized",
            PluginState::Failed => "Failed",
            PluginState::ShutDown => "ShutDown",
        };
        formatter.write_str(state)
    }
}
