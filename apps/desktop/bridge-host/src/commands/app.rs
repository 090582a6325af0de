//! `app:` commands describing and controlling the host process.

use bridge_core::command::{CommandHandler, CommandMap, Registrar};
use bridge_core::error::{InvokeError, RegistrarError};
use bridge_core::plugin::{PluginLoader, PluginState};
use bridge_core::serializer::{CommandSpec, ValueKind};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use log::info;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Notify;

pub const INFO: &str = "app:info";
pub const PLUGINS: &str = "app:plugins";
pub const QUIT: &str = "app:quit";

/// Last known state of every plugin, readable from command handlers.
///
/// The loader itself is owned by the host and mutated through `&mut`; this
/// snapshot is refreshed after each lifecycle pass.
#[derive(Debug, Clone, Default)]
pub struct PluginStates(Arc<RwLock<BTreeMap<String, PluginState>>>);

impl PluginStates {
    pub fn refresh(&self, loader: &PluginLoader) {
        let states = loader
            .ids()
            .into_iter()
            .filter_map(|id| loader.state(&id).map(|state| (id, state)))
            .collect();
        *self.0.write() = states;
    }

    pub fn get(&self, id: &str) -> Option<PluginState> {
        self.0.read().get(id).copied()
    }

    pub fn snapshot(&self) -> Vec<PluginSummary> {
        self.0
            .read()
            .iter()
            .map(|(id, state)| PluginSummary {
                id: id.clone(),
                state: *state,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginSummary {
    pub id: String,
    pub state: PluginState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    pub name: String,
    pub version: &'static str,
    pub data_dir: PathBuf,
    pub uptime_ms: u64,
}

pub struct AppCommands {
    name: String,
    data_dir: PathBuf,
    started: Instant,
    plugins: PluginStates,
    quit: Arc<Notify>,
}

impl AppCommands {
    pub fn new(name: String, data_dir: PathBuf, plugins: PluginStates, quit: Arc<Notify>) -> Self {
        Self {
            name,
            data_dir,
            started: Instant::now(),
            plugins,
            quit,
        }
    }

    fn info(&self) -> AppInfo {
        AppInfo {
            name: self.name.clone(),
            version: env!("CARGO_PKG_VERSION"),
            data_dir: self.data_dir.clone(),
            uptime_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl CommandHandler for AppCommands {
    fn create_invokers(self: Arc<Self>) -> Result<CommandMap, RegistrarError> {
        Registrar::new(self)
            .command_sync(
                CommandSpec::new(INFO).returns(ValueKind::Record),
                |app, _args| Ok::<_, InvokeError>(app.info()),
            )
            .command_sync(
                CommandSpec::new(PLUGINS).returns(ValueKind::Array),
                |app, _args| Ok::<_, InvokeError>(app.plugins.snapshot()),
            )
            .command_sync(
                CommandSpec::new(QUIT).returns(ValueKind::Null),
                |app, _args| {
                    info!("Quit requested through {QUIT}");
                    app.quit.notify_one();
                    Ok::<_, InvokeError>(())
                },
            )
            .finish()
    }
}
