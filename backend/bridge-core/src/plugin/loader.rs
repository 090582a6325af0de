use crate::command::registrar::{CommandHandler, CommandMap};
use crate::error::plugin::PluginError;
use crate::error::registry::RegistryError;
use crate::plugin::Plugin;
use crate::plugin::context::PluginServices;
use crate::plugin::state::PluginState;
use crate::registry::CommandRegistry;

use common::ErrorLocation;

use std::panic::{AssertUnwindSafe, Location, catch_unwind};
use std::sync::Arc;

use log::{debug, error, info, warn};

struct LoadedPlugin {
    plugin: Box<dyn Plugin>,
    state: PluginState,
    /// Commands this plugin contributed to the registry.
    commands: Vec<String>,
}

impl LoadedPlugin {
    #[track_caller]
    fn transition(&mut self, next: PluginState) -> Result<(), PluginError> {
        if !self.state.can_transition_to(next) {
            return Err(PluginError::InvalidTransition {
                plugin: self.plugin.id().to_string(),
                from: self.state,
                to: next,
                location: ErrorLocation::from(Location::caller()),
            });
        }
        self.state = next;
        Ok(())
    }
}

/// Outcome of [`PluginLoader::initialize_all`].
#[derive(Debug, Default)]
pub struct InitReport {
    pub initialized: Vec<String>,
    pub failed: Vec<PluginError>,
    /// Disabled in config; left `Registered`.
    pub skipped: Vec<String>,
}

impl InitReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Owns every plugin and drives its lifecycle.
///
/// Passes over the plugin list take `&mut self`, so they never overlap.
#[derive(Default)]
pub struct PluginLoader {
    plugins: Vec<LoadedPlugin>,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plugin in state `Registered`. Registration order is initialization order.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::DuplicatePlugin`] if the id is taken.
    #[track_caller]
    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> Result<(), PluginError> {
        if self.position(plugin.id()).is_some() {
            return Err(PluginError::DuplicatePlugin {
                plugin: plugin.id().to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        info!(
            "Registered plugin '{}' ({} v{})",
            plugin.id(),
            plugin.name(),
            plugin.version()
        );
        self.plugins.push(LoadedPlugin {
            plugin,
            state: PluginState::Registered,
            commands: Vec::new(),
        });
        Ok(())
    }

    /// Initializes every `Registered` plugin in registration order.
    ///
    /// A plugin that fails (error, refused permission or panic) is logged and
    /// moved to `Failed`; the remaining plugins still initialize.
    pub fn initialize_all(&mut self, services: &PluginServices) -> InitReport {
        let mut report = InitReport::default();

        for loaded in &mut self.plugins {
            if loaded.state != PluginState::Registered {
                continue;
            }

            let id = loaded.plugin.id().to_string();
            if services.is_disabled(&id) {
                info!("Plugin '{id}' is disabled, skipping");
                report.skipped.push(id);
                continue;
            }

            match initialize_one(loaded, services) {
                Ok(()) => {
                    info!("Plugin '{id}' initialized");
                    report.initialized.push(id);
                }
                Err(e) => {
                    error!("Plugin '{id}' failed to initialize: {e}");
                    if let Err(transition) = loaded.transition(PluginState::Failed) {
                        warn!("{transition}");
                    }
                    report.failed.push(e);
                }
            }
        }

        report
    }

    /// Command handlers of every initialized plugin, in registration order.
    pub fn collect_command_handlers(&self) -> Vec<Arc<dyn CommandHandler>> {
        self.plugins
            .iter()
            .filter(|loaded| loaded.state == PluginState::Initialized)
            .flat_map(|loaded| loaded.plugin.command_handlers())
            .collect()
    }

    /// Merges the commands of every initialized plugin into `registry`.
    ///
    /// Each plugin's commands are inserted as one map, so a plugin is either
    /// fully registered or not at all.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Registry`] on an invalid declaration or a name
    /// collision. Both are fatal for startup.
    pub fn register_commands(&mut self, registry: &CommandRegistry) -> Result<usize, PluginError> {
        let mut total = 0;

        for loaded in &mut self.plugins {
            if loaded.state != PluginState::Initialized || !loaded.commands.is_empty() {
                continue;
            }

            let mut merged = CommandMap::new();
            for handler in loaded.plugin.command_handlers() {
                for (name, invoker) in handler.create_invokers().map_err(RegistryError::from)? {
                    if merged.contains_key(&name) {
                        return Err(RegistryError::DuplicateCommand {
                            name,
                            location: ErrorLocation::from(Location::caller()),
                        }
                        .into());
                    }
                    merged.insert(name, invoker);
                }
            }

            let names = registry.register(merged)?;
            debug!(
                "Plugin '{}' contributed {} commands",
                loaded.plugin.id(),
                names.len()
            );
            total += names.len();
            loaded.commands = names;
        }

        Ok(total)
    }

    /// Shuts down every initialized plugin in reverse registration order,
    /// then forgets all plugins.
    ///
    /// Failures are logged, never propagated. Returns the ids that were shut
    /// down, in the order it happened.
    pub fn shutdown_all(&mut self) -> Vec<String> {
        let mut shut_down = Vec::new();

        for loaded in self.plugins.iter_mut().rev() {
            if loaded.state != PluginState::Initialized {
                continue;
            }
            let id = loaded.plugin.id().to_string();
            if let Err(e) = shutdown_one(loaded) {
                error!("Plugin '{id}' failed to shut down cleanly: {e}");
            }
            shut_down.push(id);
        }

        self.plugins.clear();
        info!("Shut down {} plugins", shut_down.len());
        shut_down
    }

    /// Shuts down one plugin and removes exactly the commands it contributed.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] for an unknown id, or the plugin's
    /// shutdown error. The plugin is removed either way.
    #[track_caller]
    pub fn unload(&mut self, id: &str, registry: &CommandRegistry) -> Result<(), PluginError> {
        let Some(index) = self.position(id) else {
            return Err(PluginError::NotFound {
                plugin: id.to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        };

        let mut loaded = self.plugins.remove(index);
        let removed = registry.unregister(&loaded.commands);
        info!("Unloading plugin '{id}', removed {removed} commands");

        if loaded.state == PluginState::Initialized {
            shutdown_one(&mut loaded)?;
        }
        Ok(())
    }

    pub fn state(&self, id: &str) -> Option<PluginState> {
        self.position(id).map(|index| self.plugins[index].state)
    }

    /// Commands registered on behalf of `id`.
    pub fn commands_of(&self, id: &str) -> Option<&[String]> {
        self.position(id)
            .map(|index| self.plugins[index].commands.as_slice())
    }

    /// Plugin ids in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.plugins
            .iter()
            .map(|loaded| loaded.plugin.id().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.plugins
            .iter()
            .position(|loaded| loaded.plugin.id() == id)
    }
}

fn initialize_one(loaded: &mut LoadedPlugin, services: &PluginServices) -> Result<(), PluginError> {
    let id = loaded.plugin.id().to_string();
    let declared = loaded.plugin.required_permissions();
    let context = services.context_for(&id, &declared)?;

    let plugin = &mut loaded.plugin;
    match catch_unwind(AssertUnwindSafe(|| plugin.initialize(&context))) {
        Ok(Ok(())) => loaded.transition(PluginState::Initialized),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(PluginError::init(id, "initialize panicked")),
    }
}

fn shutdown_one(loaded: &mut LoadedPlugin) -> Result<(), PluginError> {
    loaded.transition(PluginState::ShutDown)?;

    let plugin = &mut loaded.plugin;
    match catch_unwind(AssertUnwindSafe(|| plugin.shutdown())) {
        Ok(result) => result,
        Err(_) => Err(PluginError::shutdown(loaded.plugin.id(), "shutdown panicked")),
    }
}
