//! Startup and shutdown wiring of the host.

use crate::commands::{AppCommands, PluginStates};
use crate::error::HostError;

use bridge_core::CoreError;
use bridge_core::bridge::{Bridge, MemoryBridge, WsBridge};
use bridge_core::command::BridgeCommands;
use bridge_core::config::{BridgeConfig, PluginSettings};
use bridge_core::event::EventEmitter;
use bridge_core::ipc::IpcHandler;
use bridge_core::plugin::{Plugin, PluginLoader, PluginServices};
use bridge_core::registry::CommandRegistry;

use common::ErrorLocation;

use std::panic::Location;
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde_json::json;
use tokio::spawn as TokioSpawn;
use tokio::sync::Notify;

/// Emitted once the dispatch loop is attached and plugins are loaded.
pub const READY_EVENT: &str = "bridge:ready";

/// Emitted after a plugin was unloaded at runtime.
pub const PLUGIN_UNLOADED_EVENT: &str = "bridge:plugin-unloaded";

/// A running host: registry, plugins, emitter and the dispatch loop over one bridge.
pub struct HostApp {
    config: BridgeConfig,
    registry: CommandRegistry,
    emitter: EventEmitter,
    loader: PluginLoader,
    handler: IpcHandler,
    plugin_states: PluginStates,
    ws_bridge: Option<Arc<WsBridge>>,
    quit: Arc<Notify>,
}

impl HostApp {
    /// Starts the host on the transport chosen by `config.ipc`.
    ///
    /// With `websocket` enabled the UI connects to `127.0.0.1:<port>`;
    /// otherwise the host runs headless over an in-memory bridge and is
    /// driven through [`HostApp::handler`].
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Core`] if the transport cannot start or the
    /// registry cannot be assembled.
    pub async fn start(
        config: BridgeConfig,
        settings: PluginSettings,
        plugins: Vec<Box<dyn Plugin>>,
    ) -> Result<Self, HostError> {
        if config.ipc.websocket {
            let ws_bridge = WsBridge::start(config.ipc.port, config.ipc.auth_token.clone())
                .await
                .map_err(|e| core_error(e.into()))?;
            let ws_bridge = Arc::new(ws_bridge);
            let bridge: Arc<dyn Bridge> = ws_bridge.clone();

            match Self::assemble(config, settings, bridge, plugins) {
                Ok(mut app) => {
                    app.ws_bridge = Some(ws_bridge);
                    Ok(app)
                }
                Err(e) => {
                    ws_bridge.shutdown();
                    Err(core_error(e))
                }
            }
        } else {
            let (memory, mut scripts) = MemoryBridge::new();
            TokioSpawn(async move {
                while let Some(script) = scripts.recv().await {
                    debug!("Headless bridge dropped script: {script}");
                }
            });
            Self::with_bridge(config, settings, Arc::new(memory), plugins)
        }
    }

    /// Starts the host over a caller-provided bridge. Must run inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Core`] if the registry cannot be assembled.
    pub fn with_bridge(
        config: BridgeConfig,
        settings: PluginSettings,
        bridge: Arc<dyn Bridge>,
        plugins: Vec<Box<dyn Plugin>>,
    ) -> Result<Self, HostError> {
        Self::assemble(config, settings, bridge, plugins).map_err(core_error)
    }

    /// 1. Registers the `bridge:` and `app:` commands
    /// 2. Registers, initializes and merges plugins
    /// 3. Attaches the dispatch loop to the bridge
    /// 4. Emits [`READY_EVENT`]
    ///
    /// A failure after step 2 shuts down the plugins that initialized.
    fn assemble(
        config: BridgeConfig,
        settings: PluginSettings,
        bridge: Arc<dyn Bridge>,
        plugins: Vec<Box<dyn Plugin>>,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        let registry = CommandRegistry::new();
        registry.register_handler(Arc::new(BridgeCommands::new(&registry)))?;

        let quit = Arc::new(Notify::new());
        let plugin_states = PluginStates::default();
        registry.register_handler(Arc::new(AppCommands::new(
            config.app.name.clone(),
            config.app_data_dir()?,
            plugin_states.clone(),
            Arc::clone(&quit),
        )))?;

        let emitter = EventEmitter::with_bridge(Arc::clone(&bridge));

        let mut loader = PluginLoader::new();
        for plugin in plugins {
            loader.register(plugin)?;
        }

        let services =
            PluginServices::from_config(&config, settings, emitter.clone(), registry.clone())?;
        let report = loader.initialize_all(&services);
        for failure in &report.failed {
            warn!("Plugin not loaded: {failure}");
        }

        let handler = match Self::wire(&mut loader, &registry, &plugin_states, bridge) {
            Ok(handler) => handler,
            Err(e) => {
                error!("Startup aborted after plugin initialization: {e}");
                let order = loader.shutdown_all();
                let removed = registry.unregister_all();
                emitter.detach_bridge();
                debug!("Shut down {order:?}, removed {removed} commands");
                return Err(e);
            }
        };
        info!(
            "Loaded {} plugins ({} failed, {} disabled)",
            report.initialized.len(),
            report.failed.len(),
            report.skipped.len()
        );

        emitter.emit(
            READY_EVENT,
            json!({ "commands": registry.names(), "plugins": report.initialized }),
        );

        Ok(Self {
            config,
            registry,
            emitter,
            loader,
            handler,
            plugin_states,
            ws_bridge: None,
            quit,
        })
    }

    /// Merges plugin commands and attaches the dispatch loop.
    ///
    /// Runs after plugins initialized, so the caller shuts them down on error.
    fn wire(
        loader: &mut PluginLoader,
        registry: &CommandRegistry,
        plugin_states: &PluginStates,
        bridge: Arc<dyn Bridge>,
    ) -> Result<IpcHandler, CoreError> {
        let merged = loader.register_commands(registry)?;
        plugin_states.refresh(loader);
        debug!("Merged {merged} plugin commands");

        let handler = IpcHandler::new(registry.clone(), bridge)?;
        handler.attach()?;
        Ok(handler)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    pub fn handler(&self) -> &IpcHandler {
        &self.handler
    }

    pub fn loader(&self) -> &PluginLoader {
        &self.loader
    }

    pub fn plugin_states(&self) -> &PluginStates {
        &self.plugin_states
    }

    /// The WebSocket transport, when the host was started with one.
    pub fn ws_bridge(&self) -> Option<&Arc<WsBridge>> {
        self.ws_bridge.as_ref()
    }

    /// Unloads one plugin and removes its commands.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Core`] if the plugin is unknown or its shutdown fails.
    pub fn unload_plugin(&mut self, id: &str) -> Result<(), HostError> {
        let result = self.loader.unload(id, &self.registry);
        self.plugin_states.refresh(&self.loader);
        result.map_err(|e| core_error(e.into()))?;

        self.emitter
            .emit(PLUGIN_UNLOADED_EVENT, json!({ "plugin": id }));
        Ok(())
    }

    /// Resolves once `app:quit` has been called.
    pub async fn wait_for_quit(&self) {
        self.quit.notified().await;
    }

    /// Shuts plugins down in reverse order, clears the registry and closes the transport.
    ///
    /// Returns the ids of the plugins whose shutdown ran.
    pub fn shutdown(mut self) -> Vec<String> {
        info!("Host shutting down");
        let order = self.loader.shutdown_all();
        let removed = self.registry.unregister_all();
        debug!("Removed {removed} commands");

        self.emitter.clear();
        self.emitter.detach_bridge();
        if let Some(ws_bridge) = &self.ws_bridge {
            ws_bridge.shutdown();
        }
        if self.handler.in_flight() > 0 {
            warn!(
                "{} requests still in flight at shutdown",
                self.handler.in_flight()
            );
        }
        order
    }
}

#[track_caller]
fn core_error(error: CoreError) -> HostError {
    HostError::Core {
        message: error.to_string(),
        location: ErrorLocation::from(Location::caller()),
    }
}
