use crate::config::{BridgeConfig, ConfigView, PluginSettings};
use crate::error::config::ConfigError;
use crate::error::plugin::PluginError;
use crate::event::EventEmitter;
use crate::plugin::permissions::{PermissionPolicy, PermissionSet};
use crate::registry::CommandRegistry;

use common::ErrorLocation;

use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::Result as IoResult;
use std::panic::Location;
use std::path::{Path, PathBuf};

use log::{Level, log, log_enabled};

/// Everything the loader needs to build each plugin's [`PluginContext`].
#[derive(Clone)]
pub struct PluginServices {
    pub emitter: EventEmitter,
    pub registry: CommandRegistry,
    pub app_data_dir: PathBuf,
    pub settings: PluginSettings,
    pub policy: PermissionPolicy,
    pub grants: BTreeMap<String, Vec<String>>,
    pub disabled: Vec<String>,
}

impl PluginServices {
    pub fn new(emitter: EventEmitter, registry: CommandRegistry, app_data_dir: PathBuf) -> Self {
        Self {
            emitter,
            registry,
            app_data_dir,
            settings: PluginSettings::default(),
            policy: PermissionPolicy::default(),
            grants: BTreeMap::new(),
            disabled: Vec::new(),
        }
    }

    /// Services carrying the plugin section of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DirectoryNotFound`] if no app data directory can be determined.
    pub fn from_config(
        config: &BridgeConfig,
        settings: PluginSettings,
        emitter: EventEmitter,
        registry: CommandRegistry,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            emitter,
            registry,
            app_data_dir: config.app_data_dir()?,
            settings,
            policy: config.plugins.permission_policy,
            grants: config.plugins.grants.clone(),
            disabled: config.plugins.disabled.clone(),
        })
    }

    pub fn with_settings(mut self, settings: PluginSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_policy(
        mut self,
        policy: PermissionPolicy,
        grants: BTreeMap<String, Vec<String>>,
    ) -> Self {
        self.policy = policy;
        self.grants = grants;
        self
    }

    pub fn with_disabled(mut self, disabled: Vec<String>) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn is_disabled(&self, plugin_id: &str) -> bool {
        self.disabled.iter().any(|id| id == plugin_id)
    }

    /// # Errors
    ///
    /// Returns [`PluginError::Init`] if the policy refuses a declared permission.
    pub(crate) fn context_for(
        &self,
        plugin_id: &str,
        declared: &[String],
    ) -> Result<PluginContext, PluginError> {
        let permissions = self.policy.resolve(plugin_id, declared, &self.grants)?;

        Ok(PluginContext {
            plugin_id: plugin_id.to_string(),
            emitter: self.emitter.clone(),
            registry: self.registry.clone(),
            config: self.settings.view(plugin_id),
            app_data_dir: self.app_data_dir.clone(),
            plugin_data_dir: self.app_data_dir.join("plugins").join(plugin_id),
            permissions,
        })
    }
}

/// What one plugin sees of the host during and after initialization.
#[derive(Clone)]
pub struct PluginContext {
    plugin_id: String,
    emitter: EventEmitter,
    registry: CommandRegistry,
    config: ConfigView,
    app_data_dir: PathBuf,
    plugin_data_dir: PathBuf,
    permissions: PermissionSet,
}

impl PluginContext {
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    /// Read access to the commands registered so far.
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// This plugin's table from `plugins.toml`.
    pub fn config(&self) -> &ConfigView {
        &self.config
    }

    pub fn app_data_dir(&self) -> &Path {
        &self.app_data_dir
    }

    /// `{app data dir}/plugins/{plugin id}`. Not created until asked for.
    pub fn plugin_data_dir(&self) -> &Path {
        &self.plugin_data_dir
    }

    /// Creates the plugin data directory if needed and returns it.
    pub fn ensure_plugin_data_dir(&self) -> IoResult<&Path> {
        std::fs::create_dir_all(&self.plugin_data_dir)?;
        Ok(&self.plugin_data_dir)
    }

    pub fn logger(&self, name: &str) -> PluginLogger {
        PluginLogger {
            target: format!("plugin::{}::{name}", self.plugin_id),
        }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// # Errors
    ///
    /// Returns [`PluginError::PermissionDenied`] if `permission` was not granted.
    #[track_caller]
    pub fn require_permission(&self, permission: &str) -> Result<(), PluginError> {
        if self.has_permission(permission) {
            return Ok(());
        }
        Err(PluginError::PermissionDenied {
            plugin: self.plugin_id.clone(),
            permission: permission.to_string(),
            location: ErrorLocation::from(Location::caller()),
        })
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }
}

/// Logger bound to the target `plugin::<id>::<name>`.
#[derive(Debug, Clone)]
pub struct PluginLogger {
    target: String,
}

impl PluginLogger {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn enabled(&self, level: Level) -> bool {
        log_enabled!(target: self.target.as_str(), level)
    }

    pub fn log(&self, level: Level, message: impl Display) {
        log!(target: self.target.as_str(), level, "{message}");
    }

    pub fn error(&self, message: impl Display) {
        self.log(Level::Error, message);
    }

    pub fn warn(&self, message: impl Display) {
        self.log(Level::Warn, message);
    }

    pub fn info(&self, message: impl Display) {
        self.log(Level::Info, message);
    }

    pub fn debug(&self, message: impl Display) {
        self.log(Level::Debug, message);
    }
}
