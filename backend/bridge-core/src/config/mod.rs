pub mod plugins;
pub mod view;

pub use plugins::PluginSettings;
pub use view::ConfigView;

use crate::error::config::ConfigError;
use crate::plugin::permissions::PermissionPolicy;

use common::ErrorLocation;

use std::collections::BTreeMap;
use std::panic::Location;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "bridge.json";
const CONFIG_VERSION: u32 = 1;

pub const DEFAULT_APP_NAME: &str = "bridge-host";
pub const DEFAULT_IPC_PORT: u16 = 19876;

// ============================================
// CONFIG STRUCTS
// ============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_app_name")]
    pub name: String,
    pub data_dir_override: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            data_dir_override: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpcSection {
    #[serde(default = "default_ipc_port")]
    pub port: u16,
    /// Whether the host starts the WebSocket bridge.
    #[serde(default = "default_websocket")]
    pub websocket: bool,
    /// Token clients must present; generated at startup when absent.
    pub auth_token: Option<String>,
}

impl Default for IpcSection {
    fn default() -> Self {
        Self {
            port: default_ipc_port(),
            websocket: default_websocket(),
            auth_token: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginsSection {
    #[serde(default)]
    pub permission_policy: PermissionPolicy,
    /// Plugin id → permissions granted under [`PermissionPolicy::Explicit`].
    #[serde(default)]
    pub grants: BTreeMap<String, Vec<String>>,
    /// Plugin ids that stay registered but are never initialized.
    #[serde(default)]
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub app: AppSection,

    #[serde(default)]
    pub ipc: IpcSection,

    #[serde(default)]
    pub plugins: PluginsSection,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            app: AppSection::default(),
            ipc: IpcSection::default(),
            plugins: PluginsSection::default(),
        }
    }
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}
fn default_ipc_port() -> u16 {
    DEFAULT_IPC_PORT
}
fn default_websocket() -> bool {
    true
}

// ============================================
// IMPLEMENTATION
// ============================================

impl BridgeConfig {
    /// Load config from {config_dir}/bridge.json.
    ///
    /// # Returns
    ///
    /// Returns defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read, parsed or validated.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            info!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|e| {
            warn!("Failed to read config file: {e}");
            ConfigError::ReadError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                source: e,
            }
        })?;

        let config: BridgeConfig = serde_json::from_str(&contents).map_err(|e| {
            warn!("Failed to parse config JSON: {e}");
            ConfigError::ParseError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                reason: e.to_string(),
            }
        })?;

        config.validate()?;

        info!("Config loaded from {}", config_path.display());
        Ok(config)
    }

    /// Save config to {config_dir}/bridge.json using temp file + rename.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if validation, directory creation,
    /// serialization, the write or the rename fails.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        std::fs::create_dir_all(config_dir).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_dir.to_path_buf(),
            source: e,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let temp_path = config_dir.join(format!("{CONFIG_FILE_NAME}.tmp"));

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        std::fs::write(&temp_path, json).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&temp_path, &config_path).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_path.clone(),
            source: e,
        })?;

        info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version == 0 || self.version > CONFIG_VERSION {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "Invalid version: {} (expected 1-{CONFIG_VERSION})",
                    self.version
                ),
            });
        }

        let name = self.app.name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!("Invalid app name: '{}'", self.app.name),
            });
        }

        if let Some(ref token) = self.ipc.auth_token {
            if token.trim().is_empty() {
                return Err(ConfigError::ValidationError {
                    location: ErrorLocation::from(Location::caller()),
                    reason: "ipc.auth_token cannot be empty string".to_string(),
                });
            }
        }

        if let Some(id) = self
            .plugins
            .grants
            .keys()
            .chain(self.plugins.disabled.iter())
            .find(|id| id.trim().is_empty())
        {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!("Invalid plugin id in plugins section: '{id}'"),
            });
        }

        Ok(())
    }

    /// Per-application data directory: the override if set, else `{data_dir}/{app name}`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DirectoryNotFound`] if the platform has no data directory.
    pub fn app_data_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref dir) = self.app.data_dir_override {
            return Ok(dir.clone());
        }

        dirs::data_dir()
            .map(|dir| dir.join(&self.app.name))
            .ok_or_else(|| ConfigError::DirectoryNotFound {
                location: ErrorLocation::from(Location::caller()),
                what: "data directory",
            })
    }

    /// `{app data dir}/plugins/{plugin id}`
    ///
    /// # Errors
    ///
    /// Same as [`BridgeConfig::app_data_dir`].
    pub fn plugin_data_dir(&self, plugin_id: &str) -> Result<PathBuf, ConfigError> {
        Ok(self.app_data_dir()?.join("plugins").join(plugin_id))
    }

    pub fn is_disabled(&self, plugin_id: &str) -> bool {
        self.plugins.disabled.iter().any(|id| id == plugin_id)
    }
}

/// `{config_dir}/{app_name}` as reported by the platform.
///
/// # Errors
///
/// Returns [`ConfigError::DirectoryNotFound`] if the platform has no config directory.
pub fn default_config_dir(app_name: &str) -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(app_name))
        .ok_or_else(|| ConfigError::DirectoryNotFound {
            location: ErrorLocation::from(Location::caller()),
            what: "config directory",
        })
}
