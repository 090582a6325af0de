//! Per-plugin settings from `{config_dir}/plugins.toml`.
//!
//! Each top-level table is keyed by plugin id:
//!
//! ```toml
//! [notes]
//! max_notes = 100
//!
//! [math]
//! precision = 4
//! ```

use crate::config::view::ConfigView;
use crate::error::config::ConfigError;

use common::ErrorLocation;

use std::collections::BTreeMap;
use std::panic::Location;
use std::path::Path;

use log::info;
use serde_json::{Map, Value};

const PLUGINS_FILE_NAME: &str = "plugins.toml";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginSettings {
    tables: BTreeMap<String, Map<String, Value>>,
}

impl PluginSettings {
    /// Reads `{config_dir}/plugins.toml`. A missing file yields empty settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] or [`ConfigError::ParseError`].
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(PLUGINS_FILE_NAME);

        if !path.exists() {
            info!("No plugin settings at {}", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
            location: ErrorLocation::from(Location::caller()),
            path: path.clone(),
            source: e,
        })?;

        let settings = Self::parse(&contents).map_err(|reason| ConfigError::ParseError {
            location: ErrorLocation::from(Location::caller()),
            path: path.clone(),
            reason,
        })?;

        info!(
            "Loaded settings for {} plugins from {}",
            settings.tables.len(),
            path.display()
        );
        Ok(settings)
    }

    /// Parses TOML text where every top-level value is a table.
    pub fn parse(contents: &str) -> Result<Self, String> {
        let document: toml::Table = toml::from_str(contents).map_err(|e| e.to_string())?;

        let mut tables = BTreeMap::new();
        for (id, value) in document {
            let toml::Value::Table(table) = value else {
                return Err(format!("'{id}' must be a table of plugin settings"));
            };
            let Value::Object(object) = serde_json::to_value(table).map_err(|e| e.to_string())?
            else {
                return Err(format!("'{id}' did not convert to an object"));
            };
            tables.insert(id, object);
        }

        Ok(Self { tables })
    }

    /// Read-only view of one plugin's table, empty if the plugin has none.
    pub fn view(&self, plugin_id: &str) -> ConfigView {
        ConfigView::new(self.tables.get(plugin_id).cloned().unwrap_or_default())
    }

    pub fn plugin_ids(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}
