use crate::error::plugin::PluginError;

use common::ErrorLocation;

use std::collections::{BTreeMap, BTreeSet};
use std::panic::Location;

use serde::{Deserialize, Serialize};

/// How a plugin's permissions are decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionPolicy {
    /// A plugin is granted whatever it declares.
    #[default]
    Declared,
    /// Only grants listed in config count; declaring anything else fails initialization.
    Explicit,
}

impl PermissionPolicy {
    /// Works out the permissions `plugin` runs with.
    ///
    /// # Errors
    ///
    /// Under [`PermissionPolicy::Explicit`], returns [`PluginError::Init`]
    /// naming the first declared permission missing from `grants`.
    #[track_caller]
    pub fn resolve(
        self,
        plugin: &str,
        declared: &[String],
        grants: &BTreeMap<String, Vec<String>>,
    ) -> Result<PermissionSet, PluginError> {
        match self {
            PermissionPolicy::Declared => Ok(declared.iter().cloned().collect()),
            PermissionPolicy::Explicit => {
                let granted: PermissionSet = grants
                    .get(plugin)
                    .map(|granted| granted.iter().cloned().collect())
                    .unwrap_or_default();

                match declared.iter().find(|permission| !granted.contains(permission)) {
                    Some(missing) => Err(PluginError::Init {
                        plugin: plugin.to_string(),
                        message: format!("required permission '{missing}' was not granted"),
                        location: ErrorLocation::from(Location::caller()),
                    }),
                    None => Ok(granted),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    pub fn insert(&mut self, permission: impl Into<String>) -> bool {
        self.0.insert(permission.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<String> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
