use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Read-only settings handed to a plugin.
///
/// Cloning shares the underlying table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigView {
    values: Arc<Map<String, Value>>,
}

impl ConfigView {
    pub fn new(values: Map<String, Value>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Typed lookup. `None` if the key is missing or does not fit `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
