//! Immutable key-value map handed to a tenant at creation time.

use std::collections::HashMap;

/// A tenant's immutable environment. Built once at tenant creation and
/// never mutated afterward.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Builds an environment from an owned map.
    pub fn new(vars: HashMap<String, String>) -> Self {
        Self { vars }
    }

    /// Looks up a variable by name.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Iterates over all key-value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Environment {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}
