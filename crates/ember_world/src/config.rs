//! World configuration

use serde::{Deserialize, Serialize};

use crate::error::WorldResult;

/// Configuration for a [`World`](crate::World)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Name used in log output
    pub name: String,
    /// Maximum number of live scene objects
    pub max_objects: u32,
    /// Maximum number of live components
    pub max_components: u32,
    /// Whether the world starts in simulation (play) mode
    pub simulate: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: "World".to_string(),
            max_objects: 1 << 20,
            max_components: 1 << 22,
            simulate: true,
        }
    }
}

impl WorldConfig {
    /// Create a config with the given name and defaults for everything else
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse a config from a TOML document
    pub fn from_toml_str(content: &str) -> WorldResult<Self> {
        Ok(toml::from_str(content)?)
    }
}
