//! Settings shared by the engine and the CLI.
//!
//! Settings may come from a JSON file:
//!
//! ```json
//! { "layers": ["roads", "rivers"], "geometry_policy": "strict", "pretty": true }
//! ```
//!
//! Every key is optional. Command-line flags take precedence over file values.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How heterogeneous merges treat differing geometry kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryPolicy {
    /// Skip the layer whenever the kinds differ.
    Strict,
    /// Promote single-part secondary geometry when the primary kind is its
    /// multi-part counterpart; skip other mismatches.
    #[default]
    Promote,
    /// Merge regardless of kind.
    Ignore,
}

impl GeometryPolicy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryPolicy::Strict => "strict",
            GeometryPolicy::Promote => "promote",
            GeometryPolicy::Ignore => "ignore",
        }
    }
}

impl fmt::Display for GeometryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeometryPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(GeometryPolicy::Strict),
            "promote" => Ok(GeometryPolicy::Promote),
            "ignore" => Ok(GeometryPolicy::Ignore),
            _ => Err(ConfigError::InvalidOption {
                option: "geometry_policy".to_string(),
                message: format!("'{s}' is not one of strict, promote, ignore"),
            }),
        }
    }
}

/// Fusion settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FusionConfig {
    /// Layer filter; `None` processes every layer.
    pub layers: Option<Vec<String>>,
    pub geometry_policy: GeometryPolicy,
    /// Indent written output.
    pub pretty: bool,
}

impl FusionConfig {
    /// Parses settings from JSON text. `path` is only used in errors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] for invalid JSON or unknown keys and
    /// [`ConfigError::InvalidOption`] for an empty layer filter.
    pub fn from_json(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: FusionConfig =
            serde_json::from_str(text).map_err(|err| ConfigError::Malformed {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or as [`FusionConfig::from_json`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text, path)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(layers) = &self.layers
            && layers.is_empty()
        {
            return Err(ConfigError::InvalidOption {
                option: "layers".to_string(),
                message: "list must not be empty; omit it to process every layer".to_string(),
            });
        }
        Ok(())
    }

    /// Replaces the layer filter when `layers` is non-empty.
    #[must_use]
    pub fn with_layers(mut self, layers: Vec<String>) -> Self {
        if !layers.is_empty() {
            self.layers = Some(layers);
        }
        self
    }
}
