//! Engine settings loaded from a JSON file.
//!
//! The file lives in the standard configuration directory
//! (`~/.config/manifold/engine.json` on most platforms) unless
//! [`CONFIG_PATH_ENV`] points elsewhere. A missing file yields defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable allowing callers to override the configuration file path.
pub const CONFIG_PATH_ENV: &str = "MANIFOLD_CONFIG_PATH";

/// Default filename for the JSON payload.
pub const CONFIG_FILE_NAME: &str = "engine.json";

pub const DEFAULT_MAX_INSTANCES: usize = 10_000;

/// Error surfaced when reading configuration fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error at {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Tunables applied to every process instance run by an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on the instances a single multi-instance activity may create.
    pub max_instances: usize,
    /// Record history events.
    pub history_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_instances: DEFAULT_MAX_INSTANCES,
            history_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Load from [`CONFIG_PATH_ENV`] or the default config location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&default_config_path())
    }

    /// Load from an explicit path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data).map_err(|source| ConfigError::Serialization {
                path: path.to_path_buf(),
                source,
            }),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No engine config file; using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

/// Resolve the configuration path, honouring [`CONFIG_PATH_ENV`].
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("manifold")
        .join(CONFIG_FILE_NAME)
}
