//! Declarative LogBook configuration
//!
//! Loaded from YAML or JSON. Each backend section is optional; an absent
//! section means that backend is not instantiated.
//!
//! ```yaml
//! id: "3"
//! name: resnet-sweep
//! config:
//!   lr: 0.01
//! loggers:
//!   filesystem:
//!     log_dir: runs/3
//!     filename_prefix: "sweep_"
//!   wandb:
//!     project: resnet
//!     key_map:
//!       epoch: step
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::{FilesystemConfig, RemoteConfig};
use crate::error::{Error, Result};
use crate::record::Fields;

fn default_id() -> String {
    "0".to_string()
}

fn default_name() -> String {
    "default_logger".to_string()
}

/// Per-backend sub-configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendConfigs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<FilesystemConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wandb: Option<RemoteConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mlflow: Option<RemoteConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tensorboard: Option<RemoteConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mongo: Option<RemoteConfig>,
}

impl BackendConfigs {
    /// True when no backend section is present.
    pub fn is_empty(&self) -> bool {
        self.filesystem.is_none()
            && self.wandb.is_none()
            && self.mlflow.is_none()
            && self.tensorboard.is_none()
            && self.mongo.is_none()
    }
}

/// Configuration consumed by [`LogBook`](super::LogBook).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogBookConfig {
    /// Stamped into every record as `logbook_id`
    #[serde(default = "default_id")]
    pub id: String,
    /// Display name
    #[serde(default = "default_name")]
    pub name: String,
    /// Experiment config written by `write_experiment_config`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Fields>,
    #[serde(default)]
    pub loggers: BackendConfigs,
}

impl Default for LogBookConfig {
    fn default() -> Self {
        Self {
            id: default_id(),
            name: default_name(),
            config: None,
            loggers: BackendConfigs::default(),
        }
    }
}

impl LogBookConfig {
    /// Load from a `.yaml`/`.yml` or `.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Self::from_yaml_str(&content),
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::config(e.to_string()))
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::config(e.to_string()))
    }
}

/// Build a config with an optional filesystem backend.
///
/// Remote backends can be added to `loggers` afterwards.
pub fn make_config(
    id: impl Into<String>,
    name: impl Into<String>,
    log_dir: Option<PathBuf>,
) -> LogBookConfig {
    LogBookConfig {
        id: id.into(),
        name: name.into(),
        config: None,
        loggers: BackendConfigs {
            filesystem: log_dir.map(FilesystemConfig::new),
            ..BackendConfigs::default()
        },
    }
}
