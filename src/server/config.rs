use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::artifacts::ArtifactFiles;

pub const MODEL_DIR_ENV: &str = "TRIP_MODEL_DIR";
pub const LOG_FILTER_ENV: &str = "TRIP_LOG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration for the prediction service
///
/// ```toml
/// model_dir = "/opt/ml/model"
/// round_digits = 2
/// log_filter = "info"
///
/// [files]
/// model = "fhvhv_model_v2_xgb.json"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Directory holding the four model artifacts
    pub model_dir: PathBuf,
    pub files: ArtifactFiles,
    /// Decimal places of predictions returned by the typed API
    pub round_digits: usize,
    /// `tracing` filter used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            files: ArtifactFiles::default(),
            round_digits: 2,
            log_filter: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Default configuration reading artifacts from `model_dir`
    pub fn with_model_dir(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `TRIP_MODEL_DIR` and `TRIP_LOG` from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_env_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn with_env_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(MODEL_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(filter) = lookup(LOG_FILTER_ENV).filter(|v| !v.trim().is_empty()) {
            self.log_filter = filter;
        }
        self
    }
}
