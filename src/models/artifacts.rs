//! Loading of the trained artifacts the pipeline depends on.
//!
//! A [`ModelArtifact`] is created once at startup and is read-only
//! afterwards, so it can be shared across any number of concurrent
//! predictions behind an `Arc` without locking.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::xgboost::TreeEnsemble;
use crate::pipeline::encoding::TargetEncodingTable;
use crate::pipeline::features::FeatureLayout;
use crate::traits::model::{Model, ModelError};

/// Any artifact missing, unreadable, or structurally invalid.
#[derive(Error, Debug)]
pub enum ArtifactLoadError {
    #[error("cannot read artifact {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("artifact {path} is invalid: {reason}")]
    Invalid { path: PathBuf, reason: String },
    #[error("tree ensemble {path} failed to load: {source}")]
    Ensemble {
        path: PathBuf,
        #[source]
        source: ModelError,
    },
}

/// File names of the four artifacts inside the model directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactFiles {
    pub model: String,
    pub columns: String,
    pub target_encoding: String,
    pub medians: String,
}

impl Default for ArtifactFiles {
    fn default() -> Self {
        Self {
            model: "fhvhv_model_v2_xgb.json".to_string(),
            columns: "fhvhv_model_v2_columns.json".to_string(),
            target_encoding: "fhvhv_model_v2_te_maps.json".to_string(),
            medians: "fhvhv_model_v2_feature_medians.json".to_string(),
        }
    }
}

/// Column name to vector position, resolved once per artifact.
#[derive(Debug, Clone)]
pub struct ColumnIndex {
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    /// Fails with the first duplicated name.
    pub fn new(columns: &[String]) -> Result<Self, String> {
        let mut positions = HashMap::with_capacity(columns.len());
        for (pos, name) in columns.iter().enumerate() {
            if positions.insert(name.clone(), pos).is_some() {
                return Err(name.clone());
            }
        }
        Ok(Self { positions })
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// The trained model together with the metadata needed to feed it.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    ensemble: TreeEnsemble,
    feature_columns: Vec<String>,
    columns: ColumnIndex,
    target_encoding: HashMap<String, TargetEncodingTable>,
    feature_medians: HashMap<String, f64>,
    layout: FeatureLayout,
}

impl ModelArtifact {
    /// Assemble an artifact from already-parsed parts, checking that they agree.
    pub fn from_parts(
        ensemble: TreeEnsemble,
        feature_columns: Vec<String>,
        target_encoding: HashMap<String, TargetEncodingTable>,
        feature_medians: HashMap<String, f64>,
    ) -> Result<Self, String> {
        let columns = ColumnIndex::new(&feature_columns)
            .map_err(|name| format!("duplicate feature column '{}'", name))?;

        if ensemble.num_features() != feature_columns.len() {
            return Err(format!(
                "ensemble expects {} features but the column list has {}",
                ensemble.num_features(),
                feature_columns.len()
            ));
        }
        let names = ensemble.feature_names();
        if !names.is_empty() && names != feature_columns.as_slice() {
            let first = names
                .iter()
                .zip(&feature_columns)
                .position(|(a, b)| a != b)
                .unwrap_or(0);
            return Err(format!(
                "ensemble feature names differ from the column list at position {}",
                first
            ));
        }

        let layout = FeatureLayout::resolve(&columns, &target_encoding, &feature_medians);

        Ok(Self {
            ensemble,
            feature_columns,
            columns,
            target_encoding,
            feature_medians,
            layout,
        })
    }

    pub fn ensemble(&self) -> &TreeEnsemble {
        &self.ensemble
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn columns(&self) -> &ColumnIndex {
        &self.columns
    }

    pub fn target_encoding(&self) -> &HashMap<String, TargetEncodingTable> {
        &self.target_encoding
    }

    pub fn feature_medians(&self) -> &HashMap<String, f64> {
        &self.feature_medians
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }
}

/// Reads the four persisted artifacts from a model directory.
pub struct ArtifactStore;

impl ArtifactStore {
    /// Load every artifact or none: the first failure is returned and no
    /// partially loaded model escapes.
    pub fn load(dir: impl AsRef<Path>, files: &ArtifactFiles) -> Result<ModelArtifact, ArtifactLoadError> {
        let dir = dir.as_ref();
        info!(model_dir = %dir.display(), "loading model artifacts");

        let columns_path = dir.join(&files.columns);
        let feature_columns = parse_columns(&columns_path, read_json(&columns_path)?)?;
        debug!(count = feature_columns.len(), "feature columns loaded");

        let te_path = dir.join(&files.target_encoding);
        let target_encoding = parse_target_encoding(&te_path, read_json(&te_path)?)?;
        debug!(fields = target_encoding.len(), "target-encoding tables loaded");

        let medians_path = dir.join(&files.medians);
        let feature_medians = parse_medians(&medians_path, read_json(&medians_path)?)?;
        debug!(count = feature_medians.len(), "feature medians loaded");

        let model_path = dir.join(&files.model);
        let ensemble = TreeEnsemble::from_file(&model_path).map_err(|source| match source {
            ModelError::IoError(source) => ArtifactLoadError::Read { path: model_path.clone(), source },
            source => ArtifactLoadError::Ensemble { path: model_path.clone(), source },
        })?;

        let artifact = ModelArtifact::from_parts(ensemble, feature_columns, target_encoding, feature_medians)
            .map_err(|reason| ArtifactLoadError::Invalid { path: model_path.clone(), reason })?;

        info!(
            trees = artifact.ensemble().num_trees(),
            features = artifact.feature_columns().len(),
            populated = artifact.layout().populated(),
            "model artifacts loaded"
        );
        Ok(artifact)
    }
}

fn read_json(path: &Path) -> Result<Value, ArtifactLoadError> {
    let text = fs::read_to_string(path).map_err(|source| ArtifactLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ArtifactLoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn invalid(path: &Path, reason: impl Into<String>) -> ArtifactLoadError {
    ArtifactLoadError::Invalid {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn parse_columns(path: &Path, value: Value) -> Result<Vec<String>, ArtifactLoadError> {
    let Value::Array(items) = value else {
        return Err(invalid(path, "expected a JSON array of column names"));
    };

    let columns = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::String(name) => Ok(name),
            other => Err(invalid(path, format!("column {} is not a string: {}", i, other))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    ColumnIndex::new(&columns).map_err(|name| invalid(path, format!("duplicate feature column '{}'", name)))?;
    Ok(columns)
}

fn parse_target_encoding(path: &Path, value: Value) -> Result<HashMap<String, TargetEncodingTable>, ArtifactLoadError> {
    let Value::Object(fields) = value else {
        return Err(invalid(path, "expected a JSON object keyed by field name"));
    };

    let mut tables = HashMap::with_capacity(fields.len());
    for (field, entry) in fields {
        let Value::Object(mut entry) = entry else {
            return Err(invalid(path, format!("entry '{}' is not an object", field)));
        };

        let global = match entry.remove("global") {
            Some(Value::Number(n)) => n.as_f64(),
            Some(_) => None,
            None => return Err(invalid(path, format!("entry '{}' has no 'global' mean", field))),
        }
        .ok_or_else(|| invalid(path, format!("entry '{}' has a non-numeric 'global' mean", field)))?;

        let Some(Value::Object(raw_means)) = entry.remove("means") else {
            return Err(invalid(path, format!("entry '{}' has no 'means' object", field)));
        };

        let mut means = HashMap::with_capacity(raw_means.len());
        for (id, mean) in raw_means {
            let mean = mean
                .as_f64()
                .ok_or_else(|| invalid(path, format!("mean for {}[{}] is not a number", field, id)))?;
            means.insert(id, mean);
        }

        tables.insert(field, TargetEncodingTable::new(means, global));
    }
    Ok(tables)
}

fn parse_medians(path: &Path, value: Value) -> Result<HashMap<String, f64>, ArtifactLoadError> {
    let Value::Object(entries) = value else {
        return Err(invalid(path, "expected a JSON object of feature medians"));
    };

    entries
        .into_iter()
        .map(|(name, median)| match median.as_f64() {
            Some(m) => Ok((name, m)),
            None => Err(invalid(path, format!("median for '{}' is not a number", name))),
        })
        .collect()
}
