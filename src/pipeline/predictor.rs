use thiserror::Error;
use tracing::debug;

use crate::models::artifacts::ModelArtifact;
use crate::pipeline::features::FeatureBuilder;
use crate::pipeline::record::TripRecord;
use crate::pipeline::timestamp::TimestampParseError;
use crate::traits::features::{stack, FeatureVector};
use crate::traits::model::{Model, ModelError};

#[derive(Error, Debug)]
pub enum PredictError {
    /// A record in the batch has an unreadable pickup time; nothing was predicted
    #[error("record {index}: {source}")]
    Timestamp {
        index: usize,
        #[source]
        source: TimestampParseError,
    },
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Inverse of the `log1p` transform the target was trained on.
///
/// Evaluated in `f32`, the precision the ensemble produces its margin in.
/// Not clamped: a margin below zero yields a negative duration.
#[inline]
pub fn inverse_target(margin: f32) -> f64 {
    f64::from(margin.exp_m1())
}

/// Batched duration prediction over a loaded artifact.
pub struct Predictor;

impl Predictor {
    /// Build the feature vector of every record, in order. The first bad
    /// record fails the whole batch.
    pub fn features(records: &[TripRecord], artifact: &ModelArtifact) -> Result<Vec<FeatureVector>, PredictError> {
        records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                FeatureBuilder::build(record, artifact).map_err(|source| PredictError::Timestamp { index, source })
            })
            .collect()
    }

    /// Predict trip durations in minutes, one per record and in input order.
    ///
    /// All feature vectors are built before the ensemble is invoked, and the
    /// ensemble is called once for the whole batch.
    pub fn predict(records: &[TripRecord], artifact: &ModelArtifact) -> Result<Vec<f64>, PredictError> {
        let features = Self::features(records, artifact)?;
        let matrix = stack(&features, artifact.feature_columns().len());

        debug!(rows = matrix.nrows(), cols = matrix.ncols(), "running batched inference");
        let margins = artifact.ensemble().predict_batch(matrix.view())?;

        Ok(margins.iter().map(|&m| inverse_target(m)).collect())
    }
}
