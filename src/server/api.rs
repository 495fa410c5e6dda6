use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::models::artifacts::{ArtifactLoadError, ArtifactStore, ModelArtifact};
use crate::pipeline::predictor::{PredictError, Predictor};
use crate::pipeline::record::TripRecord;
use crate::server::adapter::{RequestAdapter, UnsupportedInputError};
use crate::server::config::ServiceConfig;
use crate::server::metrics::ModelStats;

pub const SERVICE_NAME: &str = "trip-duration-predictor";

/// API errors
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Model is not loaded")]
    NotReady,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unsupported input: {0}")]
    UnsupportedInput(#[from] UnsupportedInputError),
    #[error("Prediction failed: {0}")]
    Predict(#[from] PredictError),
    #[error("Model failed to load: {0}")]
    ArtifactLoad(#[from] ArtifactLoadError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// The caller sent something that can never succeed as sent.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ApiError::InvalidInput(_)
                | ApiError::UnsupportedInput(_)
                | ApiError::Predict(PredictError::Timestamp { .. })
        )
    }

    /// The same request may succeed later without changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::NotReady)
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// One trip to predict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRequest {
    /// Pickup time in ISO format, e.g. `2020-02-01T08:30:00Z`
    pub pickup_dt_str: String,
    pub pulocationid: i64,
    pub dolocationid: i64,
    /// Trip distance in miles, strictly positive
    pub trip_miles: f64,
}

impl TripRequest {
    pub fn validate(&self) -> ApiResult<()> {
        if !(self.trip_miles > 0.0) {
            return Err(ApiError::InvalidInput(format!(
                "trip_miles must be greater than 0, got {}",
                self.trip_miles
            )));
        }
        Ok(())
    }
}

impl From<&TripRequest> for TripRecord {
    fn from(request: &TripRequest) -> Self {
        TripRecord::new(
            request.pickup_dt_str.clone(),
            Some(request.pulocationid),
            Some(request.dolocationid),
            request.trip_miles,
        )
    }
}

/// Prediction response
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub success: bool,
    /// Predicted duration in minutes
    pub prediction: f64,
    pub confidence: Option<f64>,
    pub input_data: TripRequest,
    pub message: String,
}

/// Batch prediction response
#[derive(Debug, Clone, Serialize)]
pub struct BatchPredictionResponse {
    pub success: bool,
    pub predictions: Vec<f64>,
    pub count: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub model_loaded: bool,
    pub model_dir: String,
    pub stats: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub model_loaded: bool,
}

/// Round to `digits` decimal places on the decimal representation.
fn round_to(value: f64, digits: usize) -> f64 {
    format!("{:.*}", digits, value).parse().unwrap_or(value)
}

/// Trip duration prediction service.
///
/// Starts out not ready; [`PredictionService::load`] reads the artifacts once
/// and every later call shares them read-only.
pub struct PredictionService {
    config: ServiceConfig,
    artifact: OnceCell<Arc<ModelArtifact>>,
    stats: Arc<ModelStats>,
}

impl PredictionService {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            artifact: OnceCell::new(),
            stats: Arc::new(ModelStats::new()),
        }
    }

    /// A service that is ready immediately, serving an artifact built elsewhere
    pub fn with_artifact(config: ServiceConfig, artifact: ModelArtifact) -> Self {
        let service = Self::new(config);
        // a fresh cell is always empty
        let _ = service.artifact.set(Arc::new(artifact));
        service.stats.mark_loaded();
        service
    }

    /// Load the artifacts from the configured directory. Calling it again
    /// once loaded is a no-op.
    pub async fn load(&self) -> ApiResult<()> {
        if self.is_ready() {
            return Ok(());
        }

        let dir = self.config.model_dir.clone();
        let files = self.config.files.clone();
        info!(model_dir = %dir.display(), "loading model");

        let loaded = tokio::task::spawn_blocking(move || ArtifactStore::load(&dir, &files))
            .await
            .map_err(|e| ApiError::Internal(format!("artifact loading task failed: {}", e)))?;

        match loaded {
            Ok(artifact) => {
                if self.artifact.set(Arc::new(artifact)).is_err() {
                    debug!("model was loaded concurrently, keeping the first copy");
                } else {
                    self.stats.mark_loaded();
                    info!("model loaded");
                }
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to load model");
                Err(e.into())
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.artifact.get().is_some()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn stats(&self) -> &ModelStats {
        &self.stats
    }

    fn artifact(&self) -> ApiResult<Arc<ModelArtifact>> {
        self.artifact.get().cloned().ok_or(ApiError::NotReady)
    }

    /// Predict the duration of one trip
    pub async fn predict(&self, request: TripRequest) -> ApiResult<PredictionResponse> {
        let artifact = self.artifact()?;
        if let Err(e) = request.validate() {
            self.stats.record_rejection();
            return Err(e);
        }

        let predictions = self.run(artifact, vec![TripRecord::from(&request)]).await?;
        let prediction = predictions
            .first()
            .copied()
            .ok_or_else(|| ApiError::Internal("no prediction returned for one trip".to_string()))?;
        info!(prediction, "prediction generated");

        Ok(PredictionResponse {
            success: true,
            prediction: round_to(prediction, self.config.round_digits),
            confidence: None,
            input_data: request,
            message: "Prediction generated successfully".to_string(),
        })
    }

    /// Predict several trips in one batched inference
    pub async fn predict_batch(&self, requests: Vec<TripRequest>) -> ApiResult<BatchPredictionResponse> {
        let artifact = self.artifact()?;
        for (index, request) in requests.iter().enumerate() {
            if let Err(e) = request.validate() {
                self.stats.record_rejection();
                return Err(match e {
                    ApiError::InvalidInput(msg) => ApiError::InvalidInput(format!("instance {}: {}", index, msg)),
                    other => other,
                });
            }
        }

        let records = requests.iter().map(TripRecord::from).collect();
        let predictions: Vec<f64> = self
            .run(artifact, records)
            .await?
            .into_iter()
            .map(|p| round_to(p, self.config.round_digits))
            .collect();
        info!(count = predictions.len(), "batch prediction generated");

        Ok(BatchPredictionResponse {
            success: true,
            count: predictions.len(),
            message: format!("{} predictions generated successfully", predictions.len()),
            predictions,
        })
    }

    /// Raw endpoint: decode a body, predict, encode the envelope. Predictions
    /// are returned unrounded.
    pub async fn invoke(&self, body: &[u8], content_type: &str) -> ApiResult<(String, &'static str)> {
        let artifact = self.artifact()?;
        let records = RequestAdapter::decode(body, content_type).map_err(|e| {
            self.stats.record_rejection();
            warn!(error = %e, "rejected request");
            ApiError::from(e)
        })?;

        let predictions = self.run(artifact, records).await?;
        RequestAdapter::encode(&predictions).map_err(|e| ApiError::Internal(format!("cannot encode predictions: {}", e)))
    }

    pub fn health(&self) -> HealthStatus {
        let model_loaded = self.is_ready();
        HealthStatus {
            status: if model_loaded { "healthy" } else { "unavailable" },
            model_loaded,
            model_dir: self.config.model_dir.display().to_string(),
            stats: self.stats.format_stats(),
        }
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            status: "online",
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
            model_loaded: self.is_ready(),
        }
    }

    async fn run(&self, artifact: Arc<ModelArtifact>, records: Vec<TripRecord>) -> ApiResult<Vec<f64>> {
        let trips = records.len();
        let start = Instant::now();

        let result = tokio::task::spawn_blocking(move || Predictor::predict(&records, &artifact))
            .await
            .map_err(|e| ApiError::Internal(format!("inference task failed: {}", e)))?;

        match result {
            Ok(predictions) => {
                self.stats.record_success(trips, start.elapsed());
                debug!(trips, elapsed_us = start.elapsed().as_micros() as u64, "inference done");
                Ok(predictions)
            }
            Err(e) => {
                self.stats.record_failure();
                error!(error = %e, "prediction failed");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_artifact, write_artifacts, SAMPLE_MARGIN};

    fn request(pickup: &str, miles: f64) -> TripRequest {
        TripRequest {
            pickup_dt_str: pickup.to_string(),
            pulocationid: 132,
            dolocationid: 48,
            trip_miles: miles,
        }
    }

    fn ready_service() -> PredictionService {
        PredictionService::with_artifact(ServiceConfig::default(), sample_artifact())
    }

    #[tokio::test]
    async fn test_not_ready_before_load() {
        let service = PredictionService::new(ServiceConfig::default());
        assert!(!service.is_ready());
        assert!(!service.health().model_loaded);

        let err = service.predict(request("2020-02-01T08:30:00Z", 5.2)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotReady));
        assert!(err.is_retryable());
        assert!(matches!(service.invoke(b"{}", "application/json").await, Err(ApiError::NotReady)));
    }

    #[tokio::test]
    async fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::with_model_dir(dir.path());
        write_artifacts(dir.path(), &config.files).unwrap();

        let service = PredictionService::new(config);
        service.load().await.unwrap();
        service.load().await.unwrap();
        assert!(service.is_ready());
        assert_eq!(service.health().status, "healthy");
        assert!(service.status().model_loaded);
    }

    #[tokio::test]
    async fn test_load_failure_keeps_service_unready() {
        let dir = tempfile::tempdir().unwrap();
        let service = PredictionService::new(ServiceConfig::with_model_dir(dir.path()));
        let err = service.load().await.unwrap_err();
        assert!(matches!(err, ApiError::ArtifactLoad(_)));
        assert!(!service.is_ready());
    }

    #[tokio::test]
    async fn test_predict_rounds() {
        let service = ready_service();
        let response = service.predict(request("2020-02-01T08:30:00Z", 5.2)).await.unwrap();
        assert!(response.success);
        assert_eq!(response.prediction, round_to(f64::from(SAMPLE_MARGIN.exp_m1()), 2));
        assert_eq!(response.confidence, None);
        assert_eq!(response.input_data.pulocationid, 132);
        assert_eq!(service.stats().predictions(), 1);
    }

    #[tokio::test]
    async fn test_predict_batch() {
        let service = ready_service();
        let requests = vec![request("2020-02-01T08:30:00Z", 1.0), request("2020-02-01T08:30:00Z", 25.0)];
        let response = service.predict_batch(requests).await.unwrap();
        assert_eq!(response.count, 2);
        assert!(response.predictions[0] < response.predictions[1]);
        assert_eq!(response.message, "2 predictions generated successfully");
    }

    #[tokio::test]
    async fn test_validation_rejects_non_positive_miles() {
        let service = ready_service();
        let err = service.predict(request("2020-02-01T08:30:00Z", 0.0)).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
        assert!(err.is_client_error());

        let err = service
            .predict_batch(vec![request("2020-02-01", 2.0), request("2020-02-01", -1.0)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("instance 1"));
        assert_eq!(service.stats().predictions(), 0);
    }

    #[tokio::test]
    async fn test_malformed_timestamp_runs_no_inference() {
        let service = ready_service();
        let err = service.predict(request("02/01/2020 8am", 5.2)).await.unwrap_err();
        assert!(matches!(err, ApiError::Predict(PredictError::Timestamp { index: 0, .. })));
        assert!(err.is_client_error());
        assert!(!err.is_retryable());
        assert_eq!(service.stats().predictions(), 0);
    }

    #[tokio::test]
    async fn test_invoke_returns_unrounded_envelope() {
        let service = ready_service();
        let body = br#"{"pickup_dt_str": "2020-02-01T08:30:00Z", "pulocationid": 132, "dolocationid": 48, "trip_miles": 5.2}"#;
        let (response, content_type) = service.invoke(body, "application/json").await.unwrap();
        assert_eq!(content_type, "application/json");
        let envelope = RequestAdapter::decode_envelope(&response).unwrap();
        assert_eq!(envelope.predictions, vec![f64::from(SAMPLE_MARGIN.exp_m1())]);
    }

    #[tokio::test]
    async fn test_invoke_rejects_content_type() {
        let service = ready_service();
        let err = service.invoke(b"a,b", "text/csv").await.unwrap_err();
        assert!(matches!(err, ApiError::UnsupportedInput(UnsupportedInputError::ContentType(_))));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(34.251_13, 2), 34.25);
        assert_eq!(round_to(7.0, 2), 7.0);
        assert_eq!(round_to(1.23456, 0), 1.0);
    }
}
