//! Trip duration inference for high-volume for-hire vehicle trips.
//!
//! Turns raw trip descriptions (pickup time, pickup and dropoff zone, distance)
//! into predicted durations in minutes using a gradient-boosted tree ensemble
//! trained on `log1p(duration)`.

pub mod models;
pub mod pipeline;
pub mod server;
pub mod testing;
pub mod traits;

// Re-export key types for ergonomic use
pub use models::artifacts::{ArtifactFiles, ArtifactLoadError, ArtifactStore, ModelArtifact};
pub use models::xgboost::TreeEnsemble;
pub use pipeline::features::FeatureBuilder;
pub use pipeline::predictor::{PredictError, Predictor};
pub use pipeline::record::TripRecord;
pub use pipeline::timestamp::TimestampParseError;
pub use server::adapter::{PredictionEnvelope, RequestAdapter, UnsupportedInputError};
pub use server::config::ServiceConfig;
pub use server::metrics::ModelStats;
pub use traits::features::FeatureVector;
pub use traits::model::{Model, ModelError};

// Re-export API structures for ease of use
pub use server::api::{
    ApiError,
    ApiResult,
    BatchPredictionResponse,
    HealthStatus,
    PredictionResponse,
    PredictionService,
    TripRequest,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let _record = TripRecord::new("2020-02-01T08:30:00Z", Some(132), Some(48), 5.2);
        let _config = ServiceConfig::default();
        let _files = ArtifactFiles::default();
        let _envelope = PredictionEnvelope::single(1.0);
    }
}
