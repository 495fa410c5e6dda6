use serde_json::json;
use tempfile::TempDir;

use trip_duration::testing::{write_artifacts, SAMPLE_MARGIN};
use trip_duration::{
    ApiError, PredictionService, RequestAdapter, ServiceConfig, TripRequest, UnsupportedInputError,
};

async fn loaded_service() -> (TempDir, PredictionService) {
    let dir = tempfile::tempdir().unwrap();
    let config = ServiceConfig::with_model_dir(dir.path());
    write_artifacts(dir.path(), &config.files).unwrap();
    let service = PredictionService::new(config);
    service.load().await.unwrap();
    (dir, service)
}

fn trip() -> serde_json::Value {
    json!({
        "pickup_dt_str": "2020-02-01T08:30:00Z",
        "pulocationid": 132,
        "dolocationid": 48,
        "trip_miles": 5.2
    })
}

fn expected() -> f64 {
    f64::from(SAMPLE_MARGIN.exp_m1())
}

async fn invoke_json(service: &PredictionService, body: serde_json::Value) -> Vec<f64> {
    let (response, content_type) = service
        .invoke(body.to_string().as_bytes(), "application/json")
        .await
        .unwrap();
    assert_eq!(content_type, "application/json");
    RequestAdapter::decode_envelope(&response).unwrap().predictions
}

#[tokio::test]
async fn all_three_payload_shapes_agree() {
    let (_dir, service) = loaded_service().await;

    assert_eq!(invoke_json(&service, trip()).await, vec![expected()]);
    assert_eq!(invoke_json(&service, json!([trip(), trip()])).await, vec![expected(); 2]);
    assert_eq!(
        invoke_json(&service, json!({"instances": [trip(), trip(), trip()]})).await,
        vec![expected(); 3]
    );
    assert_eq!(service.stats().predictions(), 6);
}

#[tokio::test]
async fn empty_instances_return_empty_envelope() {
    let (_dir, service) = loaded_service().await;
    let (response, _) = service.invoke(br#"{"instances": []}"#, "application/json").await.unwrap();
    assert_eq!(response, r#"{"predictions":[]}"#);
}

#[tokio::test]
async fn unsupported_content_type_is_rejected() {
    let (_dir, service) = loaded_service().await;
    let err = service
        .invoke(trip().to_string().as_bytes(), "application/x-npy")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::UnsupportedInput(UnsupportedInputError::ContentType(_))));
    assert_eq!(service.stats().predictions(), 0);
}

#[tokio::test]
async fn malformed_timestamp_predicts_nothing() {
    let (_dir, service) = loaded_service().await;
    let body = json!([trip(), {"pickup_dt_str": "not a time", "pulocationid": 1, "dolocationid": 2, "trip_miles": 1.0}]);
    let err = service
        .invoke(body.to_string().as_bytes(), "application/json")
        .await
        .unwrap_err();
    assert!(err.is_client_error());
    assert!(err.to_string().contains("record 1"));
    assert_eq!(service.stats().predictions(), 0);
}

#[tokio::test]
async fn typed_api_rounds_predictions() {
    let (_dir, service) = loaded_service().await;
    let request: TripRequest = serde_json::from_value(trip()).unwrap();
    let response = service.predict(request).await.unwrap();
    assert_eq!(response.prediction, 34.25);

    let body = serde_json::to_value(&response).unwrap();
    assert_eq!(body["confidence"], serde_json::Value::Null);
    assert_eq!(body["input_data"], trip());
}

#[tokio::test]
async fn requests_before_load_are_retryable() {
    let service = PredictionService::new(ServiceConfig::with_model_dir("/nonexistent"));
    let err = service
        .invoke(trip().to_string().as_bytes(), "application/json")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotReady));
    assert!(err.is_retryable());
    assert_eq!(service.health().status, "unavailable");

    assert!(matches!(service.load().await, Err(ApiError::ArtifactLoad(_))));
    assert!(!service.is_ready());
}
