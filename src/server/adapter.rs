//! Wire format of the inference endpoint.
//!
//! Accepts three request shapes, all `application/json`:
//!
//! ```text
//! {"instances": [{...}, {...}]}   batch envelope
//! [{...}, {...}]                  bare list
//! {...}                           single trip
//! ```
//!
//! and always answers with `{"predictions": [...]}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::pipeline::record::TripRecord;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Error, Debug)]
pub enum UnsupportedInputError {
    #[error("unsupported content type '{0}', expected application/json")]
    ContentType(String),
    #[error("request body is not UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("request body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported payload shape: {0}")]
    Shape(String),
    #[error("instance {index} is not a trip record: {reason}")]
    Record { index: usize, reason: String },
}

/// A decoded request body, before its elements are read as trips.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestPayload {
    Batch { instances: Vec<Value> },
    List(Vec<Value>),
    Single(Map<String, Value>),
}

impl RequestPayload {
    pub fn classify(value: Value) -> Result<Self, UnsupportedInputError> {
        match value {
            Value::Object(mut object) => match object.remove("instances") {
                Some(Value::Array(instances)) => Ok(RequestPayload::Batch { instances }),
                Some(other) => Err(UnsupportedInputError::Shape(format!(
                    "'instances' must be a list, got {}",
                    kind(&other)
                ))),
                None => Ok(RequestPayload::Single(object)),
            },
            Value::Array(items) => Ok(RequestPayload::List(items)),
            other => Err(UnsupportedInputError::Shape(format!(
                "expected an object or a list, got {}",
                kind(&other)
            ))),
        }
    }

    pub fn into_records(self) -> Result<Vec<TripRecord>, UnsupportedInputError> {
        let items = match self {
            RequestPayload::Batch { instances } => instances,
            RequestPayload::List(items) => items,
            RequestPayload::Single(object) => vec![Value::Object(object)],
        };

        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                if !item.is_object() {
                    return Err(UnsupportedInputError::Record {
                        index,
                        reason: format!("expected an object, got {}", kind(&item)),
                    });
                }
                serde_json::from_value(item).map_err(|e| UnsupportedInputError::Record {
                    index,
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Response body of the inference endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionEnvelope {
    pub predictions: Vec<f64>,
}

impl PredictionEnvelope {
    pub fn single(prediction: f64) -> Self {
        Self { predictions: vec![prediction] }
    }

    pub fn batch(predictions: Vec<f64>) -> Self {
        Self { predictions }
    }
}

pub struct RequestAdapter;

impl RequestAdapter {
    /// Decode a request body into trip records, in request order.
    pub fn decode(body: &[u8], content_type: &str) -> Result<Vec<TripRecord>, UnsupportedInputError> {
        if !is_json(content_type) {
            return Err(UnsupportedInputError::ContentType(content_type.to_string()));
        }
        let text = std::str::from_utf8(body)?;
        let value: Value = serde_json::from_str(text)?;
        RequestPayload::classify(value)?.into_records()
    }

    /// Serialize predictions into the response body and its content type.
    pub fn encode(predictions: &[f64]) -> Result<(String, &'static str), serde_json::Error> {
        let body = serde_json::to_string(&PredictionEnvelope::batch(predictions.to_vec()))?;
        Ok((body, JSON_CONTENT_TYPE))
    }

    pub fn decode_envelope(body: &str) -> Result<PredictionEnvelope, serde_json::Error> {
        serde_json::from_str(body)
    }
}

fn is_json(content_type: &str) -> bool {
    content_type
        .trim()
        .get(..JSON_CONTENT_TYPE.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(JSON_CONTENT_TYPE))
}
