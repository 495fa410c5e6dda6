use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

/// Error type for the inference runtime
#[derive(Debug)]
pub enum ModelError {
    /// Data dimension mismatch errors
    DimensionMismatch {
        expected: usize,
        actual: usize,
        context: String,
    },
    /// Model file describes something this runtime cannot evaluate
    Unsupported(String),
    /// Structurally invalid model (bad node indices, empty trees)
    InvalidModel(String),
    /// I/O errors (for model loading)
    IoError(std::io::Error),
    /// Errors from deserialization
    SerializationError(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ModelError::DimensionMismatch { expected, actual, context } =>
                write!(f, "Dimension mismatch ({}): expected {}, got {}", context, expected, actual),
            ModelError::Unsupported(msg) => write!(f, "Unsupported model: {}", msg),
            ModelError::InvalidModel(msg) => write!(f, "Invalid model: {}", msg),
            ModelError::IoError(err) => write!(f, "I/O error: {}", err),
            ModelError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl Error for ModelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ModelError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ModelError {
    fn from(err: std::io::Error) -> Self {
        ModelError::IoError(err)
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::SerializationError(err.to_string())
    }
}

/// Core trait for pre-trained regression models evaluated on dense `f32` rows.
///
/// Outputs are on the model's raw margin scale; any target transform is the
/// caller's business.
pub trait Model: Send + Sync {
    /// Number of input columns the model was trained on
    fn num_features(&self) -> usize;

    /// Make a prediction for a single row
    fn predict_row(&self, row: ArrayView1<'_, f32>) -> Result<f32, ModelError>;

    /// Make predictions for every row of a `(rows, num_features)` matrix
    fn predict_batch(&self, matrix: ArrayView2<'_, f32>) -> Result<Array1<f32>, ModelError> {
        if matrix.ncols() != self.num_features() {
            return Err(ModelError::DimensionMismatch {
                expected: self.num_features(),
                actual: matrix.ncols(),
                context: "matrix columns vs model features".to_string(),
            });
        }

        let mut predictions = Array1::zeros(matrix.nrows());
        for (out, row) in predictions.iter_mut().zip(matrix.axis_iter(Axis(0))) {
            *out = self.predict_row(row)?;
        }
        Ok(predictions)
    }
}
