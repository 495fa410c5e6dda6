use ndarray::{Array1, Array2};

/// Ordered feature values for a single trip, aligned with the artifact's column list.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector {
    values: Array1<f64>,
}

impl FeatureVector {
    // Create new feature vector
    pub fn new(values: Vec<f64>) -> Self {
        Self { values: Array1::from(values) }
    }

    /// All-zero vector of the given width
    pub fn zeros(dimension: usize) -> Self {
        Self { values: Array1::zeros(dimension) }
    }

    // number of columns, always the artifact's column count
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn as_array(&self) -> &Array1<f64> {
        &self.values
    }

    pub(crate) fn set(&mut self, position: usize, value: f64) {
        self.values[position] = value;
    }

    pub fn get(&self, position: usize) -> Option<f64> {
        self.values.get(position).copied()
    }
}

/// Stack feature vectors into a `(rows, width)` matrix in `f32`, the precision
/// the tree ensemble evaluates in. Zero rows yields an empty `(0, width)` matrix.
pub fn stack(features: &[FeatureVector], width: usize) -> Array2<f32> {
    let mut matrix = Array2::<f32>::zeros((features.len(), width));
    for (mut row, feature) in matrix.rows_mut().into_iter().zip(features) {
        for (cell, value) in row.iter_mut().zip(feature.as_array().iter()) {
            *cell = *value as f32;
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_vector() {
        let vec = FeatureVector::new(vec![1.0, 2.0, 3.0]);
        assert_eq!(vec.dimension(), 3);
        assert_eq!(vec.as_array()[0], 1.0);
        assert_eq!(vec.as_array()[1], 2.0);
        assert_eq!(vec.get(2), Some(3.0));
        assert_eq!(vec.get(3), None);
    }

    #[test]
    fn test_stack_preserves_row_order() {
        let rows = vec![
            FeatureVector::new(vec![1.0, 2.0]),
            FeatureVector::new(vec![3.0, 4.0]),
        ];
        let matrix = stack(&rows, 2);
        assert_eq!(matrix.shape(), &[2, 2]);
        assert_eq!(matrix[[0, 1]], 2.0);
        assert_eq!(matrix[[1, 0]], 3.0);
    }

    #[test]
    fn test_stack_empty_keeps_width() {
        let matrix = stack(&[], 5);
        assert_eq!(matrix.shape(), &[0, 5]);
    }
}
