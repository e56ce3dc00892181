//! Dense n-dimensional arrays of `f64`.
//!
//! In memory an absent cell is always `NaN`. The persisted form stores absent
//! cells as `null`; [`to_missing_sentinel`] and [`from_missing_sentinel`] are
//! the only place the two representations meet.

use serde::{Deserialize, Serialize};

/// Row-major n-dimensional array. A shape of `[]` is a scalar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "StoredArray", try_from = "StoredArray")]
pub struct Array {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Array {
    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    pub fn vector(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            data: values,
        }
    }

    /// Build a 2-D array from rows. Returns `None` if the rows are ragged.
    pub fn matrix(rows: Vec<Vec<f64>>) -> Option<Self> {
        let ncols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != ncols) {
            return None;
        }
        let nrows = rows.len();
        Some(Self {
            shape: vec![nrows, ncols],
            data: rows.into_iter().flatten().collect(),
        })
    }

    /// Create an array from existing data. Data must be in row-major order.
    pub fn from_shape(shape: Vec<usize>, data: Vec<f64>) -> Option<Self> {
        let total: usize = shape.iter().product();
        if data.len() != total {
            return None;
        }
        Some(Self { shape, data })
    }

    pub fn filled(shape: Vec<usize>, value: f64) -> Self {
        let total: usize = shape.iter().product();
        Self {
            shape,
            data: vec![value; total],
        }
    }

    /// The marker stored for an evaluation that failed
    pub fn invalid() -> Self {
        Self::scalar(f64::NAN)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// The single value of a scalar (or one-element) array
    pub fn as_scalar(&self) -> Option<f64> {
        if self.data.len() == 1 {
            Some(self.data[0])
        } else {
            None
        }
    }

    /// True when every cell is `NaN` (an empty array counts as invalid)
    pub fn is_all_nan(&self) -> bool {
        self.data.iter().all(|v| v.is_nan())
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Element-wise map producing a new array of the same shape
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            shape: self.shape.clone(),
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Stack equally shaped arrays along a new leading axis.
    pub fn stack(arrays: &[Array]) -> Option<Self> {
        let first = arrays.first()?;
        if arrays.iter().any(|a| a.shape != first.shape) {
            return None;
        }
        let mut shape = Vec::with_capacity(first.ndim() + 1);
        shape.push(arrays.len());
        shape.extend_from_slice(&first.shape);
        let data = arrays.iter().flat_map(|a| a.data.iter().copied()).collect();
        Some(Self { shape, data })
    }
}

/// Cells compare equal when both are `NaN` or both hold the same number, so
/// missing-cell positions have to line up for two arrays to be equal.
impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(a, b)| (a.is_nan() && b.is_nan()) || a == b)
    }
}

impl From<f64> for Array {
    fn from(value: f64) -> Self {
        Array::scalar(value)
    }
}

impl From<Vec<f64>> for Array {
    fn from(values: Vec<f64>) -> Self {
        Array::vector(values)
    }
}

impl<const N: usize> From<[f64; N]> for Array {
    fn from(values: [f64; N]) -> Self {
        Array::vector(values.to_vec())
    }
}

/// Non-finite cells become `None`
pub fn to_missing_sentinel(values: &[f64]) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|&v| if v.is_finite() { Some(v) } else { None })
        .collect()
}

/// `None` cells become NaN
pub fn from_missing_sentinel(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().map(|v| v.unwrap_or(f64::NAN)).collect()
}

/// Persisted form of an [`Array`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredArray {
    shape: Vec<usize>,
    data: Vec<Option<f64>>,
}

impl From<Array> for StoredArray {
    fn from(array: Array) -> Self {
        StoredArray {
            data: to_missing_sentinel(&array.data),
            shape: array.shape,
        }
    }
}

impl TryFrom<StoredArray> for Array {
    type Error = String;

    fn try_from(stored: StoredArray) -> Result<Self, Self::Error> {
        let data = from_missing_sentinel(&stored.data);
        let expected: usize = stored.shape.iter().product();
        Array::from_shape(stored.shape, data).ok_or_else(|| {
            format!(
                "array has {} cells but its shape needs {expected}",
                stored.data.len()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_rejects_ragged_rows() {
        assert!(Array::matrix(vec![vec![1.0, 2.0], vec![3.0]]).is_none());

        let m = Array::matrix(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(m.shape(), &[2, 3]);
        assert_eq!(m.data()[3..], [4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_nan_cells_compare_equal() {
        let a = Array::vector(vec![1.0, f64::NAN]);
        let b = Array::vector(vec![1.0, f64::NAN]);
        let c = Array::vector(vec![f64::NAN, 1.0]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_missing_sentinel_translation() {
        let values = [0.0, 1.0, 2.0, f64::NAN, 4.0, f64::NAN, f64::NAN];
        let stored = to_missing_sentinel(&values);
        assert_eq!(
            stored,
            vec![Some(0.0), Some(1.0), Some(2.0), None, Some(4.0), None, None]
        );

        let restored = from_missing_sentinel(&stored);
        assert_eq!(Array::vector(restored), Array::vector(values.to_vec()));
    }

    #[test]
    fn test_stored_shape_mismatch_is_rejected() {
        let stored = StoredArray {
            shape: vec![3],
            data: vec![Some(1.0)],
        };
        assert!(Array::try_from(stored).is_err());
    }

    #[test]
    fn test_invalid_marker() {
        assert!(Array::invalid().is_all_nan());
        assert_eq!(Array::invalid().ndim(), 0);
        assert!(!Array::vector(vec![f64::NAN, 1.0]).is_all_nan());
    }

    #[test]
    fn test_stack() {
        let stacked = Array::stack(&[Array::from([1.0, 2.0]), Array::from([3.0, 4.0])]).unwrap();
        assert_eq!(stacked.shape(), &[2, 2]);
        assert!(Array::stack(&[Array::from([1.0]), Array::from([1.0, 2.0])]).is_none());
    }
}
