//! Gridded data planes
//!
//! A [`DataPlane`] is a 2-D field indexed `[row, col]` (y, x). Missing cells
//! hold [`BAD_DATA`].

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::bad_data::{is_valid, BAD_DATA};
use crate::error::{validation, PreconditionError, VerifyResult};
use crate::pairs::PairStore;
use crate::threshold::ResolvedThreshold;

/// A 2-D gridded field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPlane {
    data: Array2<f64>,
}

impl DataPlane {
    pub fn new(data: Array2<f64>) -> Self {
        Self { data }
    }

    /// Build from row-major values
    pub fn from_vec(ny: usize, nx: usize, values: Vec<f64>) -> VerifyResult<Self> {
        let actual = values.len();
        let data = Array2::from_shape_vec((ny, nx), values).map_err(|_| {
            PreconditionError::LengthMismatch {
                what: "data plane values".to_string(),
                expected: ny * nx,
                actual,
            }
        })?;
        Ok(Self { data })
    }

    /// Field of a single value
    pub fn filled(ny: usize, nx: usize, value: f64) -> Self {
        Self {
            data: Array2::from_elem((ny, nx), value),
        }
    }

    /// (ny, nx)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn ny(&self) -> usize {
        self.data.nrows()
    }

    pub fn nx(&self) -> usize {
        self.data.ncols()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[[row, col]]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[[row, col]] = value;
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.data
    }

    /// Values in row-major order
    pub fn to_vec(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    /// Number of cells holding valid data
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&v| is_valid(v)).count()
    }

    /// Binary field: 1 where the threshold holds, 0 where not, bad data where missing
    pub fn threshold(&self, thresh: &ResolvedThreshold) -> DataPlane {
        Self {
            data: self.data.mapv(|v| {
                if !is_valid(v) {
                    BAD_DATA
                } else if thresh.check(v) {
                    1.0
                } else {
                    0.0
                }
            }),
        }
    }

    /// Pair two same-shaped fields cell by cell, row-major
    pub fn pair_with(&self, obs: &DataPlane) -> VerifyResult<PairStore> {
        validation::validate_shape(self.shape(), obs.shape())?;
        PairStore::new(self.to_vec(), obs.to_vec())
    }
}

impl From<Array2<f64>> for DataPlane {
    fn from(data: Array2<f64>) -> Self {
        Self::new(data)
    }
}
