//! Dense numeric feature matrix with column names.

use crate::error::{LearningError, Result};
use ndarray::{Array2, Axis};
use polars::prelude::*;
use tabml_processing::is_numeric_like;

/// Row-major `f64` matrix whose columns carry names.
///
/// This is the representation passed from the imputer output to the
/// reduction and model stages.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    data: Array2<f64>,
    columns: Vec<String>,
}

impl FeatureMatrix {
    /// Wrap an array, checking that there is one name per column.
    pub fn new(data: Array2<f64>, columns: Vec<String>) -> Result<Self> {
        if data.ncols() != columns.len() {
            return Err(LearningError::InvalidData(format!(
                "matrix has {} columns but {} names were given",
                data.ncols(),
                columns.len()
            )));
        }
        Ok(Self { data, columns })
    }

    /// Convert every column of a frame to `f64`.
    ///
    /// # Errors
    ///
    /// Returns [`LearningError::InvalidData`] if a column still has missing
    /// values or is not numeric (booleans count as 0/1).
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        let mut data = Array2::<f64>::zeros((df.height(), df.width()));
        let mut columns = Vec::with_capacity(df.width());

        for (j, column) in df.get_columns().iter().enumerate() {
            let name = column.name().to_string();
            let series = column.as_materialized_series();

            if !is_numeric_like(series) {
                return Err(LearningError::InvalidData(format!(
                    "feature column '{name}' has type {} and cannot be used as a numeric feature",
                    series.dtype()
                )));
            }
            let nulls = series.null_count();
            if nulls > 0 {
                return Err(LearningError::InvalidData(format!(
                    "feature column '{name}' still has {nulls} missing values; \
                     declare an imputation rule for it"
                )));
            }

            let cast = series
                .cast(&DataType::Float64)
                .map_err(|e| LearningError::InvalidData(format!("column '{name}': {e}")))?;
            let values = cast
                .f64()
                .map_err(|e| LearningError::InvalidData(format!("column '{name}': {e}")))?;
            for (i, value) in values.into_iter().enumerate() {
                data[[i, j]] = value.unwrap_or(f64::NAN);
            }
            columns.push(name);
        }

        Ok(Self { data, columns })
    }

    /// The underlying array.
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.data.ncols()
    }

    /// Keep the given columns, in the given order.
    pub fn select_columns(&self, indices: &[usize]) -> Self {
        Self {
            data: self.data.select(Axis(1), indices),
            columns: indices.iter().map(|&j| self.columns[j].clone()).collect(),
        }
    }

    /// Keep the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            data: self.data.select(Axis(0), indices),
            columns: self.columns.clone(),
        }
    }
}
