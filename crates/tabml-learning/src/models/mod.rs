//! Estimators and the [`Model`] trait they implement.
//!
//! Every estimator is created un-fit with default hyperparameters, configured
//! through [`Model::set_param`], and then fit on a dense matrix. Classifiers
//! work on labels encoded as class indices `0..k` and predict class indices.

mod forest;
mod knn;
mod linear;
mod logistic;
mod tree;

pub use forest::{MaxFeatures, RandomForest};
pub use knn::{KNeighbors, Weighting};
pub use linear::{LinearRegression, RidgeRegression};
pub use logistic::LogisticRegression;
pub use tree::{Criterion, DecisionTree};

use crate::error::{LearningError, Result};
use ndarray::{Array1, Array2};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A supervised estimator.
pub trait Model: Send + Sync + fmt::Debug {
    /// Registered name of the estimator.
    fn name(&self) -> &'static str;

    /// Set one hyperparameter.
    ///
    /// # Errors
    ///
    /// Returns [`LearningError::InvalidHyperparameter`] for an unknown name or
    /// a value of the wrong type or range.
    fn set_param(&mut self, name: &str, value: &Value) -> Result<()>;

    /// Set several hyperparameters, stopping at the first rejection.
    fn set_params(&mut self, params: &BTreeMap<String, Value>) -> Result<()> {
        for (name, value) in params {
            self.set_param(name, value)?;
        }
        Ok(())
    }

    /// Fit the model to training data.
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Make predictions.
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Get feature importances (if available).
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }
}

// =============================================================================
// Input checks
// =============================================================================

/// Check that `x` and `y` are non-empty and row-aligned.
pub(crate) fn check_fit_input(model: &str, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(LearningError::InvalidData(format!(
            "{model}: {} rows of features but {} labels",
            x.nrows(),
            y.len()
        )));
    }
    if x.nrows() == 0 {
        return Err(LearningError::InvalidData(format!("{model}: no training rows")));
    }
    if x.iter().any(|v| !v.is_finite()) || y.iter().any(|v| !v.is_finite()) {
        return Err(LearningError::InvalidData(format!(
            "{model}: training data contains non-finite values"
        )));
    }
    Ok(())
}

/// Check that `x` has the column count seen at fit time.
pub(crate) fn check_predict_input(
    model: &str,
    n_features: Option<usize>,
    x: &Array2<f64>,
) -> Result<()> {
    let Some(expected) = n_features else {
        return Err(LearningError::InvalidData(format!("{model} has not been fitted")));
    };
    if x.ncols() != expected {
        return Err(LearningError::InvalidData(format!(
            "{model} was fitted on {expected} features but got {}",
            x.ncols()
        )));
    }
    Ok(())
}

/// Number of classes of index-encoded labels, rejecting non-index values.
pub(crate) fn count_classes(model: &str, y: &Array1<f64>) -> Result<usize> {
    let mut max = 0usize;
    for &label in y {
        if label < 0.0 || label.fract() != 0.0 {
            return Err(LearningError::InvalidData(format!(
                "{model}: class labels must be non-negative integers, got {label}"
            )));
        }
        max = max.max(label as usize);
    }
    Ok(max + 1)
}

/// Index of the largest value; ties resolve to the lowest index.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

// =============================================================================
// Hyperparameter values
// =============================================================================

pub(crate) fn param_f64(model: &str, name: &str, value: &Value) -> Result<f64> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            LearningError::hyperparameter(model, name, format!("expected a number, got {value}"))
        })
}

pub(crate) fn param_positive_f64(model: &str, name: &str, value: &Value) -> Result<f64> {
    let v = param_f64(model, name, value)?;
    if v <= 0.0 {
        return Err(LearningError::hyperparameter(
            model,
            name,
            format!("must be positive, got {v}"),
        ));
    }
    Ok(v)
}

pub(crate) fn param_usize(model: &str, name: &str, value: &Value) -> Result<usize> {
    let as_int = value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|v| *v >= 0.0 && v.fract() == 0.0)
            .map(|v| v as u64)
    });
    as_int.map(|v| v as usize).ok_or_else(|| {
        LearningError::hyperparameter(
            model,
            name,
            format!("expected a non-negative integer, got {value}"),
        )
    })
}

/// Integer of at least `min`.
pub(crate) fn param_usize_min(model: &str, name: &str, value: &Value, min: usize) -> Result<usize> {
    let v = param_usize(model, name, value)?;
    if v < min {
        return Err(LearningError::hyperparameter(
            model,
            name,
            format!("must be at least {min}, got {v}"),
        ));
    }
    Ok(v)
}

/// Integer of at least 1, or `null` for "unbounded".
pub(crate) fn param_optional_usize(
    model: &str,
    name: &str,
    value: &Value,
) -> Result<Option<usize>> {
    if value.is_null() {
        return Ok(None);
    }
    param_usize_min(model, name, value, 1).map(Some)
}

pub(crate) fn param_bool(model: &str, name: &str, value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| {
            LearningError::hyperparameter(
                model,
                name,
                format!("expected true or false, got {value}"),
            )
        })
}

pub(crate) fn param_seed(model: &str, name: &str, value: &Value) -> Result<Option<u64>> {
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_u64()
        .map(Some)
        .ok_or_else(|| {
            LearningError::hyperparameter(
                model,
                name,
                format!("expected a non-negative integer or null, got {value}"),
            )
        })
}

pub(crate) fn unknown_param(model: &str, name: &str) -> LearningError {
    LearningError::hyperparameter(model, name, "unknown parameter")
}
