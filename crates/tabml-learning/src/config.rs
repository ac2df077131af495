//! Run configuration and the task kind.
//!
//! This module provides [`RunConfig`] and its builder for configuring how a
//! specification is searched and evaluated, as well as the [`ProblemType`]
//! enum.
//!
//! # Example
//!
//! ```
//! use tabml_learning::RunConfig;
//!
//! let config = RunConfig::builder()
//!     .cv_folds(5)
//!     .test_size(0.25)
//!     .random_seed(7)
//!     .build()
//!     .expect("valid config");
//! ```

use crate::error::LearningError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tabml_processing::{TargetKind, normalize_token};

/// The kind of prediction task.
///
/// This determines which models are registered, how labels are encoded, how
/// the search scores candidates, and which metrics are reported:
/// - [`Regression`](Self::Regression): R² during search, MSE and R² reported
/// - [`Classification`](Self::Classification): accuracy during search,
///   accuracy and weighted F1 reported
///
/// This enum is marked `#[non_exhaustive]` to allow adding new problem types
/// in future versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ProblemType {
    /// Predicting a continuous value.
    Regression,

    /// Predicting one of a finite set of classes.
    Classification,
}

impl ProblemType {
    /// Canonical lowercase name.
    ///
    /// # Examples
    ///
    /// ```
    /// use tabml_learning::ProblemType;
    ///
    /// assert_eq!(ProblemType::Classification.as_str(), "classification");
    /// assert_eq!(ProblemType::Regression.as_str(), "regression");
    /// ```
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemType::Regression => "regression",
            ProblemType::Classification => "classification",
        }
    }

    /// How the target column is encoded for this task.
    #[must_use]
    pub fn target_kind(&self) -> TargetKind {
        match self {
            ProblemType::Regression => TargetKind::Continuous,
            ProblemType::Classification => TargetKind::Categorical,
        }
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProblemType {
    type Err = LearningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "regression" => Ok(ProblemType::Regression),
            "classification" => Ok(ProblemType::Classification),
            _ => Err(LearningError::InvalidConfig(format!(
                "invalid prediction type '{s}'. Valid values are: regression, classification"
            ))),
        }
    }
}

impl Serialize for ProblemType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProblemType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Configuration for searching and evaluating a specification.
///
/// Use [`RunConfig::builder()`] to construct a configuration with the builder
/// pattern. All fields have defaults.
///
/// # Validation
///
/// The builder validates the following constraints on [`build()`](RunConfigBuilder::build):
/// - `test_size` must be in range `(0.0, 1.0)` (exclusive)
/// - `cv_folds` must be at least 2
/// - `n_jobs` must be `-1` or at least 1
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunConfig {
    /// Fraction of rows held out for the final evaluation (default: 0.2).
    pub test_size: f64,

    /// Number of cross-validation folds in the search (default: 3).
    pub cv_folds: usize,

    /// Seed for the split, the fold shuffle and seeded strategies (default: 42).
    pub random_seed: u64,

    /// Parallelism of the hyperparameter search (default: -1).
    ///
    /// - `-1`: Use the global thread pool (all available cores)
    /// - `n >= 1`: Use a dedicated pool of exactly `n` threads
    pub n_jobs: i32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            cv_folds: 3,
            random_seed: 42,
            n_jobs: -1,
        }
    }
}

impl RunConfig {
    /// Create a new builder for `RunConfig`.
    #[must_use]
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }
}

/// Builder for [`RunConfig`].
///
/// Created via [`RunConfig::builder()`]. All setters return `self` to allow
/// method chaining.
#[derive(Debug, Clone, Default)]
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    /// Set the test size fraction (default: 0.2).
    #[must_use]
    pub fn test_size(mut self, size: f64) -> Self {
        self.config.test_size = size;
        self
    }

    /// Set the number of cross-validation folds (default: 3).
    #[must_use]
    pub fn cv_folds(mut self, folds: usize) -> Self {
        self.config.cv_folds = folds;
        self
    }

    /// Set the random seed for reproducibility (default: 42).
    #[must_use]
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.config.random_seed = seed;
        self
    }

    /// Set the search parallelism (default: -1 for the global pool).
    #[must_use]
    pub fn n_jobs(mut self, jobs: i32) -> Self {
        self.config.n_jobs = jobs;
        self
    }

    /// Build the configuration, validating all settings.
    ///
    /// # Errors
    ///
    /// Returns [`LearningError::InvalidConfig`] if:
    /// - `test_size` is not in range `(0.0, 1.0)`
    /// - `cv_folds` is less than 2
    /// - `n_jobs` is 0 or below -1
    pub fn build(self) -> Result<RunConfig, LearningError> {
        // NaN fails both comparisons
        if !(self.config.test_size > 0.0 && self.config.test_size < 1.0) {
            return Err(LearningError::InvalidConfig(
                "test_size must be between 0.0 and 1.0 (exclusive)".to_string(),
            ));
        }

        if self.config.cv_folds < 2 {
            return Err(LearningError::InvalidConfig(
                "cv_folds must be at least 2".to_string(),
            ));
        }

        if self.config.n_jobs == 0 || self.config.n_jobs < -1 {
            return Err(LearningError::InvalidConfig(
                "n_jobs must be -1 (all cores) or at least 1".to_string(),
            ));
        }

        Ok(self.config)
    }
}
