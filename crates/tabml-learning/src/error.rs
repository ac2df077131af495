//! Error types for the tabml-learning crate.
//!
//! This module defines [`LearningError`], the main error type used throughout
//! the crate. All public API functions return `Result<T, LearningError>`.
//!
//! # Error Classes
//!
//! Errors fall into two classes, distinguished by
//! [`LearningError::is_configuration_error`]:
//! - **Configuration errors** stop a run before any model is trained
//!   (unknown reduction method, missing column, malformed document)
//! - **Per-model errors** are recorded against one candidate model and never
//!   affect the others (invalid hyperparameter, failed search or refit)
//!
//! # Example
//!
//! ```no_run
//! use tabml_learning::{LearningError, RunConfig};
//!
//! fn configure() -> Result<RunConfig, LearningError> {
//!     // Errors are automatically propagated with ?
//!     let config = RunConfig::builder().cv_folds(5).build()?;
//!     Ok(config)
//! }
//! ```

use serde::Serialize;
use serde::ser::SerializeStruct;
use tabml_processing::ProcessingError;
use thiserror::Error;

/// The main error type for tabml-learning operations.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LearningError {
    /// Invalid configuration provided to the run.
    ///
    /// Check the error message for details on which configuration value is
    /// invalid and what values are accepted.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The feature-reduction method named in the specification is not known.
    #[error(
        "Unknown feature reduction method '{0}'. \
         Valid values are: no reduction, corr with target, tree-based, pca"
    )]
    UnknownReductionMethod(String),

    /// The specified target column was not found in the dataset.
    ///
    /// Column names are case-sensitive.
    #[error("Target column '{0}' not found")]
    TargetNotFound(String),

    /// Invalid data provided for training or prediction.
    ///
    /// Common causes:
    /// - A feature column still contains nulls after imputation
    /// - A feature column is not numeric
    /// - Too few rows for the requested operation
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A reduction strategy retained no columns.
    #[error("Feature reduction '{method}' retained no columns: {reason}")]
    DegenerateReduction {
        /// Reduction method name.
        method: String,
        /// Why nothing was retained.
        reason: String,
    },

    /// A hyperparameter was rejected by the pipeline or the model.
    #[error("Invalid hyperparameter '{param}' for {model}: {reason}")]
    InvalidHyperparameter {
        /// Model (or stage) that rejected the value.
        model: String,
        /// Parameter key as supplied.
        param: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Training a model failed.
    #[error("Training {model} failed: {reason}")]
    TrainingFailed {
        /// Model name.
        model: String,
        /// Failure description.
        reason: String,
    },

    /// Error raised while loading, separating or imputing the dataset.
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    /// The specification document is not valid JSON or has the wrong shape.
    #[error("Malformed specification: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected internal failure, such as a thread pool that could not be built.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LearningError {
    /// Get a stable error code for programmatic handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::UnknownReductionMethod(_) => "UNKNOWN_REDUCTION_METHOD",
            Self::TargetNotFound(_) => "TARGET_NOT_FOUND",
            Self::InvalidData(_) => "INVALID_DATA",
            Self::DegenerateReduction { .. } => "DEGENERATE_REDUCTION",
            Self::InvalidHyperparameter { .. } => "INVALID_HYPERPARAMETER",
            Self::TrainingFailed { .. } => "TRAINING_FAILED",
            Self::Processing(e) => e.error_code(),
            Self::Json(_) => "MALFORMED_SPEC",
            Self::Io(_) => "IO_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error must stop the run before any model is trained.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Self::InvalidConfig(_)
            | Self::UnknownReductionMethod(_)
            | Self::TargetNotFound(_)
            | Self::DegenerateReduction { .. }
            | Self::Json(_) => true,
            Self::Processing(e) => e.is_configuration_error(),
            _ => false,
        }
    }

    /// Shorthand for a hyperparameter rejection.
    pub(crate) fn hyperparameter(
        model: impl Into<String>,
        param: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidHyperparameter {
            model: model.into(),
            param: param.into(),
            reason: reason.into(),
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for LearningError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("LearningError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for learning operations.
pub type Result<T> = std::result::Result<T, LearningError>;
