//! Custom error types for dataset handling and imputation.
//!
//! This module provides the error hierarchy used by the processing crate,
//! built on `thiserror`. Every variant maps to a stable error code so callers
//! (the CLI, or a JSON consumer of its report) can branch on the failure kind
//! without parsing messages.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the processing crate.
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No valid values found in a column for computation.
    #[error("No valid values found in column '{0}'")]
    NoValidValues(String),

    /// The target column contains missing values.
    #[error("Target column '{column}' has {count} missing values")]
    MissingTargetValues { column: String, count: usize },

    /// Imputation failed.
    #[error("Failed to impute missing values in column '{column}': {reason}")]
    ImputationFailed { column: String, reason: String },

    /// Type conversion failed.
    #[error("Failed to convert column '{column}' to {target_type}: {reason}")]
    TypeConversionFailed {
        column: String,
        target_type: String,
        reason: String,
    },

    /// The dataset file has an extension we cannot read.
    #[error("Unsupported dataset format: '{0}' (expected .csv or .parquet)")]
    UnsupportedFormat(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ProcessingError>,
    },
}

impl ProcessingError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ProcessingError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get a stable error code for programmatic handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::NoValidValues(_) => "NO_VALID_VALUES",
            Self::MissingTargetValues { .. } => "MISSING_TARGET_VALUES",
            Self::ImputationFailed { .. } => "IMPUTATION_FAILED",
            Self::TypeConversionFailed { .. } => "TYPE_CONVERSION_FAILED",
            Self::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Whether the error stems from the declarative specification or dataset
    /// shape rather than from a computation.
    ///
    /// Configuration errors stop a run before any model is trained.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Self::ColumnNotFound(_)
            | Self::InvalidConfig(_)
            | Self::MissingTargetValues { .. }
            | Self::TypeConversionFailed { .. }
            | Self::UnsupportedFormat(_) => true,
            Self::WithContext { source, .. } => source.is_configuration_error(),
            _ => false,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for ProcessingError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("ProcessingError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for processing operations.
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ProcessingError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(
            ProcessingError::ColumnNotFound("age".to_string()).error_code(),
            "COLUMN_NOT_FOUND"
        );
        assert_eq!(
            ProcessingError::UnsupportedFormat("xlsx".to_string()).error_code(),
            "UNSUPPORTED_FORMAT"
        );
    }

    #[test]
    fn test_is_configuration_error() {
        assert!(ProcessingError::ColumnNotFound("a".to_string()).is_configuration_error());
        assert!(
            ProcessingError::MissingTargetValues {
                column: "y".to_string(),
                count: 2
            }
            .is_configuration_error()
        );
        assert!(!ProcessingError::NoValidValues("a".to_string()).is_configuration_error());
    }

    #[test]
    fn test_error_serialization() {
        let error = ProcessingError::ColumnNotFound("Age".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("COLUMN_NOT_FOUND"));
        assert!(json.contains("Age"));
    }

    #[test]
    fn test_with_context() {
        let error =
            ProcessingError::ColumnNotFound("test".to_string()).with_context("While splitting");
        assert!(error.to_string().contains("While splitting"));
        assert_eq!(error.error_code(), "COLUMN_NOT_FOUND");
        assert!(error.is_configuration_error());
    }
}
