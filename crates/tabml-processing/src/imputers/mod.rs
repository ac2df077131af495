//! Imputation of missing feature values.
//!
//! [`StatisticalImputer`] learns and applies a single fill value for one
//! column. [`FeatureImputer`] assembles one rule per declared feature into a
//! composite transform that is fit once and reused.

mod assembler;
mod statistical;

pub use assembler::{ColumnImputer, FeatureImputer, FittedFeatureImputer};
pub use statistical::{DEFAULT_NUMERIC_FILL, DEFAULT_STRING_FILL, FillValue, StatisticalImputer};
