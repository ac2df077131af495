//! Dataset handling and imputation for tabular learning pipelines.
//!
//! This crate covers everything that happens to a table before it becomes a
//! numeric matrix:
//!
//! - **Loading**: CSV and Parquet files into a polars [`DataFrame`](polars::prelude::DataFrame)
//! - **Target separation**: declared feature columns plus an aligned label vector,
//!   with class labels encoded by [`LabelEncoder`]
//! - **Partitioning**: seeded train/test splits and row gathering
//! - **Imputation**: a per-column rule (none, mean, median, most frequent,
//!   constant) assembled into a fit-once [`FeatureImputer`]
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tabml_processing::{FeatureImputer, FeatureSpec, ImputationMethod, load_dataset};
//!
//! let df = load_dataset("houses.csv")?;
//! let imputer = FeatureImputer::new(vec![
//!     FeatureSpec::new("rooms", ImputationMethod::Median),
//!     FeatureSpec::new("city", ImputationMethod::MostFrequent),
//! ]);
//!
//! let fitted = imputer.fit(&df)?;
//! let clean = fitted.transform(&df)?;
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod imputers;
pub mod utils;

pub use config::{FeatureSpec, ImputationMethod, ParseImputationError};
pub use dataset::{
    LabelEncoder, LabeledFrame, TargetKind, TrainTestSplit, load_dataset, separate_target,
    take_rows, train_test_split,
};
pub use error::{ProcessingError, Result as ProcessingResult, ResultExt};
pub use imputers::{
    ColumnImputer, FeatureImputer, FillValue, FittedFeatureImputer, StatisticalImputer,
};
pub use utils::{
    DtypeCategory, get_dtype_category, is_numeric_dtype, is_numeric_like, normalize_token,
};
