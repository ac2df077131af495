//! tabml-learning: build, search and evaluate modeling pipelines from a
//! declarative specification.
//!
//! A [`PipelineSpec`] names a target column, a per-feature imputation rule, one
//! feature-reduction strategy and a list of candidate models with
//! hyperparameter grids. An [`Experiment`] turns it into one pipeline per
//! selected model and reports how each one did on a held-out partition.
//!
//! # Features
//!
//! - **Imputation**: per-column rules from `tabml-processing`
//! - **Feature reduction**: none, correlation filter, tree-importance filter or PCA
//! - **Model registry**: linear, ridge, logistic, tree, forest and k-NN models
//! - **Grid search**: exhaustive, cross-validated, parallel with rayon
//! - **Metrics**: MSE and R² for regression, accuracy and weighted F1 for classification
//! - **Progress reporting**: stage-by-stage callbacks
//!
//! # Quick Start
//!
//! ```no_run
//! use tabml_learning::{Experiment, PipelineSpec};
//!
//! let spec = PipelineSpec::from_json_str(r#"{
//!     "target": "price",
//!     "prediction_type": "regression",
//!     "features": [
//!         {"column_name": "sqft", "imputation": "median"},
//!         {"column_name": "rooms", "imputation": "most_frequent"}
//!     ],
//!     "feature_reduction": {"method": "no reduction"},
//!     "models": [
//!         {"name": "ridge", "is_selected": true, "hyper_params": {"alpha": [0.1, 1.0]}}
//!     ]
//! }"#)?;
//!
//! let df = tabml_processing::load_dataset("housing.csv")?;
//! let report = Experiment::builder()
//!     .on_progress(|u| println!("{:.0}% - {}", u.progress * 100.0, u.message))
//!     .build()
//!     .run(&spec, &df)?;
//!
//! for model in report.trained() {
//!     println!("{}: {:?}", model.name, model.metrics());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! PipelineSpec ──► Experiment ──► RunReport
//!                     │
//!                     │ per selected model
//!                     ▼
//!   ModelRegistry ──► Pipeline (impute ─► reduce ─► model) ──► GridSearch
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, LearningError>`](LearningError).
//! [`LearningError::is_configuration_error()`] separates problems with the
//! specification or dataset, which stop a run, from per-model failures, which
//! are recorded in the report.

mod config;
mod error;
mod experiment;
mod matrix;
pub mod metrics;
pub mod models;
mod pipeline;
mod progress;
pub mod reduction;
mod registry;
pub mod search;
mod spec;

// Re-export public API
//
// Configuration types
pub use config::{ProblemType, RunConfig, RunConfigBuilder};
// Error types
pub use error::{LearningError, Result as LearningResult};
// Specification document
pub use spec::{
    DEFAULT_CORRELATION_THRESHOLD, DEFAULT_N_COMPONENTS, DEFAULT_N_FEATURES, HyperParamGrid,
    ModelSpec, PipelineSpec, ReductionChoice, ReductionMethod, ReductionSpec,
};
// Feature matrix
pub use matrix::FeatureMatrix;
// Strategy and model seams
pub use models::Model;
pub use reduction::{FeatureReducer, FeatureReduction, ReductionContext};
pub use registry::{ModelFactory, ModelRegistry};
// Pipeline composition
pub use pipeline::{
    FittedPipeline, IMPUTER_PREFIX, MODEL_PREFIX, Pipeline, REDUCER_PREFIX, qualify_model_grid,
};
// Search and evaluation
pub use experiment::{Experiment, ExperimentBuilder, ModelOutcome, ModelReport, RunReport};
pub use metrics::Metrics;
pub use search::{GridSearch, KFold, SearchOutcome};
// Progress reporting types
pub use progress::{ProgressCallback, ProgressUpdate, TrainingStage};
