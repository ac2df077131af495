//! The declarative pipeline specification document.
//!
//! A specification names the target column and task kind, lists feature
//! columns with their imputation rules, picks one feature-reduction strategy,
//! and lists candidate models with hyperparameter grids:
//!
//! ```json
//! {
//!   "target": "price",
//!   "prediction_type": "Regression",
//!   "features": [
//!     {"column_name": "sqft", "imputation": "median"},
//!     {"column_name": "age", "imputation": "constant", "fill_value": 0}
//!   ],
//!   "feature_reduction": {"method": "corr with target", "threshold": 0.2},
//!   "models": [
//!     {"name": "random_forest", "is_selected": true,
//!      "hyper_params": {"n_estimators": [10, 50]}}
//!   ]
//! }
//! ```

use crate::config::ProblemType;
use crate::error::{LearningError, Result};
use polars::prelude::DataFrame;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tabml_processing::{FeatureSpec, ProcessingError, normalize_token};

/// Default absolute-correlation threshold of the correlation filter.
pub const DEFAULT_CORRELATION_THRESHOLD: f64 = 0.1;

/// Default number of columns kept by the tree-importance filter.
pub const DEFAULT_N_FEATURES: usize = 5;

/// Default number of principal components.
pub const DEFAULT_N_COMPONENTS: usize = 5;

/// A hyperparameter grid: parameter name to candidate values.
///
/// Keys are kept sorted so the Cartesian product has a stable order.
pub type HyperParamGrid = BTreeMap<String, Vec<Value>>;

/// The full declarative specification of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Name of the label column.
    pub target: String,

    /// Task kind, case-insensitive in the document.
    pub prediction_type: ProblemType,

    /// Declared feature columns, in order.
    pub features: Vec<FeatureSpec>,

    /// Reduction strategy; no reduction when omitted.
    #[serde(default)]
    pub feature_reduction: ReductionSpec,

    /// Candidate models.
    #[serde(default)]
    pub models: Vec<ModelSpec>,
}

impl PipelineSpec {
    /// Parse a specification from JSON text and check its internal consistency.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let spec: PipelineSpec = serde_json::from_str(text)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Read and parse a specification file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Check invariants that do not depend on the dataset.
    ///
    /// # Errors
    ///
    /// - [`LearningError::InvalidConfig`] for an empty target, no features,
    ///   duplicate features, a target listed as a feature, or invalid
    ///   reduction parameters
    /// - [`LearningError::UnknownReductionMethod`] for an unrecognized method
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(LearningError::InvalidConfig("target must not be empty".to_string()));
        }
        if self.features.is_empty() {
            return Err(LearningError::InvalidConfig(
                "at least one feature column must be declared".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for feature in &self.features {
            if feature.column_name == self.target {
                return Err(LearningError::InvalidConfig(format!(
                    "target column '{}' is also declared as a feature",
                    self.target
                )));
            }
            if !seen.insert(feature.column_name.as_str()) {
                return Err(LearningError::InvalidConfig(format!(
                    "feature column '{}' is declared more than once",
                    feature.column_name
                )));
            }
        }

        self.feature_reduction.resolve()?;
        Ok(())
    }

    /// Check that the target and every declared feature exist in `df`.
    pub fn validate_columns(&self, df: &DataFrame) -> Result<()> {
        if df.column(&self.target).is_err() {
            return Err(LearningError::TargetNotFound(self.target.clone()));
        }
        for feature in &self.features {
            if df.column(&feature.column_name).is_err() {
                return Err(ProcessingError::ColumnNotFound(feature.column_name.clone()).into());
            }
        }
        Ok(())
    }

    /// Declared feature names, in order.
    pub fn feature_names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.column_name.clone()).collect()
    }

    /// Models marked as selected, in declared order.
    pub fn selected_models(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.iter().filter(|m| m.is_selected)
    }
}

// =============================================================================
// Feature reduction
// =============================================================================

/// Recognized feature-reduction methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReductionMethod {
    /// Keep every column.
    NoReduction,
    /// Keep columns correlated with the target.
    CorrelationWithTarget,
    /// Keep the most important columns of a random forest.
    TreeBased,
    /// Project onto principal components.
    Pca,
}

impl ReductionMethod {
    /// Canonical name as written in specification documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReductionMethod::NoReduction => "no reduction",
            ReductionMethod::CorrelationWithTarget => "corr with target",
            ReductionMethod::TreeBased => "tree-based",
            ReductionMethod::Pca => "pca",
        }
    }
}

impl fmt::Display for ReductionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReductionMethod {
    type Err = LearningError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_token(s).as_str() {
            "no_reduction" | "none" => Ok(ReductionMethod::NoReduction),
            "corr_with_target" | "correlation" => Ok(ReductionMethod::CorrelationWithTarget),
            "tree_based" | "tree_importance" => Ok(ReductionMethod::TreeBased),
            "pca" => Ok(ReductionMethod::Pca),
            _ => Err(LearningError::UnknownReductionMethod(s.to_string())),
        }
    }
}

/// The `feature_reduction` block of a specification.
///
/// The method is kept as written so that an unrecognized name is reported
/// as such rather than as a malformed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReductionSpec {
    /// Method name, e.g. `"corr with target"`.
    pub method: String,

    /// Correlation threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,

    /// Columns kept by the tree-importance filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_features: Option<usize>,

    /// Number of principal components.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_components: Option<usize>,
}

impl Default for ReductionSpec {
    fn default() -> Self {
        Self {
            method: ReductionMethod::NoReduction.as_str().to_string(),
            threshold: None,
            n_features: None,
            n_components: None,
        }
    }
}

/// A validated reduction choice with its parameter resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReductionChoice {
    /// Identity.
    NoReduction,
    /// Correlation filter with its threshold.
    Correlation { threshold: f64 },
    /// Tree-importance filter with the number of columns to keep.
    TreeImportance { n_features: usize },
    /// PCA with the number of components.
    Pca { n_components: usize },
}

impl ReductionSpec {
    /// Spec for a given method with default parameters.
    pub fn with_method(method: ReductionMethod) -> Self {
        Self {
            method: method.as_str().to_string(),
            ..Self::default()
        }
    }

    /// Parse the method and fill in parameter defaults.
    pub fn resolve(&self) -> Result<ReductionChoice> {
        match self.method.parse::<ReductionMethod>()? {
            ReductionMethod::NoReduction => Ok(ReductionChoice::NoReduction),
            ReductionMethod::CorrelationWithTarget => {
                let threshold = self.threshold.unwrap_or(DEFAULT_CORRELATION_THRESHOLD);
                if !(threshold >= 0.0) {
                    return Err(LearningError::InvalidConfig(format!(
                        "correlation threshold must be a non-negative number, got {threshold}"
                    )));
                }
                Ok(ReductionChoice::Correlation { threshold })
            }
            ReductionMethod::TreeBased => {
                let n_features = self.n_features.unwrap_or(DEFAULT_N_FEATURES);
                if n_features == 0 {
                    return Err(LearningError::InvalidConfig(
                        "n_features must be at least 1".to_string(),
                    ));
                }
                Ok(ReductionChoice::TreeImportance { n_features })
            }
            ReductionMethod::Pca => {
                let n_components = self.n_components.unwrap_or(DEFAULT_N_COMPONENTS);
                if n_components == 0 {
                    return Err(LearningError::InvalidConfig(
                        "n_components must be at least 1".to_string(),
                    ));
                }
                Ok(ReductionChoice::Pca { n_components })
            }
        }
    }
}

// =============================================================================
// Models
// =============================================================================

/// One candidate model of a specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Registered model name, case-insensitive.
    pub name: String,

    /// Only selected models are built and evaluated.
    #[serde(default)]
    pub is_selected: bool,

    /// Candidate values per hyperparameter. A scalar is read as a single candidate.
    #[serde(default, deserialize_with = "deserialize_grid")]
    pub hyper_params: HyperParamGrid,
}

impl ModelSpec {
    /// A selected model with an empty grid.
    pub fn selected(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_selected: true,
            hyper_params: HyperParamGrid::new(),
        }
    }

    /// Add a hyperparameter with its candidate values.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.hyper_params.insert(name.into(), values);
        self
    }
}

fn deserialize_grid<'de, D>(deserializer: D) -> std::result::Result<HyperParamGrid, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, Value> = BTreeMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| match value {
            Value::Array(values) => (key, values),
            scalar => (key, vec![scalar]),
        })
        .collect())
}
