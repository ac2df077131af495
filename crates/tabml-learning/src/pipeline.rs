//! Pipeline composition: impute, reduce, then model.
//!
//! A [`Pipeline`] is an un-fitted recipe. Hyperparameters are addressed with
//! stage prefixes in the `stage__param` form:
//!
//! | prefix | stage | tunable |
//! |--------|-------|---------|
//! | `imputer__` | feature imputation | no |
//! | `reducer__` | feature reduction | no |
//! | `model__` | estimator | yes |
//!
//! Only the model stage accepts parameters; the other two are configured by
//! the specification and reject overrides.
//!
//! [`Pipeline::fit`] never mutates the recipe. Each call builds fresh stage
//! state, so one pipeline can be fitted once per cross-validation fold.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use serde_json::json;
//! use tabml_learning::{qualify_model_grid, HyperParamGrid};
//!
//! let mut grid = HyperParamGrid::new();
//! grid.insert("alpha".to_string(), vec![json!(0.1), json!(1.0)]);
//!
//! let qualified = qualify_model_grid(&grid);
//! assert!(qualified.contains_key("model__alpha"));
//! ```

use crate::error::{LearningError, Result};
use crate::matrix::FeatureMatrix;
use crate::models::Model;
use crate::reduction::{FeatureReducer, FeatureReduction};
use crate::registry::ModelFactory;
use crate::spec::HyperParamGrid;
use ndarray::Array1;
use polars::prelude::DataFrame;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tabml_processing::{FeatureImputer, FittedFeatureImputer};
use tracing::debug;

pub const IMPUTER_PREFIX: &str = "imputer__";
pub const REDUCER_PREFIX: &str = "reducer__";
pub const MODEL_PREFIX: &str = "model__";

/// Rewrite a model's grid into the `model__` namespace.
pub fn qualify_model_grid(grid: &HyperParamGrid) -> HyperParamGrid {
    grid.iter()
        .map(|(name, values)| (format!("{MODEL_PREFIX}{name}"), values.clone()))
        .collect()
}

/// Impute, reduce, then model.
#[derive(Clone)]
pub struct Pipeline {
    imputer: FeatureImputer,
    reduction: FeatureReduction,
    model_name: String,
    factory: ModelFactory,
    model_params: BTreeMap<String, Value>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("features", &self.imputer.column_names())
            .field("reduction", &self.reduction.name())
            .field("model", &self.model_name)
            .field("model_params", &self.model_params)
            .finish()
    }
}

impl Pipeline {
    pub fn new(
        imputer: FeatureImputer,
        reduction: FeatureReduction,
        model_name: impl Into<String>,
        factory: ModelFactory,
    ) -> Self {
        Self {
            imputer,
            reduction,
            model_name: model_name.into(),
            factory,
            model_params: BTreeMap::new(),
        }
    }

    /// Name the model was requested under.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Model parameters set so far, without prefix.
    pub fn model_params(&self) -> &BTreeMap<String, Value> {
        &self.model_params
    }

    /// Route prefixed parameters to their stage.
    ///
    /// Every value is checked by applying it to a fresh model, so an unknown
    /// name or a wrongly typed value fails here rather than at fit time.
    ///
    /// # Errors
    ///
    /// [`LearningError::InvalidHyperparameter`] for keys outside the `model__`
    /// namespace and for values the model rejects.
    /// Nothing is applied unless every key is accepted.
    pub fn set_params(&mut self, params: &BTreeMap<String, Value>) -> Result<()> {
        let mut probe = (self.factory)();
        let mut accepted = Vec::with_capacity(params.len());
        for (key, value) in params {
            let name = self.model_param_name(key)?;
            probe.set_param(name, value)?;
            accepted.push((name.to_string(), value.clone()));
        }
        self.model_params.extend(accepted);
        Ok(())
    }

    /// Copy of this pipeline with `params` applied.
    pub fn with_params(&self, params: &BTreeMap<String, Value>) -> Result<Self> {
        let mut pipeline = self.clone();
        pipeline.set_params(params)?;
        Ok(pipeline)
    }

    fn model_param_name<'a>(&self, key: &'a str) -> Result<&'a str> {
        if let Some(name) = key.strip_prefix(MODEL_PREFIX) {
            return Ok(name);
        }
        let reason = if key.starts_with(IMPUTER_PREFIX) {
            "the imputer stage has no tunable parameters"
        } else if key.starts_with(REDUCER_PREFIX) {
            "the reducer stage has no tunable parameters"
        } else {
            "parameter keys must start with a stage prefix such as 'model__'"
        };
        Err(LearningError::hyperparameter(&self.model_name, key, reason))
    }

    /// Fit every stage on `frame` and `labels`.
    pub fn fit(&self, frame: &DataFrame, labels: &Array1<f64>) -> Result<FittedPipeline> {
        if frame.height() != labels.len() {
            return Err(LearningError::InvalidData(format!(
                "{} feature rows but {} labels",
                frame.height(),
                labels.len()
            )));
        }

        let imputer = self.imputer.fit(frame)?;
        let x = FeatureMatrix::from_frame(&imputer.transform(frame)?)?;

        let mut reducer = self.reduction.clone();
        let x = reducer.fit_transform(&x, Some(labels))?;

        let mut model = (self.factory)();
        model.set_params(&self.model_params)?;
        model.fit(x.data(), labels)?;

        debug!(
            model = %self.model_name,
            rows = frame.height(),
            features = x.n_cols(),
            "Pipeline fitted"
        );
        Ok(FittedPipeline {
            model_name: self.model_name.clone(),
            imputer,
            reducer,
            model,
            feature_names: x.columns().to_vec(),
            params: self.model_params.clone(),
        })
    }
}

/// A pipeline with every stage fitted.
#[derive(Debug)]
pub struct FittedPipeline {
    model_name: String,
    imputer: FittedFeatureImputer,
    reducer: FeatureReduction,
    model: Box<dyn Model>,
    feature_names: Vec<String>,
    params: BTreeMap<String, Value>,
}

impl FittedPipeline {
    /// Apply the fitted imputer and reducer.
    pub fn transform_features(&self, frame: &DataFrame) -> Result<FeatureMatrix> {
        let x = FeatureMatrix::from_frame(&self.imputer.transform(frame)?)?;
        self.reducer.transform(&x)
    }

    /// Predict encoded labels for `frame`.
    pub fn predict(&self, frame: &DataFrame) -> Result<Array1<f64>> {
        let x = self.transform_features(frame)?;
        self.model.predict(x.data())
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Columns entering the model, after reduction.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Model parameters the pipeline was fitted with.
    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }
}
