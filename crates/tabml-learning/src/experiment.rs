//! Experiment driver: split once, then search, refit and evaluate every
//! selected model.
//!
//! # Run outline
//!
//! 1. Validate the specification against the dataset's columns.
//! 2. Separate the target, split rows into training and test partitions
//!    (shared by all models) and build the imputer and reduction recipes.
//! 3. Preflight: fit the imputer and, for the correlation filter and the
//!    projection, the reduction on the training partition. Failures here are
//!    fatal configuration errors and stop the run before any model trains.
//! 4. For each selected model, in declared order: resolve it in the
//!    [`ModelRegistry`], compose a [`Pipeline`], run the [`GridSearch`],
//!    refit the winner on the training partition and score it on the test
//!    partition.
//!
//! Step 4 never aborts the run. An unregistered model is recorded as
//! [`ModelOutcome::Skipped`]; any other failure as [`ModelOutcome::Failed`].
//!
//! # Example
//!
//! ```no_run
//! use tabml_learning::{Experiment, PipelineSpec, RunConfig};
//!
//! let spec = PipelineSpec::from_path("spec.json")?;
//! let df = tabml_processing::load_dataset("data.csv")?;
//!
//! let experiment = Experiment::builder()
//!     .config(RunConfig::builder().random_seed(7).build()?)
//!     .build();
//! let report = experiment.run(&spec, &df)?;
//!
//! for model in &report.models {
//!     println!("{}: {:?}", model.name, model.outcome);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::config::{ProblemType, RunConfig};
use crate::error::Result;
use crate::matrix::FeatureMatrix;
use crate::metrics::Metrics;
use crate::pipeline::{Pipeline, qualify_model_grid};
use crate::progress::{ProgressCallback, ProgressUpdate, TrainingStage};
use crate::reduction::{FeatureReducer, FeatureReduction, ReductionContext};
use crate::registry::ModelRegistry;
use crate::search::{GridSearch, ParamSet};
use crate::spec::{ModelSpec, PipelineSpec};
use chrono::{DateTime, Utc};
use ndarray::Array1;
use polars::prelude::DataFrame;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tabml_processing::{FeatureImputer, separate_target, take_rows, train_test_split};
use tracing::{error, info, warn};

/// What happened to one selected model.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelOutcome {
    Trained {
        /// Winning combination, without stage prefixes.
        best_params: ParamSet,
        /// Mean cross-validation score of the winner (R² or accuracy).
        cv_score: f64,
        /// Columns that entered the model after reduction.
        features: Vec<String>,
        metrics: Metrics,
    },
    /// Not registered for the task kind.
    Skipped { reason: String },
    Failed { code: String, message: String },
}

/// Result for one selected model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelReport {
    /// Name as written in the specification.
    pub name: String,
    #[serde(flatten)]
    pub outcome: ModelOutcome,
}

impl ModelReport {
    pub fn metrics(&self) -> Option<&Metrics> {
        match &self.outcome {
            ModelOutcome::Trained { metrics, .. } => Some(metrics),
            _ => None,
        }
    }

    pub fn is_trained(&self) -> bool {
        matches!(self.outcome, ModelOutcome::Trained { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, ModelOutcome::Skipped { .. })
    }
}

/// Result of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub target: String,
    pub problem_type: ProblemType,
    pub reduction: String,
    /// Class names by encoded index, for classification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<String>>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub config: RunConfig,
    /// One entry per selected model, in declared order.
    pub models: Vec<ModelReport>,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl RunReport {
    pub fn trained(&self) -> impl Iterator<Item = &ModelReport> {
        self.models.iter().filter(|m| m.is_trained())
    }
}

/// Runs specifications against datasets.
///
/// Use [`Experiment::builder()`] to construct one.
#[derive(Clone, Default)]
pub struct Experiment {
    config: RunConfig,
    progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Experiment")
            .field("config", &self.config)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

/// Builder for [`Experiment`].
#[derive(Default)]
pub struct ExperimentBuilder {
    config: Option<RunConfig>,
    progress_callback: Option<ProgressCallback>,
}

impl ExperimentBuilder {
    /// Run settings; [`RunConfig::default()`] if never called.
    #[must_use]
    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Register a progress callback.
    #[must_use]
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn build(self) -> Experiment {
        Experiment {
            config: self.config.unwrap_or_default(),
            progress_callback: self.progress_callback,
        }
    }
}

/// Partitions and recipes shared by every model of a run.
struct Prepared {
    train_frame: DataFrame,
    train_labels: Array1<f64>,
    test_frame: DataFrame,
    test_labels: Array1<f64>,
    imputer: FeatureImputer,
    reduction: FeatureReduction,
    classes: Option<Vec<String>>,
}

impl Experiment {
    #[must_use]
    pub fn builder() -> ExperimentBuilder {
        ExperimentBuilder::default()
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run `spec` against `df`.
    ///
    /// # Errors
    ///
    /// Only configuration and data errors found before model training are
    /// returned; per-model failures are recorded in the report.
    pub fn run(&self, spec: &PipelineSpec, df: &DataFrame) -> Result<RunReport> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let prepared = match self.prepare(spec, df) {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(code = e.error_code(), error = %e, "Run stopped before training");
                self.report(ProgressUpdate::new(TrainingStage::Failed, 1.0, e.to_string()));
                return Err(e);
            }
        };

        let selected: Vec<&ModelSpec> = spec.selected_models().collect();
        if selected.is_empty() {
            warn!("No models are selected; nothing to train");
        }

        let total = selected.len();
        let mut models = Vec::with_capacity(total);
        for (i, model) in selected.into_iter().enumerate() {
            let report = self.run_model(spec.prediction_type, model, &prepared, i, total);
            models.push(report);
        }

        let mut done = ProgressUpdate::new(TrainingStage::Complete, 1.0, "Run complete");
        done.models_completed = Some((total as u32, total as u32));
        self.report(done);
        let report = RunReport {
            target: spec.target.clone(),
            problem_type: spec.prediction_type,
            reduction: prepared.reduction.name().to_string(),
            classes: prepared.classes,
            train_rows: prepared.train_frame.height(),
            test_rows: prepared.test_frame.height(),
            config: self.config.clone(),
            models,
            started_at,
            duration_seconds: clock.elapsed().as_secs_f64(),
        };
        info!(
            trained = report.trained().count(),
            selected = report.models.len(),
            seconds = report.duration_seconds,
            "Run finished"
        );
        Ok(report)
    }

    fn prepare(&self, spec: &PipelineSpec, df: &DataFrame) -> Result<Prepared> {
        self.report(ProgressUpdate::new(
            TrainingStage::Initializing,
            0.0,
            "Validating specification",
        ));
        spec.validate()?;
        spec.validate_columns(df)?;

        self.report(ProgressUpdate::new(
            TrainingStage::Preprocessing,
            0.05,
            "Splitting dataset",
        ));
        let labeled = separate_target(
            df,
            &spec.target,
            &spec.feature_names(),
            spec.prediction_type.target_kind(),
        )?;
        let split = train_test_split(
            labeled.features.height(),
            self.config.test_size,
            self.config.random_seed,
        )?;
        let take_labels = |indices: &[usize]| -> Array1<f64> {
            indices.iter().map(|&i| labeled.labels[i]).collect()
        };

        let prepared = Prepared {
            train_frame: take_rows(&labeled.features, &split.train_indices)?,
            train_labels: take_labels(&split.train_indices),
            test_frame: take_rows(&labeled.features, &split.test_indices)?,
            test_labels: take_labels(&split.test_indices),
            imputer: FeatureImputer::new(spec.features.clone()),
            reduction: FeatureReduction::from_spec(
                &spec.feature_reduction,
                ReductionContext {
                    problem_type: spec.prediction_type,
                    seed: self.config.random_seed,
                },
            )?,
            classes: labeled.encoder.as_ref().map(|e| e.classes().to_vec()),
        };
        info!(
            train_rows = prepared.train_frame.height(),
            test_rows = prepared.test_frame.height(),
            features = spec.features.len(),
            reduction = prepared.reduction.name(),
            "Dataset prepared"
        );

        self.preflight(&prepared)?;
        Ok(prepared)
    }

    /// Fit the shared stages once on the training partition.
    fn preflight(&self, prepared: &Prepared) -> Result<()> {
        let imputed = prepared
            .imputer
            .fit(&prepared.train_frame)?
            .transform(&prepared.train_frame)?;
        let x = FeatureMatrix::from_frame(&imputed)?;

        // Forest ranking is too costly to run twice and cannot fail on valid input
        if matches!(prepared.reduction, FeatureReduction::TreeImportance(_)) {
            return Ok(());
        }
        prepared
            .reduction
            .clone()
            .fit(&x, Some(&prepared.train_labels))
    }

    fn run_model(
        &self,
        problem_type: ProblemType,
        model: &ModelSpec,
        prepared: &Prepared,
        index: usize,
        total: usize,
    ) -> ModelReport {
        let name = model.name.clone();
        let Some(factory) = ModelRegistry::resolve(problem_type, &name) else {
            let registered = ModelRegistry::names(problem_type).join(", ");
            warn!(
                model = %name,
                problem_type = %problem_type,
                registered = %registered,
                "Model is not registered for this task; skipping"
            );
            return ModelReport {
                name: name.clone(),
                outcome: ModelOutcome::Skipped {
                    reason: format!(
                        "'{name}' is not a registered {problem_type} model \
                         (registered: {registered})"
                    ),
                },
            };
        };

        let pipeline = Pipeline::new(
            prepared.imputer.clone(),
            prepared.reduction.clone(),
            name.clone(),
            factory,
        );
        let result =
            self.train_and_evaluate(problem_type, &pipeline, model, prepared, index, total);
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(model = %name, code = e.error_code(), error = %e, "Model failed");
                ModelOutcome::Failed {
                    code: e.error_code().to_string(),
                    message: e.to_string(),
                }
            }
        };
        ModelReport { name, outcome }
    }

    fn train_and_evaluate(
        &self,
        problem_type: ProblemType,
        pipeline: &Pipeline,
        model: &ModelSpec,
        prepared: &Prepared,
        index: usize,
        total: usize,
    ) -> Result<ModelOutcome> {
        let name = pipeline.model_name();
        let step = 0.9 / total.max(1) as f64;
        let base = 0.1 + step * index as f64;

        self.report(
            ProgressUpdate::new(TrainingStage::Searching, base, format!("Searching {name}"))
                .for_model(name, index, total),
        );
        let search = GridSearch::new(
            problem_type,
            self.config.cv_folds,
            self.config.random_seed,
            self.config.n_jobs,
        );
        let grid = qualify_model_grid(&model.hyper_params);
        let outcome = search.run(pipeline, &grid, &prepared.train_frame, &prepared.train_labels)?;

        self.report(
            ProgressUpdate::new(
                TrainingStage::Refitting,
                base + 0.7 * step,
                format!("Refitting {name}"),
            )
            .for_model(name, index, total),
        );
        let fitted = pipeline
            .with_params(&outcome.best_params)?
            .fit(&prepared.train_frame, &prepared.train_labels)?;

        self.report(
            ProgressUpdate::new(
                TrainingStage::Evaluation,
                base + 0.9 * step,
                format!("Evaluating {name}"),
            )
            .for_model(name, index, total),
        );
        let predicted = fitted.predict(&prepared.test_frame)?;
        let metrics = Metrics::compute(
            problem_type,
            &prepared.test_labels.to_vec(),
            &predicted.to_vec(),
        );
        info!(model = %name, metrics = ?metrics, "Model evaluated");

        Ok(ModelOutcome::Trained {
            best_params: fitted.params().clone(),
            cv_score: outcome.best_score,
            features: fitted.feature_names().to_vec(),
            metrics,
        })
    }

    fn report(&self, update: ProgressUpdate) {
        if let Some(callback) = &self.progress_callback {
            callback(update);
        }
    }
}

static_assertions::assert_impl_all!(Experiment: Send, Sync);
static_assertions::assert_impl_all!(ExperimentBuilder: Send);
static_assertions::assert_impl_all!(RunReport: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{ReductionMethod, ReductionSpec};
    use polars::prelude::*;
    use serde_json::json;
    use std::sync::Mutex;
    use tabml_processing::{FeatureSpec, ImputationMethod};

    fn regression_frame() -> DataFrame {
        let x: Vec<f64> = (0..40).map(f64::from).collect();
        let noise: Vec<Option<f64>> = (0..40)
            .map(|i| if i % 9 == 4 { None } else { Some(((i * 7) % 5) as f64) })
            .collect();
        let y: Vec<f64> = (0..40).map(|i| 3.0 * f64::from(i) + 2.0).collect();
        df! { "x" => x, "noise" => noise, "y" => y }.unwrap()
    }

    fn regression_spec(models: Vec<ModelSpec>) -> PipelineSpec {
        PipelineSpec {
            target: "y".to_string(),
            prediction_type: ProblemType::Regression,
            features: vec![
                FeatureSpec::new("x", ImputationMethod::Median),
                FeatureSpec::new("noise", ImputationMethod::Mean),
            ],
            feature_reduction: ReductionSpec::default(),
            models,
        }
    }

    #[test]
    fn test_linear_regression_end_to_end() {
        let spec = regression_spec(vec![ModelSpec::selected("linear_regression")]);
        let report = Experiment::builder().build().run(&spec, &regression_frame()).unwrap();

        assert_eq!(report.train_rows, 32);
        assert_eq!(report.test_rows, 8);
        assert_eq!(report.models.len(), 1);
        let Some(Metrics::Regression { mse, r2 }) = report.models[0].metrics().copied() else {
            panic!("expected regression metrics, got {:?}", report.models[0].outcome);
        };
        assert!(mse.is_finite());
        assert!(r2 > 0.999, "r2 = {r2}");
    }

    #[test]
    fn test_unregistered_model_is_skipped() {
        let spec = regression_spec(vec![
            ModelSpec::selected("gradient_boosting"),
            ModelSpec::selected("logistic_regression"),
            ModelSpec::selected("ridge").with_param("alpha", vec![json!(0.1), json!(1.0)]),
            ModelSpec {
                is_selected: false,
                ..ModelSpec::selected("knn")
            },
        ]);
        let report = Experiment::builder().build().run(&spec, &regression_frame()).unwrap();

        let names: Vec<&str> = report.models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["gradient_boosting", "logistic_regression", "ridge"]);
        assert!(report.models[0].is_skipped());
        assert!(report.models[1].is_skipped());
        assert!(report.models[2].is_trained());
    }

    #[test]
    fn test_invalid_hyperparameter_fails_one_model() {
        let spec = regression_spec(vec![
            ModelSpec::selected("ridge").with_param("depth", vec![json!(2)]),
            ModelSpec::selected("linear_regression"),
        ]);
        let report = Experiment::builder().build().run(&spec, &regression_frame()).unwrap();

        let ModelOutcome::Failed { code, .. } = &report.models[0].outcome else {
            panic!("expected failure");
        };
        assert_eq!(code, "INVALID_HYPERPARAMETER");
        assert!(report.models[1].is_trained());
    }

    #[test]
    fn test_degenerate_correlation_stops_run() {
        let mut spec = regression_spec(vec![ModelSpec::selected("linear_regression")]);
        spec.features = vec![FeatureSpec::new("noise", ImputationMethod::Mean)];
        spec.feature_reduction = ReductionSpec {
            threshold: Some(0.99),
            ..ReductionSpec::with_method(ReductionMethod::CorrelationWithTarget)
        };

        let err = Experiment::builder().build().run(&spec, &regression_frame()).unwrap_err();
        assert_eq!(err.error_code(), "DEGENERATE_REDUCTION");
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_missing_column_is_configuration_error() {
        let mut spec = regression_spec(vec![]);
        spec.features.push(FeatureSpec::new("absent", ImputationMethod::None));
        let err = Experiment::builder().build().run(&spec, &regression_frame()).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_progress_reaches_completion() {
        let updates: Arc<Mutex<Vec<ProgressUpdate>>> = Arc::default();
        let sink = Arc::clone(&updates);
        let experiment = Experiment::builder()
            .on_progress(move |u| sink.lock().unwrap().push(u))
            .build();
        let spec = regression_spec(vec![ModelSpec::selected("ridge")]);
        experiment.run(&spec, &regression_frame()).unwrap();

        let updates = updates.lock().unwrap();
        let stages: Vec<TrainingStage> = updates.iter().map(|u| u.stage).collect();
        assert_eq!(
            stages,
            vec![
                TrainingStage::Initializing,
                TrainingStage::Preprocessing,
                TrainingStage::Searching,
                TrainingStage::Refitting,
                TrainingStage::Evaluation,
                TrainingStage::Complete,
            ]
        );
        assert!(updates.windows(2).all(|w| w[0].progress <= w[1].progress));
    }

    #[test]
    fn test_report_serializes() {
        let spec = regression_spec(vec![ModelSpec::selected("knn"), ModelSpec::selected("svm")]);
        let report = Experiment::builder().build().run(&spec, &regression_frame()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["problem_type"], "regression");
        assert_eq!(json["models"][0]["status"], "trained");
        assert_eq!(json["models"][0]["metrics"]["kind"], "regression");
        assert_eq!(json["models"][1]["status"], "skipped");
    }
}
