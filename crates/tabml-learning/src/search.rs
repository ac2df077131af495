//! Exhaustive cross-validated hyperparameter search.
//!
//! The grid is expanded into its Cartesian product with keys in lexicographic
//! order and each key's values in declared order; the first key varies
//! slowest. Every (combination, fold) pair is an independent job run on
//! rayon over read-only fold partitions.
//!
//! Scoring:
//!
//! - regression: R²
//! - classification: accuracy
//!
//! A combination's score is its mean fold score. A fold that fails scores
//! NaN, which makes the combination's mean NaN, and NaN never wins. Among
//! the rest the highest mean wins, ties going to the earliest combination.

use crate::config::ProblemType;
use crate::error::{LearningError, Result};
use crate::metrics::search_score;
use crate::pipeline::Pipeline;
use crate::spec::HyperParamGrid;
use ndarray::Array1;
use polars::prelude::DataFrame;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tabml_processing::take_rows;
use tracing::{debug, info};

/// One point of a hyperparameter grid.
pub type ParamSet = BTreeMap<String, Value>;

/// Expand a grid into every combination.
///
/// An empty grid has exactly one combination, the empty one.
///
/// # Errors
///
/// [`LearningError::InvalidHyperparameter`] if a key has no values.
pub fn expand_grid(model: &str, grid: &HyperParamGrid) -> Result<Vec<ParamSet>> {
    let mut combinations = vec![ParamSet::new()];
    for (key, values) in grid.iter().rev() {
        if values.is_empty() {
            return Err(LearningError::hyperparameter(model, key, "the grid lists no values"));
        }
        combinations = values
            .iter()
            .flat_map(|value| {
                combinations.iter().map(move |rest| {
                    let mut combo = rest.clone();
                    combo.insert(key.clone(), value.clone());
                    combo
                })
            })
            .collect();
    }
    Ok(combinations)
}

/// Shuffled k-fold partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    n_splits: usize,
    seed: u64,
}

/// Row indices of one fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

impl KFold {
    pub fn new(n_splits: usize, seed: u64) -> Self {
        Self { n_splits, seed }
    }

    /// Partition `0..n_rows` into `n_splits` folds.
    ///
    /// Rows are shuffled with the seed, then cut into contiguous folds; the
    /// first `n_rows % n_splits` folds get one extra row.
    pub fn split(&self, n_rows: usize) -> Result<Vec<Fold>> {
        if self.n_splits < 2 {
            return Err(LearningError::InvalidConfig(format!(
                "cross-validation needs at least 2 folds, got {}",
                self.n_splits
            )));
        }
        if n_rows < self.n_splits {
            return Err(LearningError::InvalidData(format!(
                "cannot make {} folds from {n_rows} training rows",
                self.n_splits
            )));
        }

        let mut order: Vec<usize> = (0..n_rows).collect();
        order.shuffle(&mut ChaCha8Rng::seed_from_u64(self.seed));

        let base = n_rows / self.n_splits;
        let extra = n_rows % self.n_splits;
        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for k in 0..self.n_splits {
            let size = base + usize::from(k < extra);
            let end = start + size;
            let mut validation = order[start..end].to_vec();
            let mut train: Vec<usize> =
                order[..start].iter().chain(&order[end..]).copied().collect();
            validation.sort_unstable();
            train.sort_unstable();
            folds.push(Fold { train, validation });
            start = end;
        }
        Ok(folds)
    }
}

/// Scores of one combination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateScore {
    pub params: ParamSet,
    pub fold_scores: Vec<f64>,
    /// NaN when any fold failed.
    pub mean_score: f64,
    /// First fold error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    /// Winning combination, keyed with stage prefixes.
    pub best_params: ParamSet,
    pub best_score: f64,
    pub best_index: usize,
    pub candidates: Vec<CandidateScore>,
}

struct FoldData {
    train_frame: DataFrame,
    train_labels: Array1<f64>,
    validation_frame: DataFrame,
    validation_labels: Array1<f64>,
}

/// Grid search over a pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSearch {
    pub problem_type: ProblemType,
    pub cv_folds: usize,
    pub seed: u64,
    /// `-1` for the global rayon pool, `n >= 1` for a dedicated pool.
    pub n_jobs: i32,
}

impl GridSearch {
    pub fn new(problem_type: ProblemType, cv_folds: usize, seed: u64, n_jobs: i32) -> Self {
        Self {
            problem_type,
            cv_folds,
            seed,
            n_jobs,
        }
    }

    /// Search `grid` (keys carrying stage prefixes) over `pipeline`.
    ///
    /// # Errors
    ///
    /// - [`LearningError::InvalidHyperparameter`] if any combination is
    ///   rejected by the pipeline; nothing is trained in that case
    /// - [`LearningError::TrainingFailed`] if every combination failed
    pub fn run(
        &self,
        pipeline: &Pipeline,
        grid: &HyperParamGrid,
        frame: &DataFrame,
        labels: &Array1<f64>,
    ) -> Result<SearchOutcome> {
        let model = pipeline.model_name().to_string();
        let combinations = expand_grid(&model, grid)?;
        let candidates = combinations
            .iter()
            .map(|params| pipeline.with_params(params))
            .collect::<Result<Vec<_>>>()?;

        let folds = self.prepare_folds(frame, labels)?;
        info!(
            model = %model,
            combinations = candidates.len(),
            folds = folds.len(),
            "Starting grid search"
        );

        let jobs: Vec<(usize, usize)> = (0..candidates.len())
            .flat_map(|c| (0..folds.len()).map(move |f| (c, f)))
            .collect();
        let evaluate = || -> Vec<std::result::Result<f64, String>> {
            jobs.par_iter()
                .map(|&(c, f)| self.score_fold(&candidates[c], &folds[f]))
                .collect()
        };
        let scores = self.in_pool(evaluate)?;

        let candidates: Vec<CandidateScore> = combinations
            .into_iter()
            .zip(scores.chunks(folds.len()))
            .map(|(params, results)| {
                let fold_scores: Vec<f64> =
                    results.iter().map(|r| r.as_ref().copied().unwrap_or(f64::NAN)).collect();
                CandidateScore {
                    mean_score: fold_scores.iter().sum::<f64>() / fold_scores.len() as f64,
                    fold_scores,
                    error: results.iter().find_map(|r| r.as_ref().err().cloned()),
                    params,
                }
            })
            .collect();

        let best_index = best_candidate(&candidates).ok_or_else(|| LearningError::TrainingFailed {
            model: model.clone(),
            reason: format!(
                "all {} hyperparameter combinations failed during cross-validation: {}",
                candidates.len(),
                candidates
                    .iter()
                    .find_map(|c| c.error.as_deref())
                    .unwrap_or("no finite score")
            ),
        })?;

        let best = &candidates[best_index];
        info!(
            model = %model,
            score = best.mean_score,
            params = ?best.params,
            "Grid search finished"
        );
        Ok(SearchOutcome {
            best_params: best.params.clone(),
            best_score: best.mean_score,
            best_index,
            candidates,
        })
    }

    fn prepare_folds(&self, frame: &DataFrame, labels: &Array1<f64>) -> Result<Vec<FoldData>> {
        KFold::new(self.cv_folds, self.seed)
            .split(frame.height())?
            .into_iter()
            .map(|fold| {
                Ok(FoldData {
                    train_frame: take_rows(frame, &fold.train)?,
                    train_labels: fold.train.iter().map(|&i| labels[i]).collect(),
                    validation_frame: take_rows(frame, &fold.validation)?,
                    validation_labels: fold.validation.iter().map(|&i| labels[i]).collect(),
                })
            })
            .collect()
    }

    fn score_fold(&self, pipeline: &Pipeline, fold: &FoldData) -> std::result::Result<f64, String> {
        let attempt = || -> Result<f64> {
            let fitted = pipeline.fit(&fold.train_frame, &fold.train_labels)?;
            let predicted = fitted.predict(&fold.validation_frame)?;
            Ok(search_score(
                self.problem_type,
                &fold.validation_labels.to_vec(),
                &predicted.to_vec(),
            ))
        };
        attempt().map_err(|e| {
            debug!(
                model = %pipeline.model_name(),
                params = ?pipeline.model_params(),
                error = %e,
                "Fold failed"
            );
            e.to_string()
        })
    }

    fn in_pool<T: Send>(&self, job: impl FnOnce() -> T + Send) -> Result<T> {
        if self.n_jobs < 1 {
            return Ok(job());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.n_jobs as usize)
            .build()
            .map_err(|e| LearningError::Internal(format!("failed to build thread pool: {e}")))?;
        Ok(pool.install(job))
    }
}

/// Highest non-NaN mean; ties go to the earliest candidate.
fn best_candidate(candidates: &[CandidateScore]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, candidate) in candidates.iter().enumerate() {
        if candidate.mean_score.is_nan() {
            continue;
        }
        match best {
            Some(b) if candidates[b].mean_score >= candidate.mean_score => {}
            _ => best = Some(i),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduction::{FeatureReduction, NoReduction};
    use crate::registry::ModelRegistry;
    use polars::prelude::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tabml_processing::{FeatureImputer, FeatureSpec, ImputationMethod};

    // =========================================================================
    // Grid expansion
    // =========================================================================

    #[test]
    fn test_empty_grid_is_one_combination() {
        assert_eq!(expand_grid("m", &HyperParamGrid::new()).unwrap(), vec![ParamSet::new()]);
    }

    #[test]
    fn test_grid_order() {
        let mut grid = HyperParamGrid::new();
        grid.insert("model__b".to_string(), vec![json!(1), json!(2)]);
        grid.insert("model__a".to_string(), vec![json!("x"), json!("y"), json!("z")]);

        let combos = expand_grid("m", &grid).unwrap();
        assert_eq!(combos.len(), 6);
        let flat: Vec<(Value, Value)> = combos
            .iter()
            .map(|c| (c["model__a"].clone(), c["model__b"].clone()))
            .collect();
        assert_eq!(
            flat,
            vec![
                (json!("x"), json!(1)),
                (json!("x"), json!(2)),
                (json!("y"), json!(1)),
                (json!("y"), json!(2)),
                (json!("z"), json!(1)),
                (json!("z"), json!(2)),
            ]
        );
    }

    #[test]
    fn test_empty_value_list_rejected() {
        let mut grid = HyperParamGrid::new();
        grid.insert("model__alpha".to_string(), vec![]);
        assert_eq!(expand_grid("ridge", &grid).unwrap_err().error_code(), "INVALID_HYPERPARAMETER");
    }

    // =========================================================================
    // K-fold
    // =========================================================================

    #[test]
    fn test_kfold_partitions_rows() {
        let folds = KFold::new(3, 42).split(10).unwrap();
        assert_eq!(folds.len(), 3);
        assert_eq!(
            folds.iter().map(|f| f.validation.len()).collect::<Vec<_>>(),
            vec![4, 3, 3]
        );

        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.validation.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());

        for fold in &folds {
            assert_eq!(fold.train.len() + fold.validation.len(), 10);
            assert!(fold.train.iter().all(|i| !fold.validation.contains(i)));
        }
    }

    #[test]
    fn test_kfold_deterministic() {
        assert_eq!(KFold::new(3, 7).split(20).unwrap(), KFold::new(3, 7).split(20).unwrap());
        assert_ne!(KFold::new(3, 7).split(20).unwrap(), KFold::new(3, 8).split(20).unwrap());
    }

    #[test]
    fn test_kfold_too_few_rows() {
        assert!(KFold::new(3, 0).split(2).is_err());
        assert!(KFold::new(1, 0).split(10).is_err());
    }

    // =========================================================================
    // Selection
    // =========================================================================

    fn candidate(score: f64) -> CandidateScore {
        CandidateScore {
            params: ParamSet::new(),
            fold_scores: vec![score],
            mean_score: score,
            error: None,
        }
    }

    #[test]
    fn test_best_candidate_ties_and_nan() {
        let scores = [candidate(f64::NAN), candidate(0.5), candidate(0.9), candidate(0.9)];
        assert_eq!(best_candidate(&scores), Some(2));
        assert_eq!(best_candidate(&[candidate(f64::NAN)]), None);
    }

    // =========================================================================
    // End to end
    // =========================================================================

    fn regression_data() -> (DataFrame, Array1<f64>) {
        let x: Vec<f64> = (0..30).map(f64::from).collect();
        let noise: Vec<f64> = (0..30).map(|i| ((i * 7) % 5) as f64).collect();
        let y: Array1<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        let df = df! { "x" => x, "noise" => noise }.unwrap();
        (df, y)
    }

    fn pipeline(problem_type: ProblemType, model: &str) -> Pipeline {
        let imputer = FeatureImputer::new(vec![
            FeatureSpec::new("x", ImputationMethod::None),
            FeatureSpec::new("noise", ImputationMethod::None),
        ]);
        let factory = ModelRegistry::resolve(problem_type, model).unwrap();
        Pipeline::new(imputer, FeatureReduction::None(NoReduction), model, factory)
    }

    #[test]
    fn test_search_picks_best_combination() {
        let (df, y) = regression_data();
        let mut grid = HyperParamGrid::new();
        grid.insert("model__alpha".to_string(), vec![json!(1000.0), json!(0.0)]);

        let search = GridSearch::new(ProblemType::Regression, 3, 42, 2);
        let outcome = search
            .run(&pipeline(ProblemType::Regression, "ridge"), &grid, &df, &y)
            .unwrap();

        assert_eq!(outcome.best_index, 1);
        assert_eq!(outcome.best_params["model__alpha"], json!(0.0));
        assert!(outcome.best_score > 0.99);
        assert_eq!(outcome.candidates.len(), 2);
        assert_eq!(outcome.candidates[0].fold_scores.len(), 3);
    }

    #[test]
    fn test_search_is_reproducible_across_pools() {
        let (df, y) = regression_data();
        let mut grid = HyperParamGrid::new();
        grid.insert("model__n_neighbors".to_string(), vec![json!(1), json!(3), json!(5)]);

        let p = pipeline(ProblemType::Regression, "knn");
        let a = GridSearch::new(ProblemType::Regression, 3, 1, -1).run(&p, &grid, &df, &y).unwrap();
        let b = GridSearch::new(ProblemType::Regression, 3, 1, 1).run(&p, &grid, &df, &y).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_failing_combination_scores_nan() {
        let (df, y) = regression_data();
        let mut grid = HyperParamGrid::new();
        // 30 rows in 3 folds leaves 20 training rows per fold
        grid.insert("model__n_neighbors".to_string(), vec![json!(25), json!(2)]);

        let outcome = GridSearch::new(ProblemType::Regression, 3, 42, -1)
            .run(&pipeline(ProblemType::Regression, "knn"), &grid, &df, &y)
            .unwrap();
        assert!(outcome.candidates[0].mean_score.is_nan());
        assert!(outcome.candidates[0].error.as_deref().unwrap().contains("n_neighbors"));
        assert!(outcome.candidates[1].error.is_none());
        assert_eq!(outcome.best_index, 1);
    }

    #[test]
    fn test_all_combinations_failing() {
        let (df, y) = regression_data();
        let mut grid = HyperParamGrid::new();
        grid.insert("model__n_neighbors".to_string(), vec![json!(25)]);

        let err = GridSearch::new(ProblemType::Regression, 3, 42, -1)
            .run(&pipeline(ProblemType::Regression, "knn"), &grid, &df, &y)
            .unwrap_err();
        assert_eq!(err.error_code(), "TRAINING_FAILED");
        assert!(err.to_string().contains("n_neighbors"));
    }

    #[test]
    fn test_invalid_hyperparameter_fails_before_training() {
        let (df, y) = regression_data();
        let mut grid = HyperParamGrid::new();
        grid.insert("model__depth".to_string(), vec![json!(3)]);

        let err = GridSearch::new(ProblemType::Regression, 3, 42, -1)
            .run(&pipeline(ProblemType::Regression, "ridge"), &grid, &df, &y)
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_HYPERPARAMETER");
    }
}
