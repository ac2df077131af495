//! Keep the columns a random forest finds most important.

use super::{FeatureReducer, Retained, not_fitted, require_labels};
use crate::config::ProblemType;
use crate::error::{LearningError, Result};
use crate::matrix::FeatureMatrix;
use crate::models::{Model, RandomForest};
use ndarray::Array1;
use tracing::debug;

/// Number of trees in the ranking forest.
pub const RANKING_TREES: usize = 100;

#[derive(Debug, Clone)]
pub struct TreeImportanceFilter {
    n_features: usize,
    problem_type: ProblemType,
    seed: u64,
    retained: Option<Retained>,
    importances: Vec<f64>,
}

impl TreeImportanceFilter {
    pub fn new(n_features: usize, problem_type: ProblemType, seed: u64) -> Self {
        Self {
            n_features,
            problem_type,
            seed,
            retained: None,
            importances: Vec::new(),
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Importance of every input column, in input order. Empty before fit.
    pub fn importances(&self) -> &[f64] {
        &self.importances
    }

    /// Indices of the retained columns in rank order. `None` before fit.
    pub fn retained_indices(&self) -> Option<&[usize]> {
        self.retained.as_ref().map(|r| r.indices.as_slice())
    }

    fn forest(&self) -> RandomForest {
        let forest = match self.problem_type {
            ProblemType::Classification => RandomForest::classifier(),
            ProblemType::Regression => RandomForest::regressor(),
        };
        forest
            .with_n_estimators(RANKING_TREES)
            .with_random_state(self.seed)
    }
}

/// Column indices by importance, highest first; equal scores keep input order.
pub(crate) fn rank_by_importance(importances: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..importances.len()).collect();
    order.sort_by(|&a, &b| importances[b].total_cmp(&importances[a]));
    order
}

impl FeatureReducer for TreeImportanceFilter {
    fn name(&self) -> &'static str {
        "tree-based"
    }

    fn requires_labels(&self) -> bool {
        true
    }

    fn fit(&mut self, x: &FeatureMatrix, y: Option<&Array1<f64>>) -> Result<()> {
        let y = require_labels(self.name(), x, y)?;

        let mut forest = self.forest();
        forest.fit(x.data(), y)?;
        let importances = forest.feature_importances().ok_or_else(|| {
            LearningError::Internal("random forest produced no feature importances".to_string())
        })?;
        self.importances = importances.to_vec();

        let mut indices = rank_by_importance(&self.importances);
        indices.truncate(self.n_features.min(x.n_cols()));

        debug!(
            kept = indices.len(),
            total = x.n_cols(),
            "Tree-importance filter fitted"
        );
        self.retained = Some(Retained {
            input_width: x.n_cols(),
            indices,
        });
        Ok(())
    }

    fn transform(&self, x: &FeatureMatrix) -> Result<FeatureMatrix> {
        self.retained
            .as_ref()
            .ok_or_else(|| not_fitted(self.name()))?
            .apply(self.name(), x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn matrix(n: usize) -> (FeatureMatrix, Array1<f64>) {
        // y depends on c1 strongly and c3 weakly
        let data = Array2::from_shape_fn((n, 4), |(i, j)| match j {
            0 => ((i * 7) % 3) as f64,
            1 => i as f64,
            2 => ((i * 5) % 2) as f64,
            _ => (i % 4) as f64,
        });
        let y: Array1<f64> = data.rows().into_iter().map(|r| 10.0 * r[1] + r[3]).collect();
        let names = (0..4).map(|j| format!("c{j}")).collect();
        (FeatureMatrix::new(data, names).unwrap(), y)
    }

    #[test]
    fn test_rank_is_stable() {
        assert_eq!(rank_by_importance(&[0.2, 0.5, 0.2, 0.1]), vec![1, 0, 2, 3]);
        assert_eq!(rank_by_importance(&[0.0, 0.0]), vec![0, 1]);
    }

    #[test]
    fn test_keeps_top_k_in_rank_order() {
        let (x, y) = matrix(40);
        let mut filter = TreeImportanceFilter::new(2, ProblemType::Regression, 42);
        let out = filter.fit_transform(&x, Some(&y)).unwrap();

        assert_eq!(out.n_cols(), 2);
        assert_eq!(out.columns()[0], "c1");
        for name in out.columns() {
            assert!(x.columns().contains(name));
        }
        let total: f64 = filter.importances().iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_k_larger_than_columns_keeps_all() {
        let (x, y) = matrix(20);
        let mut filter = TreeImportanceFilter::new(10, ProblemType::Regression, 1);
        assert_eq!(filter.fit_transform(&x, Some(&y)).unwrap().n_cols(), 4);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let (x, y) = matrix(30);
        let mut a = TreeImportanceFilter::new(3, ProblemType::Regression, 9);
        let mut b = TreeImportanceFilter::new(3, ProblemType::Regression, 9);
        a.fit(&x, Some(&y)).unwrap();
        b.fit(&x, Some(&y)).unwrap();
        assert_eq!(a.retained_indices(), b.retained_indices());
    }

    #[test]
    fn test_classification_forest() {
        let (x, _) = matrix(30);
        let labels: Array1<f64> = (0..30).map(|i| if i < 15 { 0.0 } else { 1.0 }).collect();
        let mut filter = TreeImportanceFilter::new(1, ProblemType::Classification, 42);
        let out = filter.fit_transform(&x, Some(&labels)).unwrap();
        assert_eq!(out.columns(), &["c1".to_string()]);
    }
}
