//! Random forest built from bootstrapped decision trees.

use super::tree::DecisionTree;
use super::{
    Model, argmax, check_fit_input, check_predict_input, count_classes, param_optional_usize,
    param_seed, param_usize_min, unknown_param,
};
use crate::error::{LearningError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde_json::Value;

/// Strategy for max features
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        match *self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
            MaxFeatures::Fixed(n) => n.min(n_features),
            MaxFeatures::All => n_features,
        }
        .clamp(1, n_features.max(1))
    }

    fn parse(model: &str, name: &str, value: &Value) -> Result<Self> {
        let invalid = || {
            LearningError::hyperparameter(
                model,
                name,
                format!(
                    "expected \"sqrt\", \"log2\", null, an integer \
                     or a fraction in (0, 1], got {value}"
                ),
            )
        };
        match value {
            Value::Null => Ok(MaxFeatures::All),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "sqrt" | "auto" => Ok(MaxFeatures::Sqrt),
                "log2" => Ok(MaxFeatures::Log2),
                "all" => Ok(MaxFeatures::All),
                _ => Err(invalid()),
            },
            Value::Number(n) => {
                if let Some(k) = n.as_u64() {
                    return if k >= 1 { Ok(MaxFeatures::Fixed(k as usize)) } else { Err(invalid()) };
                }
                match n.as_f64() {
                    Some(f) if f > 0.0 && f <= 1.0 => Ok(MaxFeatures::Fraction(f)),
                    _ => Err(invalid()),
                }
            }
            _ => Err(invalid()),
        }
    }
}

/// Random Forest model
#[derive(Debug, Clone)]
pub struct RandomForest {
    /// Number of trees (default: 100)
    pub n_estimators: usize,
    /// Maximum depth per tree
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features considered per split
    pub max_features: MaxFeatures,
    /// Base seed; tree `i` uses `seed + i`
    pub random_state: Option<u64>,
    is_classification: bool,
    trees: Vec<DecisionTree>,
    n_features: Option<usize>,
    n_classes: usize,
    feature_importances: Option<Array1<f64>>,
}

impl RandomForest {
    /// Create a new classifier forest
    pub fn classifier() -> Self {
        Self::new(true, MaxFeatures::Sqrt)
    }

    /// Create a new regressor forest
    pub fn regressor() -> Self {
        Self::new(false, MaxFeatures::All)
    }

    fn new(is_classification: bool, max_features: MaxFeatures) -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features,
            random_state: None,
            is_classification,
            trees: Vec::new(),
            n_features: None,
            n_classes: 0,
            feature_importances: None,
        }
    }

    /// Set number of trees
    #[must_use]
    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    /// Set random state
    #[must_use]
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn grow_tree(&self, x: &Array2<f64>, y: &Array1<f64>, tree_idx: usize) -> Result<DecisionTree> {
        let n_samples = x.nrows();
        let seed = self.random_state.unwrap_or(0).wrapping_add(tree_idx as u64);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        // Bootstrap sample
        let sample_indices: Vec<usize> = (0..n_samples)
            .map(|_| rng.gen_range(0..n_samples))
            .collect();
        let x_boot = x.select(Axis(0), &sample_indices);
        let y_boot: Array1<f64> = sample_indices.iter().map(|&i| y[i]).collect();

        let mut tree = if self.is_classification {
            DecisionTree::classifier()
        } else {
            DecisionTree::regressor()
        };
        tree.max_depth = self.max_depth;
        tree.min_samples_split = self.min_samples_split;
        tree.min_samples_leaf = self.min_samples_leaf;
        tree.max_features = Some(self.max_features.resolve(x.ncols()));
        tree.random_state = Some(rng.r#gen());

        tree.fit(&x_boot, &y_boot)?;
        Ok(tree)
    }

    fn compute_feature_importances(&self, n_features: usize) -> Array1<f64> {
        let mut total = Array1::<f64>::zeros(n_features);
        for tree in &self.trees {
            if let Some(imp) = tree.feature_importances() {
                total += &imp;
            }
        }

        let sum = total.sum();
        if sum > 0.0 {
            total /= sum;
        }
        total
    }
}

impl Model for RandomForest {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        let model = self.name();
        match name {
            "n_estimators" => self.n_estimators = param_usize_min(model, name, value, 1)?,
            "max_depth" => self.max_depth = param_optional_usize(model, name, value)?,
            "min_samples_split" => self.min_samples_split = param_usize_min(model, name, value, 2)?,
            "min_samples_leaf" => self.min_samples_leaf = param_usize_min(model, name, value, 1)?,
            "max_features" => self.max_features = MaxFeatures::parse(model, name, value)?,
            "random_state" => self.random_state = param_seed(model, name, value)?,
            _ => return Err(unknown_param(model, name)),
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(self.name(), x, y)?;
        self.n_classes = if self.is_classification {
            count_classes(self.name(), y)?
        } else {
            0
        };

        // Build trees in parallel; tree i depends only on (seed + i)
        let trees = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| self.grow_tree(x, y, tree_idx))
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.n_features = Some(x.ncols());
        self.feature_importances = Some(self.compute_feature_importances(x.ncols()));
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_predict_input(self.name(), self.n_features, x)?;

        let all_predictions = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<Vec<_>>>()?;

        let n_samples = x.nrows();
        let predictions: Array1<f64> = if self.is_classification {
            // Majority voting; ties go to the lowest class index
            (0..n_samples)
                .map(|i| {
                    let mut votes = vec![0.0; self.n_classes.max(1)];
                    for preds in &all_predictions {
                        if let Some(v) = votes.get_mut(preds[i] as usize) {
                            *v += 1.0;
                        }
                    }
                    argmax(&votes) as f64
                })
                .collect()
        } else {
            let n_trees = all_predictions.len() as f64;
            (0..n_samples)
                .map(|i| all_predictions.iter().map(|p| p[i]).sum::<f64>() / n_trees)
                .collect()
        };

        Ok(predictions)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.feature_importances.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use serde_json::json;

    fn linear_data(n: usize) -> (Array2<f64>, Array1<f64>) {
        // Column 0 drives the label, column 1 is a fixed pattern unrelated to it
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 { i as f64 } else { ((i * 7) % 5) as f64 }
        });
        let y = x.column(0).mapv(|v| 3.0 * v);
        (x, y)
    }

    #[test]
    fn test_regressor_is_reproducible() {
        let (x, y) = linear_data(40);
        let mut a = RandomForest::regressor().with_n_estimators(10).with_random_state(7);
        let mut b = RandomForest::regressor().with_n_estimators(10).with_random_state(7);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
        assert_eq!(a.feature_importances(), b.feature_importances());
    }

    #[test]
    fn test_importances_favor_informative_column() {
        let (x, y) = linear_data(40);
        let mut forest = RandomForest::regressor().with_n_estimators(20).with_random_state(1);
        forest.fit(&x, &y).unwrap();

        let imp = forest.feature_importances().unwrap();
        assert!((imp.sum() - 1.0).abs() < 1e-9);
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn test_classifier_majority_vote() {
        let x = Array2::from_shape_fn((30, 1), |(i, _)| i as f64);
        let y: Array1<f64> = (0..30).map(|i| if i < 15 { 0.0 } else { 1.0 }).collect();

        let mut forest = RandomForest::classifier().with_n_estimators(15).with_random_state(3);
        forest.fit(&x, &y).unwrap();
        let pred = forest.predict(&ndarray::array![[0.0], [29.0]]).unwrap();
        assert_eq!(pred, ndarray::array![0.0, 1.0]);
    }

    #[test]
    fn test_max_features_param() {
        let mut forest = RandomForest::classifier();
        forest.set_param("max_features", &json!("log2")).unwrap();
        assert_eq!(forest.max_features, MaxFeatures::Log2);
        forest.set_param("max_features", &json!(0.5)).unwrap();
        assert_eq!(forest.max_features, MaxFeatures::Fraction(0.5));
        forest.set_param("max_features", &json!(3)).unwrap();
        assert_eq!(forest.max_features, MaxFeatures::Fixed(3));
        assert!(forest.set_param("max_features", &json!("most")).is_err());
        assert!(forest.set_param("max_features", &json!(0)).is_err());
    }

    #[test]
    fn test_max_features_resolve() {
        assert_eq!(MaxFeatures::Sqrt.resolve(10), 4);
        assert_eq!(MaxFeatures::Fixed(20).resolve(10), 10);
        assert_eq!(MaxFeatures::Fraction(0.01).resolve(10), 1);
        assert_eq!(MaxFeatures::All.resolve(3), 3);
    }
}
