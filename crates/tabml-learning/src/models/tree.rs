//! CART decision tree for regression and classification.

use super::{
    Model, argmax, check_fit_input, check_predict_input, count_classes, param_optional_usize,
    param_seed, param_usize_min, unknown_param,
};
use crate::error::{LearningError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::SeedableRng;
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde_json::Value;

/// Decision tree node.
#[derive(Debug, Clone, PartialEq)]
enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Mean squared error (regression)
    Mse,
}

/// Running label statistics of one side of a split.
#[derive(Debug, Clone)]
struct NodeStats {
    count: usize,
    sum: f64,
    sq_sum: f64,
    class_counts: Vec<usize>,
}

impl NodeStats {
    fn new(n_classes: usize) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sq_sum: 0.0,
            class_counts: vec![0; n_classes],
        }
    }

    fn add(&mut self, y: f64) {
        self.count += 1;
        self.sum += y;
        self.sq_sum += y * y;
        if let Some(c) = self.class_counts.get_mut(y as usize) {
            *c += 1;
        }
    }

    fn remove(&mut self, y: f64) {
        self.count -= 1;
        self.sum -= y;
        self.sq_sum -= y * y;
        if let Some(c) = self.class_counts.get_mut(y as usize) {
            *c -= 1;
        }
    }

    fn impurity(&self, criterion: Criterion) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        match criterion {
            Criterion::Gini => {
                1.0 - self
                    .class_counts
                    .iter()
                    .map(|&c| (c as f64 / n).powi(2))
                    .sum::<f64>()
            }
            // Var = E[X²] - E[X]²
            Criterion::Mse => (self.sq_sum / n - (self.sum / n).powi(2)).max(0.0),
        }
    }

    fn leaf_value(&self, criterion: Criterion) -> f64 {
        match criterion {
            Criterion::Gini => {
                let counts: Vec<f64> = self.class_counts.iter().map(|&c| c as f64).collect();
                argmax(&counts) as f64
            }
            Criterion::Mse => self.sum / self.count.max(1) as f64,
        }
    }
}

/// Best split found for a node.
#[derive(Debug, Clone, Copy)]
struct Split {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

/// Decision tree model
#[derive(Debug, Clone)]
pub struct DecisionTree {
    /// Maximum depth; `None` grows until leaves are pure.
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` considers all.
    pub max_features: Option<usize>,
    /// Seed for the per-split feature subsample.
    pub random_state: Option<u64>,
    criterion: Criterion,
    root: Option<TreeNode>,
    n_features: Option<usize>,
    n_classes: usize,
    feature_importances: Option<Array1<f64>>,
}

/// Context shared by the recursive build.
struct BuildContext<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
    rng: ChaCha8Rng,
    importances: Vec<f64>,
    // Regression labels are centered before the build to keep variances exact
    offset: f64,
}

impl DecisionTree {
    fn with_criterion(criterion: Criterion) -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state: None,
            criterion,
            root: None,
            n_features: None,
            n_classes: 0,
            feature_importances: None,
        }
    }

    /// Create a new classifier tree
    pub fn classifier() -> Self {
        Self::with_criterion(Criterion::Gini)
    }

    /// Create a new regressor tree
    pub fn regressor() -> Self {
        Self::with_criterion(Criterion::Mse)
    }

    /// Impurity criterion of this tree.
    pub fn criterion(&self) -> Criterion {
        self.criterion
    }

    fn is_classifier(&self) -> bool {
        self.criterion == Criterion::Gini
    }

    fn stats_for(&self, y: &Array1<f64>, indices: &[usize]) -> NodeStats {
        let mut stats = NodeStats::new(self.n_classes);
        for &i in indices {
            stats.add(y[i]);
        }
        stats
    }

    fn build(&self, ctx: &mut BuildContext<'_>, indices: &[usize], depth: usize) -> TreeNode {
        let stats = self.stats_for(ctx.y, indices);
        let n_samples = indices.len();
        let impurity = stats.impurity(self.criterion);

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.is_some_and(|d| depth >= d)
            || impurity <= 1e-12;
        if should_stop {
            return self.leaf(ctx, &stats);
        }

        let n_features = ctx.x.ncols();
        let candidates: Vec<usize> = match self.max_features {
            Some(k) if k < n_features => {
                let mut picked = sample(&mut ctx.rng, n_features, k).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..n_features).collect(),
        };

        let Some(split) = self.find_best_split(ctx, indices, &stats, &candidates) else {
            return self.leaf(ctx, &stats);
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| ctx.x[[i, split.feature_idx]] <= split.threshold);

        ctx.importances[split.feature_idx] += n_samples as f64 * split.gain;

        let left = Box::new(self.build(ctx, &left_indices, depth + 1));
        let right = Box::new(self.build(ctx, &right_indices, depth + 1));
        TreeNode::Split {
            feature_idx: split.feature_idx,
            threshold: split.threshold,
            left,
            right,
        }
    }

    fn leaf(&self, ctx: &BuildContext<'_>, stats: &NodeStats) -> TreeNode {
        TreeNode::Leaf {
            value: stats.leaf_value(self.criterion) + ctx.offset,
        }
    }

    fn find_best_split(
        &self,
        ctx: &BuildContext<'_>,
        indices: &[usize],
        parent: &NodeStats,
        candidates: &[usize],
    ) -> Option<Split> {
        let x = ctx.x;
        let y = ctx.y;
        let n = indices.len() as f64;
        let parent_impurity = parent.impurity(self.criterion);

        // Each feature independently finds its best threshold with one sorted sweep
        let per_feature: Vec<Option<Split>> = candidates
            .par_iter()
            .map(|&feature_idx| {
                let mut order: Vec<(f64, f64)> =
                    indices.iter().map(|&i| (x[[i, feature_idx]], y[i])).collect();
                order.sort_by(|a, b| a.0.total_cmp(&b.0));

                let mut left = NodeStats::new(self.n_classes);
                let mut right = parent.clone();
                let mut best: Option<Split> = None;

                for pos in 0..order.len() - 1 {
                    let (value, label) = order[pos];
                    left.add(label);
                    right.remove(label);

                    let next = order[pos + 1].0;
                    if next <= value {
                        continue;
                    }
                    if left.count < self.min_samples_leaf || right.count < self.min_samples_leaf {
                        continue;
                    }

                    let weighted = (left.count as f64 * left.impurity(self.criterion)
                        + right.count as f64 * right.impurity(self.criterion))
                        / n;
                    let gain = parent_impurity - weighted;
                    if gain > 1e-12 && best.is_none_or(|b| gain > b.gain) {
                        let mut threshold = (value + next) / 2.0;
                        // Midpoint can round up to `next` for adjacent floats
                        if threshold >= next {
                            threshold = value;
                        }
                        best = Some(Split {
                            feature_idx,
                            threshold,
                            gain,
                        });
                    }
                }
                best
            })
            .collect();

        // Candidates are ascending; strict comparison keeps the lowest index on ties
        per_feature.into_iter().flatten().fold(None, |best, split| match best {
            Some(b) if b.gain >= split.gain => Some(b),
            _ => Some(split),
        })
    }
}

impl Model for DecisionTree {
    fn name(&self) -> &'static str {
        "decision_tree"
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        let model = self.name();
        match name {
            "max_depth" => self.max_depth = param_optional_usize(model, name, value)?,
            "min_samples_split" => self.min_samples_split = param_usize_min(model, name, value, 2)?,
            "min_samples_leaf" => self.min_samples_leaf = param_usize_min(model, name, value, 1)?,
            "max_features" => self.max_features = param_optional_usize(model, name, value)?,
            "random_state" => self.random_state = param_seed(model, name, value)?,
            _ => return Err(unknown_param(model, name)),
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(self.name(), x, y)?;
        self.n_classes = if self.is_classifier() {
            count_classes(self.name(), y)?
        } else {
            0
        };

        let offset = if self.is_classifier() {
            0.0
        } else {
            y.mean().unwrap_or(0.0)
        };
        let labels = y - offset;

        let mut ctx = BuildContext {
            x,
            y: &labels,
            rng: ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0)),
            importances: vec![0.0; x.ncols()],
            offset,
        };
        let indices: Vec<usize> = (0..x.nrows()).collect();
        let root = self.build(&mut ctx, &indices, 0);

        // Normalize feature importances
        let mut importances = ctx.importances;
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }

        self.root = Some(root);
        self.n_features = Some(x.ncols());
        self.feature_importances = Some(Array1::from_vec(importances));
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_predict_input(self.name(), self.n_features, x)?;
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| {
                LearningError::InvalidData("decision_tree has not been fitted".to_string())
            })?;
        Ok(x.rows().into_iter().map(|row| root.predict_row(row)).collect())
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.feature_importances.clone()
    }
}
