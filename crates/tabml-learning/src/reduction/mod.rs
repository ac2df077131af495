//! Feature-reduction strategies.
//!
//! Exactly one strategy is selected per run from the specification's
//! `feature_reduction` block. All strategies share the [`FeatureReducer`]
//! contract: `fit` learns state from the training matrix, `transform` applies
//! it unchanged to any later matrix with the same columns.
//!
//! # Label requirement
//!
//! `fit` takes the label vector as an explicit optional argument. The
//! correlation filter and the tree-importance filter need it and fail with
//! [`LearningError::InvalidConfig`] without it; no reduction and the linear
//! projection ignore it.

mod correlation;
mod projection;
mod tree_importance;

pub use correlation::CorrelationFilter;
pub use projection::LinearProjection;
pub use tree_importance::TreeImportanceFilter;

use crate::config::ProblemType;
use crate::error::{LearningError, Result};
use crate::matrix::FeatureMatrix;
use crate::spec::{ReductionChoice, ReductionSpec};
use ndarray::Array1;
use std::fmt;

/// Common contract of the reduction strategies.
pub trait FeatureReducer: Send + Sync + fmt::Debug {
    /// Method name as written in specifications.
    fn name(&self) -> &'static str;

    /// Whether [`fit`](Self::fit) needs the label vector.
    fn requires_labels(&self) -> bool {
        false
    }

    /// Learn the reduction from training data.
    fn fit(&mut self, x: &FeatureMatrix, y: Option<&Array1<f64>>) -> Result<()>;

    /// Apply the learned reduction.
    fn transform(&self, x: &FeatureMatrix) -> Result<FeatureMatrix>;

    /// Fit, then transform the same matrix.
    fn fit_transform(
        &mut self,
        x: &FeatureMatrix,
        y: Option<&Array1<f64>>,
    ) -> Result<FeatureMatrix> {
        self.fit(x, y)?;
        self.transform(x)
    }
}

/// Parameters shared by the strategies that need more than their own settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReductionContext {
    /// Task kind; picks the forest flavour of the tree-importance filter.
    pub problem_type: ProblemType,
    /// Seed for the forest and the power iteration.
    pub seed: u64,
}

/// Identity reduction.
#[derive(Debug, Clone, Default)]
pub struct NoReduction;

impl FeatureReducer for NoReduction {
    fn name(&self) -> &'static str {
        "no reduction"
    }

    fn fit(&mut self, _x: &FeatureMatrix, _y: Option<&Array1<f64>>) -> Result<()> {
        Ok(())
    }

    fn transform(&self, x: &FeatureMatrix) -> Result<FeatureMatrix> {
        Ok(x.clone())
    }
}

/// The selected strategy.
#[derive(Debug, Clone)]
pub enum FeatureReduction {
    /// Keep every column.
    None(NoReduction),
    /// Keep columns correlated with the labels.
    Correlation(CorrelationFilter),
    /// Keep the most important columns of a forest.
    TreeImportance(TreeImportanceFilter),
    /// Project onto principal components.
    Projection(LinearProjection),
}

impl FeatureReduction {
    /// Build an un-fit strategy from a resolved choice.
    pub fn from_choice(choice: ReductionChoice, ctx: ReductionContext) -> Self {
        match choice {
            ReductionChoice::NoReduction => FeatureReduction::None(NoReduction),
            ReductionChoice::Correlation { threshold } => {
                FeatureReduction::Correlation(CorrelationFilter::new(threshold))
            }
            ReductionChoice::TreeImportance { n_features } => FeatureReduction::TreeImportance(
                TreeImportanceFilter::new(n_features, ctx.problem_type, ctx.seed),
            ),
            ReductionChoice::Pca { n_components } => {
                FeatureReduction::Projection(LinearProjection::new(n_components, ctx.seed))
            }
        }
    }

    /// Build an un-fit strategy from the specification block.
    ///
    /// # Errors
    ///
    /// [`LearningError::UnknownReductionMethod`] naming an unrecognized method,
    /// or [`LearningError::InvalidConfig`] for invalid parameters.
    pub fn from_spec(spec: &ReductionSpec, ctx: ReductionContext) -> Result<Self> {
        Ok(Self::from_choice(spec.resolve()?, ctx))
    }

    fn inner(&self) -> &dyn FeatureReducer {
        match self {
            FeatureReduction::None(r) => r,
            FeatureReduction::Correlation(r) => r,
            FeatureReduction::TreeImportance(r) => r,
            FeatureReduction::Projection(r) => r,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn FeatureReducer {
        match self {
            FeatureReduction::None(r) => r,
            FeatureReduction::Correlation(r) => r,
            FeatureReduction::TreeImportance(r) => r,
            FeatureReduction::Projection(r) => r,
        }
    }
}

impl FeatureReducer for FeatureReduction {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn requires_labels(&self) -> bool {
        self.inner().requires_labels()
    }

    fn fit(&mut self, x: &FeatureMatrix, y: Option<&Array1<f64>>) -> Result<()> {
        self.inner_mut().fit(x, y)
    }

    fn transform(&self, x: &FeatureMatrix) -> Result<FeatureMatrix> {
        self.inner().transform(x)
    }
}

/// Labels for a strategy that cannot fit without them.
pub(crate) fn require_labels<'a>(
    method: &str,
    x: &FeatureMatrix,
    y: Option<&'a Array1<f64>>,
) -> Result<&'a Array1<f64>> {
    let y = y.ok_or_else(|| {
        LearningError::InvalidConfig(format!(
            "feature reduction '{method}' requires the label vector at fit time"
        ))
    })?;
    if y.len() != x.n_rows() {
        return Err(LearningError::InvalidData(format!(
            "feature reduction '{method}': {} rows but {} labels",
            x.n_rows(),
            y.len()
        )));
    }
    Ok(y)
}

/// Column selection learned by a filter, checked against later inputs.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Retained {
    pub(crate) input_width: usize,
    pub(crate) indices: Vec<usize>,
}

impl Retained {
    pub(crate) fn apply(&self, method: &str, x: &FeatureMatrix) -> Result<FeatureMatrix> {
        if x.n_cols() != self.input_width {
            return Err(LearningError::InvalidData(format!(
                "feature reduction '{method}' was fitted on {} columns but got {}",
                self.input_width,
                x.n_cols()
            )));
        }
        Ok(x.select_columns(&self.indices))
    }
}

pub(crate) fn not_fitted(method: &str) -> LearningError {
    LearningError::InvalidData(format!("feature reduction '{method}' has not been fitted"))
}
