//! Lookup table from (task kind, model name) to a model constructor.
//!
//! The table is built once on first use and never changes. Names are matched
//! case-insensitively. A miss is not an error: the caller decides what to do
//! with a model it cannot build.

use crate::config::ProblemType;
use crate::models::{
    DecisionTree, KNeighbors, LinearRegression, LogisticRegression, Model, RandomForest,
    RidgeRegression,
};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap};

/// Builds a model with default hyperparameters.
pub type ModelFactory = fn() -> Box<dyn Model>;

type Table = HashMap<ProblemType, BTreeMap<&'static str, ModelFactory>>;

static REGISTRY: Lazy<Table> = Lazy::new(|| {
    let mut regression: BTreeMap<&'static str, ModelFactory> = BTreeMap::new();
    regression.insert("linear_regression", || Box::new(LinearRegression::new()));
    regression.insert("ridge", || Box::new(RidgeRegression::new()));
    regression.insert("decision_tree", || Box::new(DecisionTree::regressor()));
    regression.insert("random_forest", || Box::new(RandomForest::regressor()));
    regression.insert("knn", || Box::new(KNeighbors::regressor()));

    let mut classification: BTreeMap<&'static str, ModelFactory> = BTreeMap::new();
    classification.insert("logistic_regression", || Box::new(LogisticRegression::new()));
    classification.insert("decision_tree", || Box::new(DecisionTree::classifier()));
    classification.insert("random_forest", || Box::new(RandomForest::classifier()));
    classification.insert("knn", || Box::new(KNeighbors::classifier()));

    let mut table = Table::new();
    table.insert(ProblemType::Regression, regression);
    table.insert(ProblemType::Classification, classification);
    table
});

/// Static model registry.
pub struct ModelRegistry;

impl ModelRegistry {
    /// Constructor for `name` under `problem_type`, if one is registered.
    pub fn resolve(problem_type: ProblemType, name: &str) -> Option<ModelFactory> {
        let key = name.trim().to_ascii_lowercase();
        REGISTRY
            .get(&problem_type)
            .and_then(|models| models.get(key.as_str()))
            .copied()
    }

    /// Registered names for a task kind, sorted.
    pub fn names(problem_type: ProblemType) -> Vec<&'static str> {
        REGISTRY
            .get(&problem_type)
            .map(|models| models.keys().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_case_insensitive() {
        let factory = ModelRegistry::resolve(ProblemType::Regression, "Linear_Regression").unwrap();
        assert_eq!(factory().name(), "linear_regression");
        assert!(ModelRegistry::resolve(ProblemType::Classification, " KNN ").is_some());
    }

    #[test]
    fn test_miss_returns_none() {
        assert!(ModelRegistry::resolve(ProblemType::Regression, "gradient_boosting").is_none());
        assert!(ModelRegistry::resolve(ProblemType::Regression, "").is_none());
    }

    #[test]
    fn test_task_specific_names() {
        assert!(ModelRegistry::resolve(ProblemType::Classification, "linear_regression").is_none());
        assert!(ModelRegistry::resolve(ProblemType::Regression, "logistic_regression").is_none());
        assert!(ModelRegistry::resolve(ProblemType::Classification, "ridge").is_none());
    }

    #[test]
    fn test_names() {
        assert_eq!(
            ModelRegistry::names(ProblemType::Regression),
            vec!["decision_tree", "knn", "linear_regression", "random_forest", "ridge"]
        );
        assert_eq!(
            ModelRegistry::names(ProblemType::Classification),
            vec!["decision_tree", "knn", "logistic_regression", "random_forest"]
        );
    }

    #[test]
    fn test_factories_build_fresh_models() {
        for problem_type in [ProblemType::Regression, ProblemType::Classification] {
            for name in ModelRegistry::names(problem_type) {
                let factory = ModelRegistry::resolve(problem_type, name).unwrap();
                assert_eq!(factory().name(), name);
            }
        }
    }
}
