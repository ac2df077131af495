//! Evaluation metrics.
//!
//! Regression is scored by mean squared error and the coefficient of
//! determination; classification by accuracy and support-weighted F1. Labels
//! are the encoded `f64` values produced by the target separation step.

use crate::config::ProblemType;
use serde::Serialize;
use std::collections::BTreeMap;

/// Metrics computed on the held-out partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metrics {
    Regression { mse: f64, r2: f64 },
    Classification { accuracy: f64, f1_weighted: f64 },
}

impl Metrics {
    /// Compute the metrics appropriate for `problem_type`.
    pub fn compute(problem_type: ProblemType, y_true: &[f64], y_pred: &[f64]) -> Self {
        match problem_type {
            ProblemType::Classification => Metrics::Classification {
                accuracy: accuracy(y_true, y_pred),
                f1_weighted: f1_weighted(y_true, y_pred),
            },
            ProblemType::Regression => Metrics::Regression {
                mse: mean_squared_error(y_true, y_pred),
                r2: r2_score(y_true, y_pred),
            },
        }
    }

    /// `(name, value)` pairs in report order.
    pub fn entries(&self) -> Vec<(&'static str, f64)> {
        match *self {
            Metrics::Regression { mse, r2 } => vec![("mse", mse), ("r2", r2)],
            Metrics::Classification { accuracy, f1_weighted } => {
                vec![("accuracy", accuracy), ("f1_weighted", f1_weighted)]
            }
        }
    }
}

/// Score used to rank hyperparameter combinations: R² or accuracy.
pub fn search_score(problem_type: ProblemType, y_true: &[f64], y_pred: &[f64]) -> f64 {
    match problem_type {
        ProblemType::Classification => accuracy(y_true, y_pred),
        ProblemType::Regression => r2_score(y_true, y_pred),
    }
}

pub fn mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }
    y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / y_true.len() as f64
}

/// Coefficient of determination.
///
/// A constant `y_true` gives 1.0 for a perfect prediction and 0.0 otherwise.
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }
    let n = y_true.len() as f64;
    let mean = y_true.iter().sum::<f64>() / n;
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

pub fn accuracy(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Support-weighted F1 over the classes present in `y_true`.
///
/// Classes that only appear in `y_pred` carry no weight. A class with zero
/// precision and recall scores 0.
pub fn f1_weighted(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }

    // class -> (true positives, predicted count, support)
    let mut counts: BTreeMap<i64, (usize, usize, usize)> = BTreeMap::new();
    for (&t, &p) in y_true.iter().zip(y_pred) {
        let (t, p) = (t as i64, p as i64);
        counts.entry(t).or_default().2 += 1;
        counts.entry(p).or_default().1 += 1;
        if t == p {
            counts.entry(t).or_default().0 += 1;
        }
    }

    let n = y_true.len() as f64;
    counts
        .values()
        .filter(|(_, _, support)| *support > 0)
        .map(|&(tp, predicted, support)| {
            let precision = if predicted > 0 { tp as f64 / predicted as f64 } else { 0.0 };
            let recall = tp as f64 / support as f64;
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            f1 * support as f64 / n
        })
        .sum()
}
