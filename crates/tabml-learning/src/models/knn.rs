//! K-Nearest Neighbors for regression and classification.
//!
//! Brute-force Euclidean search. Neighbors at equal distance are ordered by
//! training row index so predictions are deterministic.

use super::{
    Model, argmax, check_fit_input, check_predict_input, count_classes, param_usize_min,
    unknown_param,
};
use crate::error::{LearningError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde_json::Value;

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Weighting {
    /// All neighbors have equal weight
    #[default]
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

/// K-Nearest Neighbors estimator
#[derive(Debug, Clone)]
pub struct KNeighbors {
    /// Number of neighbors (default: 5)
    pub n_neighbors: usize,
    /// Weighting scheme (default: uniform)
    pub weights: Weighting,
    is_classification: bool,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
    n_classes: usize,
}

impl KNeighbors {
    /// Create a new classifier
    pub fn classifier() -> Self {
        Self::new(true)
    }

    /// Create a new regressor
    pub fn regressor() -> Self {
        Self::new(false)
    }

    fn new(is_classification: bool) -> Self {
        Self {
            n_neighbors: 5,
            weights: Weighting::Uniform,
            is_classification,
            x_train: None,
            y_train: None,
            n_classes: 0,
        }
    }

    /// The `k` nearest training rows as `(distance, row)`, closest first.
    fn neighbors(&self, x_train: &Array2<f64>, row: ArrayView1<'_, f64>) -> Vec<(f64, usize)> {
        let mut distances: Vec<(f64, usize)> = x_train
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, train_row)| {
                let d = train_row
                    .iter()
                    .zip(row.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum::<f64>()
                    .sqrt();
                (d, i)
            })
            .collect();
        distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        distances.truncate(self.n_neighbors);
        distances
    }

    /// Neighbor weights; exact matches take all the weight under distance weighting.
    fn neighbor_weights(&self, neighbors: &[(f64, usize)]) -> Vec<f64> {
        match self.weights {
            Weighting::Uniform => vec![1.0; neighbors.len()],
            Weighting::Distance => {
                if neighbors.iter().any(|(d, _)| *d == 0.0) {
                    neighbors
                        .iter()
                        .map(|(d, _)| if *d == 0.0 { 1.0 } else { 0.0 })
                        .collect()
                } else {
                    neighbors.iter().map(|(d, _)| 1.0 / d).collect()
                }
            }
        }
    }
}

impl Model for KNeighbors {
    fn name(&self) -> &'static str {
        "knn"
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        let model = self.name();
        match name {
            "n_neighbors" => self.n_neighbors = param_usize_min(model, name, value, 1)?,
            "weights" => {
                self.weights = match value.as_str().map(str::to_ascii_lowercase).as_deref() {
                    Some("uniform") => Weighting::Uniform,
                    Some("distance") => Weighting::Distance,
                    _ => {
                        return Err(LearningError::hyperparameter(
                            model,
                            name,
                            format!("expected \"uniform\" or \"distance\", got {value}"),
                        ));
                    }
                }
            }
            _ => return Err(unknown_param(model, name)),
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(self.name(), x, y)?;
        if x.nrows() < self.n_neighbors {
            return Err(LearningError::InvalidData(format!(
                "knn: n_neighbors = {} but only {} training rows",
                self.n_neighbors,
                x.nrows()
            )));
        }
        if self.is_classification {
            self.n_classes = count_classes(self.name(), y)?;
        }
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_predict_input(self.name(), self.x_train.as_ref().map(|t| t.ncols()), x)?;
        let (Some(x_train), Some(y_train)) = (&self.x_train, &self.y_train) else {
            return Err(LearningError::InvalidData("knn has not been fitted".to_string()));
        };

        let rows: Vec<ArrayView1<'_, f64>> = x.rows().into_iter().collect();
        let predictions: Vec<f64> = rows
            .par_iter()
            .map(|row| {
                let neighbors = self.neighbors(x_train, row.view());
                let weights = self.neighbor_weights(&neighbors);

                if self.is_classification {
                    let mut votes = vec![0.0; self.n_classes.max(1)];
                    for ((_, i), w) in neighbors.iter().zip(&weights) {
                        if let Some(v) = votes.get_mut(y_train[*i] as usize) {
                            *v += w;
                        }
                    }
                    argmax(&votes) as f64
                } else {
                    let total: f64 = weights.iter().sum();
                    neighbors
                        .iter()
                        .zip(&weights)
                        .map(|((_, i), w)| w * y_train[*i])
                        .sum::<f64>()
                        / total
                }
            })
            .collect();

        Ok(Array1::from_vec(predictions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use serde_json::json;

    #[test]
    fn test_regressor_uniform_average() {
        let x = array![[0.0], [1.0], [2.0], [10.0]];
        let y = array![0.0, 1.0, 2.0, 10.0];
        let mut knn = KNeighbors::regressor();
        knn.set_param("n_neighbors", &json!(2)).unwrap();
        knn.fit(&x, &y).unwrap();
        assert_eq!(knn.predict(&array![[0.4]]).unwrap(), array![0.5]);
    }

    #[test]
    fn test_distance_weighting_exact_match() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![5.0, 7.0, 9.0];
        let mut knn = KNeighbors::regressor();
        knn.set_param("n_neighbors", &json!(3)).unwrap();
        knn.set_param("weights", &json!("distance")).unwrap();
        knn.fit(&x, &y).unwrap();
        assert_eq!(knn.predict(&array![[1.0]]).unwrap(), array![7.0]);
    }

    #[test]
    fn test_classifier_vote() {
        let x = array![[0.0, 0.0], [0.1, 0.0], [5.0, 5.0], [5.1, 5.0], [5.0, 5.1]];
        let y = array![0.0, 0.0, 1.0, 1.0, 1.0];
        let mut knn = KNeighbors::classifier();
        knn.set_param("n_neighbors", &json!(3)).unwrap();
        knn.fit(&x, &y).unwrap();
        assert_eq!(knn.predict(&array![[0.0, 0.1], [4.9, 4.9]]).unwrap(), array![0.0, 1.0]);
    }

    #[test]
    fn test_too_few_rows() {
        let mut knn = KNeighbors::regressor();
        let err = knn.fit(&array![[0.0], [1.0]], &array![0.0, 1.0]).unwrap_err();
        assert!(err.to_string().contains("n_neighbors"));
    }

    #[test]
    fn test_invalid_weights() {
        let mut knn = KNeighbors::classifier();
        assert!(knn.set_param("weights", &json!("gaussian")).is_err());
        assert!(knn.set_param("n_neighbors", &json!(0)).is_err());
    }
}
