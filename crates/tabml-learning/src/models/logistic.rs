//! Multinomial logistic regression trained by full-batch gradient descent.
//!
//! Features are standardized internally with the training mean and standard
//! deviation so that one learning rate suits columns on any scale.

use super::{
    Model, argmax, check_fit_input, check_predict_input, count_classes, param_bool,
    param_positive_f64, param_usize_min, unknown_param,
};
use crate::error::{LearningError, Result};
use ndarray::{Array1, Array2, Axis};
use serde_json::Value;

/// Gradient norm below which training stops early.
const TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone)]
struct LogisticFit {
    mean: Array1<f64>,
    scale: Array1<f64>,
    // (n_features, n_classes)
    weights: Array2<f64>,
    bias: Array1<f64>,
}

/// Logistic regression classifier
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    /// Inverse regularization strength (default: 1.0)
    pub c: f64,
    /// Maximum gradient steps (default: 1000)
    pub max_iter: usize,
    /// Step size (default: 0.1)
    pub learning_rate: f64,
    /// Whether to fit per-class intercepts (default: true)
    pub fit_intercept: bool,
    fitted: Option<LogisticFit>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            learning_rate: 0.1,
            fit_intercept: true,
            fitted: None,
        }
    }

    /// Row-wise softmax, shifted by the row maximum for stability.
    fn softmax(scores: &mut Array2<f64>) {
        for mut row in scores.rows_mut() {
            let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row /= sum;
        }
    }

    fn scores(fit: &LogisticFit, x: &Array2<f64>) -> Array2<f64> {
        let z = (x - &fit.mean) / &fit.scale;
        z.dot(&fit.weights) + &fit.bias
    }

    /// Class probabilities, one column per class index.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        check_predict_input(self.name(), self.fitted.as_ref().map(|f| f.mean.len()), x)?;
        let fit = self.fitted.as_ref().ok_or_else(not_fitted)?;
        let mut scores = Self::scores(fit, x);
        Self::softmax(&mut scores);
        Ok(scores)
    }
}

fn not_fitted() -> LearningError {
    LearningError::InvalidData("logistic_regression has not been fitted".to_string())
}

impl Model for LogisticRegression {
    fn name(&self) -> &'static str {
        "logistic_regression"
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        let model = self.name();
        match name {
            "C" | "c" => self.c = param_positive_f64(model, name, value)?,
            "max_iter" => self.max_iter = param_usize_min(model, name, value, 1)?,
            "learning_rate" => self.learning_rate = param_positive_f64(model, name, value)?,
            "fit_intercept" => self.fit_intercept = param_bool(model, name, value)?,
            _ => return Err(unknown_param(model, name)),
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(self.name(), x, y)?;
        let n_classes = count_classes(self.name(), y)?.max(2);
        let n_samples = x.nrows() as f64;
        let n_features = x.ncols();

        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features));
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 1e-12 { s } else { 1.0 });
        let z = (x - &mean) / &scale;

        let mut one_hot = Array2::<f64>::zeros((x.nrows(), n_classes));
        for (i, &label) in y.iter().enumerate() {
            one_hot[[i, label as usize]] = 1.0;
        }

        // Trains on `z`, so standardization is the identity until the end
        let mut fit = LogisticFit {
            mean: Array1::zeros(n_features),
            scale: Array1::ones(n_features),
            weights: Array2::zeros((n_features, n_classes)),
            bias: Array1::zeros(n_classes),
        };

        // Loss: mean cross-entropy + ||W||² / (2 C n)
        let penalty = 1.0 / (self.c * n_samples);
        for _ in 0..self.max_iter {
            let mut probs = Self::scores(&fit, &z);
            Self::softmax(&mut probs);
            let errors = probs - &one_hot;

            let dw = z.t().dot(&errors) / n_samples + &fit.weights * penalty;
            let db = errors.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_classes));

            let mut grad_sq = dw.mapv(|v| v * v).sum();
            if self.fit_intercept {
                grad_sq += db.mapv(|v| v * v).sum();
            }
            if grad_sq.sqrt() < TOLERANCE {
                break;
            }

            fit.weights = &fit.weights - &(dw * self.learning_rate);
            if self.fit_intercept {
                fit.bias = &fit.bias - &(db * self.learning_rate);
            }
        }

        fit.mean = mean;
        fit.scale = scale;
        self.fitted = Some(fit);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| argmax(&row.to_vec()) as f64)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use serde_json::json;

    #[test]
    fn test_binary_separable() {
        let x = array![[1.0], [2.0], [3.0], [7.0], [8.0], [9.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_multiclass_on_unscaled_features() {
        let x = array![
            [100.0, 0.0],
            [110.0, 1.0],
            [500.0, 0.0],
            [510.0, 1.0],
            [900.0, 0.0],
            [910.0, 1.0]
        ];
        let y = array![0.0, 0.0, 1.0, 1.0, 2.0, 2.0];
        let mut model = LogisticRegression::new();
        model.set_param("C", &json!(100.0)).unwrap();
        model.set_param("max_iter", &json!(3000)).unwrap();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.predict(&x).unwrap(), y);

        let proba = model.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_params() {
        let mut model = LogisticRegression::new();
        model.set_param("C", &json!(0.5)).unwrap();
        assert_eq!(model.c, 0.5);
        assert!(model.set_param("C", &json!(0)).is_err());
        assert!(model.set_param("penalty", &json!("l1")).is_err());
    }

    #[test]
    fn test_rejects_non_index_labels() {
        let mut model = LogisticRegression::new();
        assert!(model.fit(&array![[0.0], [1.0]], &array![0.5, 1.0]).is_err());
    }
}
