//! Least-squares regressors solved through the normal equations.

use super::{Model, check_fit_input, check_predict_input, param_bool, param_f64, unknown_param};
use crate::error::{LearningError, Result};
use ndarray::{Array1, Array2, Axis};
use serde_json::Value;

/// Solve `A x = b` for symmetric positive-definite `A` via Cholesky.
///
/// Returns `None` if a pivot is not clearly positive.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let scale = a.diag().iter().fold(0.0f64, |m, v| m.max(v.abs())).max(1.0);
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 1e-12 * scale {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // Forward substitution: L * y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T * x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Some(x)
}

/// Fitted coefficients of a linear model.
#[derive(Debug, Clone, PartialEq)]
struct LinearFit {
    coef: Array1<f64>,
    intercept: f64,
}

/// Minimize `||y - Xw - b||² + alpha ||w||²`; the intercept is not penalized.
///
/// Rank-deficient systems fall back to a growing diagonal jitter.
fn solve_least_squares(
    model: &str,
    x: &Array2<f64>,
    y: &Array1<f64>,
    alpha: f64,
    fit_intercept: bool,
) -> Result<LinearFit> {
    let n_features = x.ncols();
    let (x_mean, y_mean) = if fit_intercept {
        let x_mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_features));
        (x_mean, y.mean().unwrap_or(0.0))
    } else {
        (Array1::zeros(n_features), 0.0)
    };

    let xc = x - &x_mean;
    let yc = y - y_mean;

    let mut gram = xc.t().dot(&xc);
    for i in 0..n_features {
        gram[[i, i]] += alpha;
    }
    let rhs = xc.t().dot(&yc);

    let scale = gram.diag().iter().fold(0.0f64, |m, v| m.max(v.abs())).max(1.0);
    let mut coef = cholesky_solve(&gram, &rhs);
    let mut jitter = 1e-10 * scale;
    while coef.is_none() && jitter < scale {
        let mut regularized = gram.clone();
        for i in 0..n_features {
            regularized[[i, i]] += jitter;
        }
        coef = cholesky_solve(&regularized, &rhs);
        jitter *= 100.0;
    }

    let coef = coef.ok_or_else(|| LearningError::TrainingFailed {
        model: model.to_string(),
        reason: "normal equations are singular".to_string(),
    })?;
    let intercept = y_mean - x_mean.dot(&coef);
    Ok(LinearFit { coef, intercept })
}

fn predict_linear(fit: &LinearFit, x: &Array2<f64>) -> Array1<f64> {
    x.dot(&fit.coef) + fit.intercept
}

/// Ordinary least squares.
#[derive(Debug, Clone)]
pub struct LinearRegression {
    /// Whether to fit an intercept (default: true).
    pub fit_intercept: bool,
    fitted: Option<LinearFit>,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    pub fn new() -> Self {
        Self {
            fit_intercept: true,
            fitted: None,
        }
    }

    /// Fitted coefficients.
    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|f| &f.coef)
    }

    /// Fitted intercept.
    pub fn intercept(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.intercept)
    }
}

impl Model for LinearRegression {
    fn name(&self) -> &'static str {
        "linear_regression"
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        match name {
            "fit_intercept" => self.fit_intercept = param_bool(self.name(), name, value)?,
            _ => return Err(unknown_param(self.name(), name)),
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(self.name(), x, y)?;
        self.fitted = Some(solve_least_squares(self.name(), x, y, 0.0, self.fit_intercept)?);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_predict_input(self.name(), self.fitted.as_ref().map(|f| f.coef.len()), x)?;
        let fit = self.fitted.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Ok(predict_linear(fit, x))
    }
}

/// L2-regularized least squares.
#[derive(Debug, Clone)]
pub struct RidgeRegression {
    /// Regularization strength (default: 1.0).
    pub alpha: f64,
    /// Whether to fit an intercept (default: true).
    pub fit_intercept: bool,
    fitted: Option<LinearFit>,
}

impl Default for RidgeRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl RidgeRegression {
    pub fn new() -> Self {
        Self {
            alpha: 1.0,
            fit_intercept: true,
            fitted: None,
        }
    }

    /// Fitted coefficients.
    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|f| &f.coef)
    }
}

impl Model for RidgeRegression {
    fn name(&self) -> &'static str {
        "ridge"
    }

    fn set_param(&mut self, name: &str, value: &Value) -> Result<()> {
        match name {
            "alpha" => {
                let alpha = param_f64(self.name(), name, value)?;
                if alpha < 0.0 {
                    return Err(LearningError::hyperparameter(
                        self.name(),
                        name,
                        format!("must be non-negative, got {alpha}"),
                    ));
                }
                self.alpha = alpha;
            }
            "fit_intercept" => self.fit_intercept = param_bool(self.name(), name, value)?,
            _ => return Err(unknown_param(self.name(), name)),
        }
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(self.name(), x, y)?;
        self.fitted = Some(solve_least_squares(
            self.name(),
            x,
            y,
            self.alpha,
            self.fit_intercept,
        )?);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_predict_input(self.name(), self.fitted.as_ref().map(|f| f.coef.len()), x)?;
        let fit = self.fitted.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Ok(predict_linear(fit, x))
    }
}

fn not_fitted(model: &str) -> LearningError {
    LearningError::InvalidData(format!("{model} has not been fitted"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use serde_json::json;

    #[test]
    fn test_cholesky_solve() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![2.0, 1.0];
        let x = cholesky_solve(&a, &b).unwrap();
        assert!((x[0] - 0.5).abs() < 1e-12);
        assert!(x[1].abs() < 1e-12);
    }

    #[test]
    fn test_linear_regression_recovers_plane() {
        // y = 3 + 2a - b
        let x = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [2.0, 3.0], [4.0, 1.0]];
        let y = x.map_axis(Axis(1), |r| 3.0 + 2.0 * r[0] - r[1]);

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();
        let coef = model.coefficients().unwrap();
        assert!((coef[0] - 2.0).abs() < 1e-9);
        assert!((coef[1] + 1.0).abs() < 1e-9);
        assert!((model.intercept().unwrap() - 3.0).abs() < 1e-9);

        let pred = model.predict(&array![[10.0, 5.0]]).unwrap();
        assert!((pred[0] - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_regression_collinear_columns() {
        let x = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0], [4.0, 8.0]];
        let y = array![1.0, 2.0, 3.0, 4.0];
        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-4);
        }
    }

    #[test]
    fn test_ridge_shrinks_coefficients() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 1.0, 2.0, 3.0];

        let mut ols = RidgeRegression::new();
        ols.set_param("alpha", &json!(0.0)).unwrap();
        ols.fit(&x, &y).unwrap();

        let mut ridge = RidgeRegression::new();
        ridge.set_param("alpha", &json!(10.0)).unwrap();
        ridge.fit(&x, &y).unwrap();

        let ols_coef = ols.coefficients().unwrap()[0];
        let ridge_coef = ridge.coefficients().unwrap()[0];
        assert!((ols_coef - 1.0).abs() < 1e-9);
        assert!(ridge_coef < ols_coef && ridge_coef > 0.0);
    }

    #[test]
    fn test_params_rejected() {
        let mut ridge = RidgeRegression::new();
        assert!(ridge.set_param("alpha", &json!(-1.0)).is_err());
        assert!(ridge.set_param("gamma", &json!(1)).is_err());
        let mut ols = LinearRegression::new();
        assert!(ols.set_param("alpha", &json!(1.0)).is_err());
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LinearRegression::new();
        assert!(model.predict(&array![[1.0]]).is_err());
    }
}
