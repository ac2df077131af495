//! Filter columns by their correlation with the labels.

use super::{FeatureReducer, Retained, not_fitted, require_labels};
use crate::error::{LearningError, Result};
use crate::matrix::FeatureMatrix;
use ndarray::{Array1, ArrayView1};
use tracing::debug;

/// Keeps columns whose absolute Pearson correlation with the labels is
/// strictly greater than `threshold`.
#[derive(Debug, Clone)]
pub struct CorrelationFilter {
    threshold: f64,
    retained: Option<Retained>,
    correlations: Vec<f64>,
}

impl CorrelationFilter {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            retained: None,
            correlations: Vec::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Correlation of every input column, in input order. Empty before fit.
    pub fn correlations(&self) -> &[f64] {
        &self.correlations
    }

    /// Indices of the retained columns. `None` before fit.
    pub fn retained_indices(&self) -> Option<&[usize]> {
        self.retained.as_ref().map(|r| r.indices.as_slice())
    }
}

/// Pearson correlation; 0 when either side has no variance.
pub(crate) fn pearson(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
    let n = x.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean_x = x.sum() / n;
    let mean_y = y.sum() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (&a, &b) in x.iter().zip(y.iter()) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let std_x = (var_x / n).sqrt();
    let std_y = (var_y / n).sqrt();
    if std_x <= 0.0 || std_y <= 0.0 {
        return 0.0;
    }
    (cov / n) / (std_x * std_y)
}

impl FeatureReducer for CorrelationFilter {
    fn name(&self) -> &'static str {
        "corr with target"
    }

    fn requires_labels(&self) -> bool {
        true
    }

    fn fit(&mut self, x: &FeatureMatrix, y: Option<&Array1<f64>>) -> Result<()> {
        let y = require_labels(self.name(), x, y)?;

        self.correlations = x
            .data()
            .columns()
            .into_iter()
            .map(|column| pearson(column, y.view()))
            .collect();

        let indices: Vec<usize> = self
            .correlations
            .iter()
            .enumerate()
            .filter(|(_, r)| r.abs() > self.threshold)
            .map(|(j, _)| j)
            .collect();

        if indices.is_empty() {
            return Err(LearningError::DegenerateReduction {
                method: self.name().to_string(),
                reason: format!(
                    "no feature has absolute correlation above {} with the target ({} candidates)",
                    self.threshold,
                    x.n_cols()
                ),
            });
        }

        debug!(
            kept = indices.len(),
            total = x.n_cols(),
            threshold = self.threshold,
            "Correlation filter fitted"
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
    use ndarray::{Array2, array};

    fn matrix() -> (FeatureMatrix, Array1<f64>) {
        // c0 = y, c1 = alternating noise with no linear relation, c2 constant
        let y: Array1<f64> = (0..12).map(|i| i as f64).collect();
        let data = Array2::from_shape_fn((12, 3), |(i, j)| match j {
            0 => i as f64,
            1 => [1.0, -1.0, -1.0, 1.0][i % 4],
            _ => 7.0,
        });
        let x = FeatureMatrix::new(data, vec!["c0".into(), "c1".into(), "c2".into()]).unwrap();
        (x, y)
    }

    #[test]
    fn test_pearson() {
        let x = array![1.0, 2.0, 3.0];
        assert!((pearson(x.view(), array![2.0, 4.0, 6.0].view()) - 1.0).abs() < 1e-12);
        assert!((pearson(x.view(), array![3.0, 2.0, 1.0].view()) + 1.0).abs() < 1e-12);
        assert_eq!(pearson(x.view(), array![5.0, 5.0, 5.0].view()), 0.0);
    }

    #[test]
    fn test_keeps_correlated_drops_uncorrelated() {
        let (x, y) = matrix();
        let mut filter = CorrelationFilter::new(0.1);
        let out = filter.fit_transform(&x, Some(&y)).unwrap();
        assert_eq!(out.columns(), &["c0".to_string()]);
        assert_eq!(filter.retained_indices(), Some(&[0usize][..]));
        assert_eq!(filter.correlations()[2], 0.0);
        assert!(filter.correlations()[1].abs() < 0.1);
    }

    #[test]
    fn test_negative_correlation_kept() {
        let y = array![1.0, 2.0, 3.0, 4.0];
        let x = FeatureMatrix::new(array![[4.0], [3.0], [2.0], [1.0]], vec!["neg".into()]).unwrap();
        let mut filter = CorrelationFilter::new(0.5);
        assert_eq!(filter.fit_transform(&x, Some(&y)).unwrap().n_cols(), 1);
    }

    #[test]
    fn test_threshold_is_strict() {
        let y = array![1.0, 2.0, 3.0];
        let x = FeatureMatrix::new(array![[1.0], [2.0], [3.0]], vec!["a".into()]).unwrap();
        let mut filter = CorrelationFilter::new(1.0);
        assert!(filter.fit(&x, Some(&y)).is_err());
    }

    #[test]
    fn test_nothing_retained_is_degenerate() {
        let (x, y) = matrix();
        let mut filter = CorrelationFilter::new(0.1);
        let only_noise = x.select_columns(&[1, 2]);
        let err = filter.fit(&only_noise, Some(&y)).unwrap_err();
        assert_eq!(err.error_code(), "DEGENERATE_REDUCTION");
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_transform_reuses_fitted_columns() {
        let (x, y) = matrix();
        let mut filter = CorrelationFilter::new(0.1);
        filter.fit(&x, Some(&y)).unwrap();

        let later = x.select_rows(&[0, 1, 2]);
        let out = filter.transform(&later).unwrap();
        assert_eq!(out.n_rows(), 3);
        assert_eq!(out.columns(), &["c0".to_string()]);

        let narrower = x.select_columns(&[0]);
        assert!(filter.transform(&narrower).is_err());
    }

    #[test]
    fn test_transform_before_fit() {
        let (x, _) = matrix();
        assert!(CorrelationFilter::new(0.1).transform(&x).is_err());
    }
}
