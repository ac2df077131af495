//! Principal component projection.
//!
//! Components are the leading eigenvectors of the training covariance
//! matrix, found one at a time by power iteration and removed from the
//! matrix by deflation before the next is sought. Each vector's sign is fixed
//! so that its largest-magnitude loading is positive, which together with the
//! seeded start vector makes the projection deterministic.

use super::{FeatureReducer, not_fitted};
use crate::error::{LearningError, Result};
use crate::matrix::FeatureMatrix;
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

const MAX_ITER: usize = 300;
const TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone)]
struct Projection {
    mean: Array1<f64>,
    // (n_components, n_features)
    components: Array2<f64>,
    explained_variance: Array1<f64>,
}

/// Projects onto the top `n_components` principal components.
#[derive(Debug, Clone)]
pub struct LinearProjection {
    n_components: usize,
    seed: u64,
    fitted: Option<Projection>,
}

impl LinearProjection {
    pub fn new(n_components: usize, seed: u64) -> Self {
        Self {
            n_components,
            seed,
            fitted: None,
        }
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Component loadings, one row per component. `None` before fit.
    pub fn components(&self) -> Option<&Array2<f64>> {
        self.fitted.as_ref().map(|p| &p.components)
    }

    /// Variance captured by each component. `None` before fit.
    pub fn explained_variance(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|p| &p.explained_variance)
    }

    fn output_names(&self) -> Vec<String> {
        (1..=self.n_components).map(|i| format!("pc{i}")).collect()
    }
}

/// Dominant eigenpair of a symmetric matrix.
fn power_iteration(matrix: &Array2<f64>, rng: &mut ChaCha8Rng) -> (Array1<f64>, f64) {
    let n = matrix.nrows();
    let mut v: Array1<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let norm = v.dot(&v).sqrt();
    if norm > 0.0 {
        v /= norm;
    } else {
        v = Array1::zeros(n);
        v[0] = 1.0;
    }

    for _ in 0..MAX_ITER {
        let w = matrix.dot(&v);
        let norm = w.dot(&w).sqrt();
        if norm < f64::MIN_POSITIVE {
            // Remaining spectrum is zero; any unit vector will do
            break;
        }
        let next = w / norm;
        let delta = (&next - &v).mapv(f64::abs).sum();
        v = next;
        if delta < TOLERANCE {
            break;
        }
    }

    let eigenvalue = v.dot(&matrix.dot(&v));
    (v, eigenvalue)
}

fn fix_sign(v: &mut Array1<f64>) {
    let pivot = v
        .iter()
        .copied()
        .fold(0.0_f64, |best, x| if x.abs() > best.abs() { x } else { best });
    if pivot < 0.0 {
        v.mapv_inplace(|x| -x);
    }
}

impl FeatureReducer for LinearProjection {
    fn name(&self) -> &'static str {
        "pca"
    }

    fn fit(&mut self, x: &FeatureMatrix, _y: Option<&Array1<f64>>) -> Result<()> {
        let (n_rows, n_cols) = (x.n_rows(), x.n_cols());
        if n_rows < 2 {
            return Err(LearningError::InvalidConfig(format!(
                "pca needs at least 2 training rows, got {n_rows}"
            )));
        }
        if self.n_components == 0 || self.n_components > n_cols {
            return Err(LearningError::InvalidConfig(format!(
                "pca n_components must be between 1 and the number of features ({n_cols}), got {}",
                self.n_components
            )));
        }

        let data = x.data();
        let mean = data
            .mean_axis(Axis(0))
            .ok_or_else(|| LearningError::InvalidData("pca: empty input".to_string()))?;
        let centered = data - &mean;
        let mut covariance = centered.t().dot(&centered) / (n_rows as f64 - 1.0);

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut components = Array2::<f64>::zeros((self.n_components, n_cols));
        let mut explained_variance = Array1::<f64>::zeros(self.n_components);

        for k in 0..self.n_components {
            let (mut v, eigenvalue) = power_iteration(&covariance, &mut rng);
            fix_sign(&mut v);

            // Deflate: A -= λ v vᵀ
            let outer = v
                .view()
                .insert_axis(Axis(1))
                .dot(&v.view().insert_axis(Axis(0)));
            covariance = covariance - outer * eigenvalue;

            components.row_mut(k).assign(&v);
            explained_variance[k] = eigenvalue.max(0.0);
        }

        debug!(
            components = self.n_components,
            inputs = n_cols,
            "Linear projection fitted"
        );
        self.fitted = Some(Projection {
            mean,
            components,
            explained_variance,
        });
        Ok(())
    }

    fn transform(&self, x: &FeatureMatrix) -> Result<FeatureMatrix> {
        let fitted = self.fitted.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        if x.n_cols() != fitted.mean.len() {
            return Err(LearningError::InvalidData(format!(
                "feature reduction 'pca' was fitted on {} columns but got {}",
                fitted.mean.len(),
                x.n_cols()
            )));
        }
        let projected = (x.data() - &fitted.mean).dot(&fitted.components.t());
        FeatureMatrix::new(projected, self.output_names())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn line_data() -> FeatureMatrix {
        // Points on y = 2x plus a small orthogonal wobble uncorrelated with x
        let data = Array2::from_shape_fn((20, 2), |(i, j)| {
            let t = i as f64 - 10.0;
            let wobble = [0.1, -0.1, -0.1, 0.1][i % 4];
            if j == 0 { t - 2.0 * wobble } else { 2.0 * t + wobble }
        });
        FeatureMatrix::new(data, vec!["x".into(), "y".into()]).unwrap()
    }

    #[test]
    fn test_first_component_follows_main_axis() {
        let x = line_data();
        let mut pca = LinearProjection::new(2, 42);
        let out = pca.fit_transform(&x, None).unwrap();

        assert_eq!(out.columns(), &["pc1".to_string(), "pc2".to_string()]);
        assert_eq!(out.n_rows(), 20);

        let first = pca.components().unwrap().row(0).to_owned();
        let expected = array![1.0, 2.0] / 5.0_f64.sqrt();
        assert!((first[0] - expected[0]).abs() < 1e-6);
        assert!((first[1] - expected[1]).abs() < 1e-6);

        let variance = pca.explained_variance().unwrap();
        assert!(variance[0] > variance[1]);
    }

    #[test]
    fn test_components_are_orthonormal() {
        let data = Array2::from_shape_fn((16, 3), |(i, j)| match j {
            0 => i as f64,
            1 => 2.0 * [1.0, -1.0, -1.0, 1.0][i % 4],
            _ => [1.0, 1.0, -1.0, -1.0][i % 4],
        });
        let x = FeatureMatrix::new(data, vec!["a".into(), "b".into(), "c".into()]).unwrap();
        let mut pca = LinearProjection::new(3, 7);
        pca.fit(&x, None).unwrap();

        let c = pca.components().unwrap();
        let gram = c.dot(&c.t());
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((gram[[i, j]] - expected).abs() < 1e-6, "gram[{i},{j}] = {}", gram[[i, j]]);
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let x = line_data();
        let mut a = LinearProjection::new(1, 5);
        let mut b = LinearProjection::new(1, 5);
        assert_eq!(a.fit_transform(&x, None).unwrap(), b.fit_transform(&x, None).unwrap());
    }

    #[test]
    fn test_too_many_components() {
        let x = line_data();
        let err = LinearProjection::new(3, 0).fit(&x, None).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_single_row() {
        let x = FeatureMatrix::new(array![[1.0, 2.0]], vec!["a".into(), "b".into()]).unwrap();
        let err = LinearProjection::new(1, 0).fit(&x, None).unwrap_err();
        assert!(err.to_string().contains("at least 2"));
    }

    #[test]
    fn test_constant_columns_project_to_zero() {
        let x = FeatureMatrix::new(
            array![[3.0, 1.0], [3.0, 1.0], [3.0, 1.0]],
            vec!["a".into(), "b".into()],
        )
        .unwrap();
        let mut pca = LinearProjection::new(1, 0);
        let out = pca.fit_transform(&x, None).unwrap();
        assert!(out.data().iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_transform_uses_training_mean() {
        let x = line_data();
        let mut pca = LinearProjection::new(1, 42);
        pca.fit(&x, None).unwrap();

        let mean_row =
            FeatureMatrix::new(array![[-0.5, -1.0]], vec!["x".into(), "y".into()]).unwrap();
        let out = pca.transform(&mean_row).unwrap();
        assert!(out.data()[[0, 0]].abs() < 1e-9);
        assert!(LinearProjection::new(1, 42).transform(&mean_row).is_err());
    }
}
