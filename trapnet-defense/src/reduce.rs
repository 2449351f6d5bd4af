//! Dimensionality reduction of extracted activations.
//!
//! Two strategies: principal-component analysis (power iteration with
//! deflation over the covariance) and FastICA (PCA whitening followed by
//! deflationary fixed-point iteration with the tanh contrast function).
//! Both are deterministic under the configured seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use trapnet_core::error::{Result, TrapnetError};
use trapnet_core::linalg::{Matrix, dot, normalize};

use crate::config::ReduceMethod;

const EIGEN_ITERATIONS: usize = 300;
const ICA_MAX_ITERATIONS: usize = 200;
const ICA_TOLERANCE: f64 = 1e-6;

/// Project the per-sample activation matrix down to `nb_dims` columns.
/// Row order is preserved.
pub fn reduce_dimensionality(
    activations: &Matrix,
    nb_dims: usize,
    method: ReduceMethod,
    seed: u64,
) -> Result<Matrix> {
    if activations.n_rows() == 0 {
        return Err(TrapnetError::dataset(
            "no activations to reduce".to_string(),
        ));
    }
    if nb_dims == 0 || nb_dims > activations.n_cols() {
        return Err(TrapnetError::config(format!(
            "cannot reduce {} feature dimensions to {nb_dims}",
            activations.n_cols()
        )));
    }
    match method {
        ReduceMethod::Pca => Ok(pca(activations, nb_dims)),
        ReduceMethod::FastIca => Ok(fast_ica(activations, nb_dims, seed)),
    }
}

fn pca(activations: &Matrix, nb_dims: usize) -> Matrix {
    let centered = activations.mean_centered();
    let pairs = centered.covariance().top_eigenpairs(nb_dims, EIGEN_ITERATIONS);
    let basis: Vec<Vec<f64>> = pairs.into_iter().map(|(_, v)| v).collect();
    centered.project(&basis)
}

/// PCA-whiten to `nb_dims` components: project onto the leading
/// eigenvectors scaled by the inverse square root of their eigenvalues.
fn whiten(activations: &Matrix, nb_dims: usize) -> Matrix {
    let centered = activations.mean_centered();
    let pairs = centered.covariance().top_eigenpairs(nb_dims, EIGEN_ITERATIONS);
    let basis: Vec<Vec<f64>> = pairs
        .into_iter()
        .map(|(lambda, mut v)| {
            let scale = 1.0 / lambda.max(1e-12).sqrt();
            for x in &mut v {
                *x *= scale;
            }
            v
        })
        .collect();
    centered.project(&basis)
}

fn fast_ica(activations: &Matrix, nb_dims: usize, seed: u64) -> Matrix {
    let x = whiten(activations, nb_dims);
    let n = x.n_rows() as f64;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut components: Vec<Vec<f64>> = Vec::with_capacity(nb_dims);

    for _ in 0..nb_dims {
        let mut w: Vec<f64> = (0..nb_dims).map(|_| rng.gen_range(-1.0..1.0)).collect();
        normalize(&mut w);
        for _ in 0..ICA_MAX_ITERATIONS {
            // w <- E[x * g(w.x)] - E[g'(w.x)] * w, g = tanh.
            let mut next = vec![0.0; nb_dims];
            let mut gp_mean = 0.0;
            for i in 0..x.n_rows() {
                let row = x.row(i);
                let t = dot(w.as_slice(), row).tanh();
                for (nj, &xj) in next.iter_mut().zip(row.iter()) {
                    *nj += xj * t;
                }
                gp_mean += 1.0 - t * t;
            }
            gp_mean /= n;
            for (nj, &wj) in next.iter_mut().zip(w.iter()) {
                *nj = *nj / n - gp_mean * wj;
            }
            // Gram-Schmidt against already-extracted components.
            for c in &components {
                let proj = dot(&next, c);
                for (nj, &cj) in next.iter_mut().zip(c.iter()) {
                    *nj -= proj * cj;
                }
            }
            if normalize(&mut next) < 1e-12 {
                break;
            }
            let converged = dot(&next, &w).abs() > 1.0 - ICA_TOLERANCE;
            w = next;
            if converged {
                break;
            }
        }
        components.push(w);
    }
    x.project(&components)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two well-separated groups along one axis, noise on the other.
    fn separable_rows() -> Vec<Vec<f64>> {
        (0..20)
            .map(|i| {
                let group = if i < 14 { -5.0 } else { 5.0 };
                let noise = (i % 5) as f64 * 0.01;
                vec![group + noise, noise, 0.5 * group + noise]
            })
            .collect()
    }

    #[test]
    fn test_rejects_bad_dimensionality() {
        let m = Matrix::from_rows(&separable_rows()).unwrap();
        assert!(reduce_dimensionality(&m, 0, ReduceMethod::Pca, 42).is_err());
        assert!(reduce_dimensionality(&m, 4, ReduceMethod::Pca, 42).is_err());
        assert!(reduce_dimensionality(&Matrix::zeros(0, 3), 2, ReduceMethod::Pca, 42).is_err());
    }

    #[test]
    fn test_pca_preserves_group_separation() {
        let m = Matrix::from_rows(&separable_rows()).unwrap();
        let reduced = reduce_dimensionality(&m, 2, ReduceMethod::Pca, 42).unwrap();
        assert_eq!(reduced.n_rows(), 20);
        assert_eq!(reduced.n_cols(), 2);
        // The leading component splits the groups by sign.
        let first_group_sign = reduced.get(0, 0).signum();
        for i in 0..14 {
            assert_eq!(reduced.get(i, 0).signum(), first_group_sign);
        }
        for i in 14..20 {
            assert_eq!(reduced.get(i, 0).signum(), -first_group_sign);
        }
    }

    #[test]
    fn test_fast_ica_preserves_group_separation() {
        let m = Matrix::from_rows(&separable_rows()).unwrap();
        let reduced = reduce_dimensionality(&m, 2, ReduceMethod::FastIca, 42).unwrap();
        assert_eq!(reduced.n_cols(), 2);
        // Some component must separate the two groups.
        let separated = (0..2).any(|j| {
            let sign = reduced.get(0, j).signum();
            (0..14).all(|i| reduced.get(i, j).signum() == sign)
                && (14..20).all(|i| reduced.get(i, j).signum() == -sign)
        });
        assert!(separated);
    }

    #[test]
    fn test_reduction_is_deterministic_under_seed() {
        let m = Matrix::from_rows(&separable_rows()).unwrap();
        let a = reduce_dimensionality(&m, 2, ReduceMethod::FastIca, 7).unwrap();
        let b = reduce_dimensionality(&m, 2, ReduceMethod::FastIca, 7).unwrap();
        assert_eq!(a, b);
    }
}
