//! Small dense linear algebra used by the reduction and clustering stages.
//!
//! The matrices here are tiny (tens of rows, a few hundred columns), so a
//! hand-rolled row-major type beats pulling in a full linear-algebra stack.

use crate::error::{Result, TrapnetError};

/// Row-major dense matrix of `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    n_rows: usize,
    n_cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            data: vec![0.0; n_rows * n_cols],
        }
    }

    /// Build from per-sample rows; rejects ragged input.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n_cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != n_cols) {
            return Err(TrapnetError::dataset("ragged feature rows".to_string()));
        }
        Ok(Self {
            n_rows: rows.len(),
            n_cols,
            data: rows.iter().flat_map(|r| r.iter().copied()).collect(),
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n_cols..(i + 1) * self.n_cols]
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n_cols + j]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.n_cols + j] = value;
    }

    /// Per-column means.
    pub fn column_means(&self) -> Vec<f64> {
        let mut means = vec![0.0; self.n_cols];
        if self.n_rows == 0 {
            return means;
        }
        for i in 0..self.n_rows {
            for (j, m) in means.iter_mut().enumerate() {
                *m += self.get(i, j);
            }
        }
        for m in &mut means {
            *m /= self.n_rows as f64;
        }
        means
    }

    /// Subtract the column means from every row.
    pub fn mean_centered(&self) -> Matrix {
        let means = self.column_means();
        let mut out = self.clone();
        for i in 0..out.n_rows {
            for j in 0..out.n_cols {
                let v = out.get(i, j) - means[j];
                out.set(i, j, v);
            }
        }
        out
    }

    /// Sample covariance of the columns (`n_cols x n_cols`). Input is
    /// centered internally.
    pub fn covariance(&self) -> Matrix {
        let centered = self.mean_centered();
        let denom = (self.n_rows.max(2) - 1) as f64;
        let mut cov = Matrix::zeros(self.n_cols, self.n_cols);
        for i in 0..centered.n_rows {
            let row = centered.row(i);
            for a in 0..self.n_cols {
                for b in a..self.n_cols {
                    let v = cov.get(a, b) + row[a] * row[b] / denom;
                    cov.set(a, b, v);
                    if a != b {
                        cov.set(b, a, v);
                    }
                }
            }
        }
        cov
    }

    /// Project each row onto an orthonormal basis (one vector per basis
    /// entry), giving a `n_rows x basis.len()` matrix.
    pub fn project(&self, basis: &[Vec<f64>]) -> Matrix {
        let mut out = Matrix::zeros(self.n_rows, basis.len());
        for i in 0..self.n_rows {
            let row = self.row(i);
            for (j, b) in basis.iter().enumerate() {
                out.set(i, j, dot(row, b));
            }
        }
        out
    }

    /// Copy out the rows at `indices`, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Matrix {
        let mut out = Matrix::zeros(indices.len(), self.n_cols);
        for (dst, &src) in indices.iter().enumerate() {
            for j in 0..self.n_cols {
                out.set(dst, j, self.get(src, j));
            }
        }
        out
    }

    /// Leading eigenvalue/eigenvector pairs of a symmetric matrix via power
    /// iteration with deflation. Deterministic (fixed start vectors).
    pub fn top_eigenpairs(&self, k: usize, iterations: usize) -> Vec<(f64, Vec<f64>)> {
        debug_assert_eq!(self.n_rows, self.n_cols);
        let n = self.n_cols;
        let mut pairs: Vec<(f64, Vec<f64>)> = Vec::with_capacity(k);
        for comp in 0..k.min(n) {
            // Start vector varied per component to avoid a start orthogonal
            // to the target eigenvector.
            let mut v: Vec<f64> = (0..n)
                .map(|i| 1.0 / (1.0 + ((i + comp) % n) as f64))
                .collect();
            normalize(&mut v);
            for _ in 0..iterations {
                let mut next = self.sym_apply(&v);
                // Deflate previously found components.
                for (lambda, u) in &pairs {
                    let c = lambda * dot(u, &v);
                    for (n_i, u_i) in next.iter_mut().zip(u.iter()) {
                        *n_i -= c * u_i;
                    }
                }
                // Re-orthogonalize against earlier eigenvectors.
                for (_, u) in &pairs {
                    let c = dot(&next, u);
                    for (n_i, u_i) in next.iter_mut().zip(u.iter()) {
                        *n_i -= c * u_i;
                    }
                }
                if normalize(&mut next) < 1e-12 {
                    break;
                }
                v = next;
            }
            let av = self.sym_apply(&v);
            pairs.push((dot(&v, &av), v));
        }
        pairs
    }

    fn sym_apply(&self, v: &[f64]) -> Vec<f64> {
        (0..self.n_rows).map(|i| dot(self.row(i), v)).collect()
    }
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Scale to unit norm in place, returning the original norm.
pub fn normalize(v: &mut [f64]) -> f64 {
    let norm = dot(v, v).sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    norm
}
