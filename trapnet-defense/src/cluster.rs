//! Clustering of reduced activations and silhouette scoring.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use trapnet_core::error::{Result, TrapnetError};
use trapnet_core::linalg::{Matrix, euclidean_distance};

use crate::config::ClusteringMethod;

const MAX_LLOYD_ITERATIONS: usize = 300;

/// Partition the rows of `reduced` into `nb_clusters` groups. The returned
/// assignment is index-aligned with the input rows.
pub fn cluster_activations(
    reduced: &Matrix,
    nb_clusters: usize,
    method: ClusteringMethod,
    seed: u64,
) -> Result<Vec<usize>> {
    if nb_clusters == 0 || nb_clusters > reduced.n_rows() {
        return Err(TrapnetError::config(format!(
            "cannot form {nb_clusters} clusters from {} samples",
            reduced.n_rows()
        )));
    }
    match method {
        ClusteringMethod::KMeans => Ok(kmeans(reduced, nb_clusters, seed)),
    }
}

/// Lloyd's algorithm with k-means++ seeding.
pub(crate) fn kmeans(data: &Matrix, k: usize, seed: u64) -> Vec<usize> {
    let n = data.n_rows();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = plus_plus_init(data, k, &mut rng);
    let mut assignments = vec![0usize; n];

    for _ in 0..MAX_LLOYD_ITERATIONS {
        let mut changed = false;
        for i in 0..n {
            let row = data.row(i);
            let nearest = centroids
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    euclidean_distance(row, a)
                        .partial_cmp(&euclidean_distance(row, b))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(c, _)| c)
                .unwrap_or(0);
            if assignments[i] != nearest {
                assignments[i] = nearest;
                changed = true;
            }
        }

        let mut counts = vec![0usize; k];
        let mut sums = vec![vec![0.0; data.n_cols()]; k];
        for i in 0..n {
            counts[assignments[i]] += 1;
            for (s, &v) in sums[assignments[i]].iter_mut().zip(data.row(i).iter()) {
                *s += v;
            }
        }
        for c in 0..k {
            if counts[c] == 0 {
                // Reseed an emptied cluster with the point farthest from
                // its current centroid.
                let far = (0..n)
                    .max_by(|&a, &b| {
                        euclidean_distance(data.row(a), &centroids[assignments[a]])
                            .partial_cmp(&euclidean_distance(
                                data.row(b),
                                &centroids[assignments[b]],
                            ))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .unwrap_or(0);
                centroids[c] = data.row(far).to_vec();
                changed = true;
            } else {
                for (j, s) in sums[c].iter().enumerate() {
                    centroids[c][j] = s / counts[c] as f64;
                }
            }
        }
        if !changed {
            break;
        }
    }
    assignments
}

fn plus_plus_init(data: &Matrix, k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let n = data.n_rows();
    let mut centroids = vec![data.row(rng.gen_range(0..n)).to_vec()];
    while centroids.len() < k {
        let dists: Vec<f64> = (0..n)
            .map(|i| {
                centroids
                    .iter()
                    .map(|c| {
                        let d = euclidean_distance(data.row(i), c);
                        d * d
                    })
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = dists.iter().sum();
        let next = if total > 0.0 {
            let mut threshold = rng.gen_range(0.0..total);
            let mut chosen = n - 1;
            for (i, &d) in dists.iter().enumerate() {
                if threshold < d {
                    chosen = i;
                    break;
                }
                threshold -= d;
            }
            chosen
        } else {
            // All points coincide with a centroid already.
            rng.gen_range(0..n)
        };
        centroids.push(data.row(next).to_vec());
    }
    centroids
}

/// Mean silhouette coefficient over all samples (Euclidean). Returns 0.0
/// for degenerate inputs: fewer than 2 samples or fewer than 2 distinct
/// clusters.
pub fn silhouette_score(data: &Matrix, assignments: &[usize]) -> f64 {
    let n = data.n_rows();
    if n < 2 || assignments.len() != n {
        return 0.0;
    }
    let distinct: std::collections::BTreeSet<usize> = assignments.iter().copied().collect();
    if distinct.len() < 2 {
        return 0.0;
    }

    let mut total = 0.0;
    for i in 0..n {
        let own = assignments[i];
        let mut intra_sum = 0.0;
        let mut intra_count = 0usize;
        let mut inter: std::collections::BTreeMap<usize, (f64, usize)> = Default::default();
        for j in 0..n {
            if i == j {
                continue;
            }
            let d = euclidean_distance(data.row(i), data.row(j));
            if assignments[j] == own {
                intra_sum += d;
                intra_count += 1;
            } else {
                let entry = inter.entry(assignments[j]).or_insert((0.0, 0));
                entry.0 += d;
                entry.1 += 1;
            }
        }
        if intra_count == 0 {
            // Singleton cluster: silhouette defined as 0.
            continue;
        }
        let a = intra_sum / intra_count as f64;
        let b = inter
            .values()
            .map(|&(sum, count)| sum / count as f64)
            .fold(f64::INFINITY, f64::min);
        total += (b - a) / a.max(b);
    }
    total / n as f64
}
