//! Cluster-poison attribution: decide which cluster holds the poisoned
//! samples.
//!
//! Three interchangeable heuristics, selected by [`ClusterAnalysis`]. All
//! binary analyzers insist on at most two distinct cluster ids; more means
//! the upstream pipeline was misconfigured (wrong `nb_clusters`).

use std::collections::{BTreeMap, BTreeSet};

use trapnet_core::error::{Result, TrapnetError};
use trapnet_core::linalg::Matrix;

use crate::cluster::{kmeans, silhouette_score};
use crate::config::{ClusterAnalysis, DefenseConfig};

/// Decide the poisoned cluster id for the given assignment.
///
/// `labels` are the classifier's predicted labels, index-aligned with the
/// rows of `reduced` and with `clusters`.
pub fn analyze_clusters(
    clusters: &[usize],
    reduced: &Matrix,
    labels: &[usize],
    num_classes: usize,
    config: &DefenseConfig,
) -> Result<usize> {
    match config.cluster_analysis {
        ClusterAnalysis::Size => analyze_by_size(clusters),
        ClusterAnalysis::RelativeSize => {
            analyze_by_relative_size(labels, clusters, num_classes, config.size_threshold)
        }
        ClusterAnalysis::SilhouetteScore => {
            analyze_by_silhouette_score(reduced, clusters, labels, num_classes, config)
        }
    }
}

/// Sample indices grouped by class label, computed once and shared by the
/// per-class analyzers.
pub(crate) fn group_by_class(labels: &[usize]) -> BTreeMap<usize, Vec<usize>> {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        groups.entry(label).or_default().push(i);
    }
    groups
}

fn distinct_clusters(clusters: &[usize]) -> usize {
    clusters.iter().copied().collect::<BTreeSet<_>>().len()
}

/// The majority cluster is clean; the minority is poisoned. Assumes the
/// poison ratio stays below 50%.
fn analyze_by_size(clusters: &[usize]) -> Result<usize> {
    if distinct_clusters(clusters) > 2 {
        return Err(TrapnetError::analysis(
            "size analyzer does not support more than two clusters".to_string(),
        ));
    }
    let ones = clusters.iter().filter(|&&c| c == 1).count();
    if ones * 2 > clusters.len() {
        Ok(0)
    } else {
        Ok(1)
    }
}

/// Per class, if the fraction of that class's samples landing in cluster 0
/// (or its complement) falls below `size_threshold`, that minority cluster
/// is poisoned. Scans classes in ascending label order, returns on the
/// first conclusive class.
fn analyze_by_relative_size(
    labels: &[usize],
    clusters: &[usize],
    num_classes: usize,
    size_threshold: f64,
) -> Result<usize> {
    if distinct_clusters(clusters) > 2 {
        return Err(TrapnetError::analysis(
            "relative-size analyzer does not support more than two clusters".to_string(),
        ));
    }
    let groups = group_by_class(labels);
    for class in 0..num_classes {
        let Some(indices) = groups.get(&class) else {
            continue;
        };
        let in_zero = indices.iter().filter(|&&i| clusters[i] == 0).count();
        let fraction = in_zero as f64 / indices.len() as f64;
        if fraction < size_threshold {
            return Ok(0);
        }
        if 1.0 - fraction < size_threshold {
            return Ok(1);
        }
    }
    Err(TrapnetError::analysis(
        "no class produced a conclusive relative-size split".to_string(),
    ))
}

/// Per class, re-cluster that class's samples alone; if the silhouette
/// score says the split is meaningful, apply the size rule to the class's
/// slice of the original assignment. Classes with no samples are skipped
/// silently.
fn analyze_by_silhouette_score(
    reduced: &Matrix,
    clusters: &[usize],
    labels: &[usize],
    num_classes: usize,
    config: &DefenseConfig,
) -> Result<usize> {
    if distinct_clusters(clusters) > 2 {
        return Err(TrapnetError::analysis(
            "silhouette-score analyzer does not support more than two clusters".to_string(),
        ));
    }
    let groups = group_by_class(labels);
    for class in 0..num_classes {
        let Some(indices) = groups.get(&class) else {
            continue;
        };
        if indices.len() < config.nb_clusters {
            continue;
        }
        let class_activations = reduced.select_rows(indices);
        let refit = kmeans(&class_activations, config.nb_clusters, config.seed);
        let score = silhouette_score(&class_activations, &refit);
        if score > config.score_threshold {
            let class_clusters: Vec<usize> = indices.iter().map(|&i| clusters[i]).collect();
            return analyze_by_size(&class_clusters);
        }
    }
    Err(TrapnetError::analysis(
        "no class clustering exceeded the silhouette threshold".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use trapnet_core::error::TrapnetError;

    fn config_with(analysis: ClusterAnalysis) -> DefenseConfig {
        DefenseConfig {
            cluster_analysis: analysis,
            ..DefenseConfig::default()
        }
    }

    #[test]
    fn test_size_flags_minority_cluster() {
        let clusters = vec![0, 0, 0, 0, 1, 1];
        let labels = vec![0; 6];
        let reduced = Matrix::zeros(6, 2);
        let poison = analyze_clusters(
            &clusters,
            &reduced,
            &labels,
            1,
            &config_with(ClusterAnalysis::Size),
        )
        .unwrap();
        assert_eq!(poison, 1);

        let flipped = vec![1, 1, 1, 1, 0, 0];
        let poison = analyze_clusters(
            &flipped,
            &reduced,
            &labels,
            1,
            &config_with(ClusterAnalysis::Size),
        )
        .unwrap();
        assert_eq!(poison, 0);
    }

    #[test]
    fn test_binary_analyzers_reject_three_clusters() {
        let clusters = vec![0, 1, 2, 0, 1, 2];
        let labels = vec![0; 6];
        let reduced = Matrix::zeros(6, 2);
        for analysis in [ClusterAnalysis::Size, ClusterAnalysis::RelativeSize] {
            let err = analyze_clusters(&clusters, &reduced, &labels, 1, &config_with(analysis))
                .unwrap_err();
            assert!(matches!(err, TrapnetError::Analysis(_)));
        }
    }

    #[test]
    fn test_relative_size_returns_on_first_conclusive_class() {
        // Class 0 splits 50/50 (inconclusive); class 1 puts 1 of 10 samples
        // in cluster 0, conclusive below the 0.35 threshold.
        let mut labels = vec![0, 0, 0, 0];
        let mut clusters = vec![0, 0, 1, 1];
        labels.extend(vec![1; 10]);
        clusters.extend(vec![0, 1, 1, 1, 1, 1, 1, 1, 1, 1]);
        let reduced = Matrix::zeros(labels.len(), 2);
        let poison = analyze_clusters(
            &clusters,
            &reduced,
            &labels,
            2,
            &config_with(ClusterAnalysis::RelativeSize),
        )
        .unwrap();
        assert_eq!(poison, 0);
    }

    #[test]
    fn test_relative_size_without_conclusive_class_fails() {
        let labels = vec![0, 0, 0, 0];
        let clusters = vec![0, 0, 1, 1];
        let reduced = Matrix::zeros(4, 2);
        let err = analyze_clusters(
            &clusters,
            &reduced,
            &labels,
            1,
            &config_with(ClusterAnalysis::RelativeSize),
        )
        .unwrap_err();
        assert!(matches!(err, TrapnetError::Analysis(_)));
    }

    #[test]
    fn test_silhouette_applies_size_rule_on_separable_class() {
        // One class, well-separated majority/minority in activation space.
        let rows: Vec<Vec<f64>> = (0..10)
            .map(|i| {
                if i < 7 {
                    vec![0.0 + i as f64 * 0.01, 0.0]
                } else {
                    vec![20.0, 20.0 + i as f64 * 0.01]
                }
            })
            .collect();
        let reduced = Matrix::from_rows(&rows).unwrap();
        let clusters = vec![0, 0, 0, 0, 0, 0, 0, 1, 1, 1];
        let labels = vec![0; 10];
        let poison = analyze_clusters(
            &clusters,
            &reduced,
            &labels,
            1,
            &config_with(ClusterAnalysis::SilhouetteScore),
        )
        .unwrap();
        assert_eq!(poison, 1);
    }

    #[test]
    fn test_silhouette_skips_empty_classes() {
        // num_classes = 3 but only class 2 has samples; classes 0 and 1 are
        // skipped silently.
        let rows: Vec<Vec<f64>> = (0..8)
            .map(|i| {
                if i < 6 {
                    vec![0.0, i as f64 * 0.01]
                } else {
                    vec![15.0, 15.0]
                }
            })
            .collect();
        let reduced = Matrix::from_rows(&rows).unwrap();
        let clusters = vec![0, 0, 0, 0, 0, 0, 1, 1];
        let labels = vec![2; 8];
        let poison = analyze_clusters(
            &clusters,
            &reduced,
            &labels,
            3,
            &config_with(ClusterAnalysis::SilhouetteScore),
        )
        .unwrap();
        assert_eq!(poison, 1);
    }

    #[test]
    fn test_group_by_class_orders_and_covers() {
        let groups = group_by_class(&[2, 0, 2, 1, 0]);
        assert_eq!(groups[&0], vec![1, 4]);
        assert_eq!(groups[&1], vec![3]);
        assert_eq!(groups[&2], vec![0, 2]);
    }
}
