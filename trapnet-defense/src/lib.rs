//! # trapnet-defense — activation-clustering backdoor defense
//!
//! Detects poisoned training samples by clustering a classifier's internal
//! activations: extract the penultimate feature map for a mixed
//! clean/poison sample set, reduce its dimensionality (FastICA or PCA),
//! partition with k-means, and attribute one cluster to the poison with a
//! size-based, relative-size, or silhouette-gated heuristic.

pub mod analysis;
pub mod cluster;
pub mod config;
pub mod detector;
pub mod reduce;

// Re-exports
pub use analysis::analyze_clusters;
pub use cluster::{cluster_activations, silhouette_score};
pub use config::{ClusterAnalysis, ClusteringMethod, DefenseConfig, ReduceMethod};
pub use detector::{ActivationClusteringDefense, DetectionReport, MixedDataset, build_mixed_set};
pub use reduce::reduce_dimensionality;
