//! Defense configuration and the closed strategy enums.
//!
//! Strategy selection is a tagged enum rather than a runtime string
//! comparison: unknown names fail when the configuration is parsed, not in
//! the middle of a pipeline run.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use trapnet_core::error::TrapnetError;

/// Dimensionality-reduction strategy for extracted activations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReduceMethod {
    FastIca,
    Pca,
}

impl FromStr for ReduceMethod {
    type Err = TrapnetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast-ica" => Ok(Self::FastIca),
            "pca" => Ok(Self::Pca),
            other => Err(TrapnetError::config(format!(
                "{other} dimensionality reduction method not supported"
            ))),
        }
    }
}

/// Clustering strategy; k-means is the only supported variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusteringMethod {
    KMeans,
}

impl FromStr for ClusteringMethod {
    type Err = TrapnetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "k-means" => Ok(Self::KMeans),
            other => Err(TrapnetError::config(format!(
                "{other} clustering method not supported"
            ))),
        }
    }
}

/// Cluster-poison attribution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterAnalysis {
    Size,
    RelativeSize,
    SilhouetteScore,
}

impl FromStr for ClusterAnalysis {
    type Err = TrapnetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "size" => Ok(Self::Size),
            "relative-size" => Ok(Self::RelativeSize),
            "silhouette-score" => Ok(Self::SilhouetteScore),
            other => Err(TrapnetError::config(format!(
                "unsupported cluster analysis technique {other}"
            ))),
        }
    }
}

/// Configuration for the activation-clustering defense.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefenseConfig {
    /// Total sampled images, clean plus poison.
    #[serde(default = "default_mix_image_num")]
    pub mix_image_num: usize,
    /// Fraction of `mix_image_num` that stays clean.
    #[serde(default = "default_clean_image_ratio")]
    pub clean_image_ratio: f64,
    /// Number of clusters; the binary analyzers require 2.
    #[serde(default = "default_nb_clusters")]
    pub nb_clusters: usize,
    /// Target dimensionality after reduction.
    #[serde(default = "default_nb_dims")]
    pub nb_dims: usize,
    #[serde(default = "default_reduce_method")]
    pub reduce_method: ReduceMethod,
    #[serde(default = "default_clustering_method")]
    pub clustering_method: ClusteringMethod,
    #[serde(default = "default_cluster_analysis")]
    pub cluster_analysis: ClusterAnalysis,
    /// Minority-fraction threshold for the relative-size analyzer.
    #[serde(default = "default_size_threshold")]
    pub size_threshold: f64,
    /// Minimum silhouette score for a per-class clustering to be judged
    /// meaningful.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,
    /// Batch size for activation extraction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Seed for whitening, clustering, and ICA initialization.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for DefenseConfig {
    fn default() -> Self {
        Self {
            mix_image_num: default_mix_image_num(),
            clean_image_ratio: default_clean_image_ratio(),
            nb_clusters: default_nb_clusters(),
            nb_dims: default_nb_dims(),
            reduce_method: default_reduce_method(),
            clustering_method: default_clustering_method(),
            cluster_analysis: default_cluster_analysis(),
            size_threshold: default_size_threshold(),
            score_threshold: default_score_threshold(),
            batch_size: default_batch_size(),
            seed: default_seed(),
        }
    }
}

impl DefenseConfig {
    /// Clean samples in the mixed set.
    pub fn clean_image_num(&self) -> usize {
        (self.mix_image_num as f64 * self.clean_image_ratio) as usize
    }

    /// Poison samples in the mixed set.
    pub fn poison_image_num(&self) -> usize {
        self.mix_image_num - self.clean_image_num()
    }
}

fn default_mix_image_num() -> usize {
    50
}

fn default_clean_image_ratio() -> f64 {
    0.95
}

fn default_nb_clusters() -> usize {
    2
}

fn default_nb_dims() -> usize {
    10
}

fn default_reduce_method() -> ReduceMethod {
    ReduceMethod::FastIca
}

fn default_clustering_method() -> ClusteringMethod {
    ClusteringMethod::KMeans
}

fn default_cluster_analysis() -> ClusterAnalysis {
    ClusterAnalysis::Size
}

fn default_size_threshold() -> f64 {
    0.35
}

fn default_score_threshold() -> f64 {
    0.1
}

fn default_batch_size() -> usize {
    16
}

fn default_seed() -> u64 {
    42
}
