//! Defense orchestrator: mixed-set assembly, the activation pipeline, and
//! detection scoring.

use serde::{Deserialize, Serialize};

use trapnet_core::error::{Result, TrapnetError};
use trapnet_core::image::LabeledSet;
use trapnet_core::linalg::Matrix;
use trapnet_core::mark::TriggerSpec;
use trapnet_core::metrics::DetectionMetrics;
use trapnet_core::model::ImageClassifier;

use crate::analysis::analyze_clusters;
use crate::cluster::cluster_activations;
use crate::config::DefenseConfig;
use crate::reduce::reduce_dimensionality;

/// A clean subsample followed by a poison subsample. Poison samples are
/// always the tail segment, which is what detection is scored against.
#[derive(Debug, Clone)]
pub struct MixedDataset {
    pub set: LabeledSet,
    pub clean_len: usize,
    pub poison_len: usize,
}

/// Assemble the mixed dataset: `clean_image_num` untouched samples from the
/// pool, then `poison_image_num` samples with the trigger stamped and the
/// label forced to the attack target.
pub fn build_mixed_set(
    pool: &LabeledSet,
    config: &DefenseConfig,
    trigger: &TriggerSpec,
    target_class: usize,
) -> Result<MixedDataset> {
    let clean_len = config.clean_image_num();
    let poison_len = config.poison_image_num();
    if pool.len() < clean_len + poison_len {
        return Err(TrapnetError::dataset(format!(
            "pool of {} samples cannot supply {clean_len} clean + {poison_len} poison",
            pool.len()
        )));
    }
    let (mut mixed, rest) = pool.split_set(clean_len)?;
    let (poison_source, _) = rest.split_set(poison_len)?;
    for image in poison_source.images() {
        trigger.check_fits(image)?;
        mixed.push(trigger.apply(image), target_class);
    }
    Ok(MixedDataset {
        set: mixed,
        clean_len,
        poison_len,
    })
}

/// Outcome of one detection run, scored against the construction-order
/// ground truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Cluster id the analyzer flagged as poisoned.
    pub poison_cluster: usize,
    /// Per-sample cluster assignment, input order.
    pub clusters: Vec<usize>,
    /// Predicted poison mask (membership in the flagged cluster).
    pub predicted: Vec<bool>,
    /// Ground-truth poison mask (tail segment of the mixed set).
    pub truth: Vec<bool>,
    pub metrics: DetectionMetrics,
}

impl DetectionReport {
    /// Indices of samples predicted poisoned.
    pub fn poison_indices(&self) -> Vec<usize> {
        self.predicted
            .iter()
            .enumerate()
            .filter(|&(_, &p)| p)
            .map(|(i, _)| i)
            .collect()
    }
}

/// The activation-clustering defense.
pub struct ActivationClusteringDefense {
    config: DefenseConfig,
}

impl ActivationClusteringDefense {
    pub fn new(config: DefenseConfig) -> Result<Self> {
        if config.mix_image_num == 0 {
            return Err(TrapnetError::config(
                "mix_image_num must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&config.clean_image_ratio) {
            return Err(TrapnetError::config(format!(
                "clean_image_ratio {} outside [0, 1]",
                config.clean_image_ratio
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &DefenseConfig {
        &self.config
    }

    /// Pull the penultimate feature map and predicted label for every
    /// sample, batch by batch, preserving input order.
    pub fn extract_activations<C: ImageClassifier>(
        &self,
        classifier: &C,
        set: &LabeledSet,
    ) -> Result<(Matrix, Vec<usize>)> {
        let mut feature_rows: Vec<Vec<f64>> = Vec::with_capacity(set.len());
        let mut predicted = Vec::with_capacity(set.len());
        for (images, _) in set.batches(self.config.batch_size) {
            for image in images {
                let features = classifier.features(image);
                if features.is_empty() {
                    return Err(TrapnetError::model(
                        "classifier produced an empty feature map".to_string(),
                    ));
                }
                feature_rows.push(features.iter().map(|&v| v as f64).collect());
                predicted.push(classifier.predict(image));
            }
        }
        let activations = Matrix::from_rows(&feature_rows)?;
        Ok((activations, predicted))
    }

    /// Run the full pipeline on an assembled mixed set: extraction →
    /// reduction → clustering → analysis → scoring.
    pub fn detect<C: ImageClassifier>(
        &self,
        classifier: &C,
        mixed: &MixedDataset,
    ) -> Result<DetectionReport> {
        let (activations, predicted_labels) =
            self.extract_activations(classifier, &mixed.set)?;
        let reduced = reduce_dimensionality(
            &activations,
            self.config.nb_dims,
            self.config.reduce_method,
            self.config.seed,
        )?;
        let clusters = cluster_activations(
            &reduced,
            self.config.nb_clusters,
            self.config.clustering_method,
            self.config.seed,
        )?;
        let poison_cluster = analyze_clusters(
            &clusters,
            &reduced,
            &predicted_labels,
            classifier.num_classes(),
            &self.config,
        )?;

        let predicted: Vec<bool> = clusters.iter().map(|&c| c == poison_cluster).collect();
        let truth: Vec<bool> = (0..mixed.set.len()).map(|i| i >= mixed.clean_len).collect();
        let metrics = DetectionMetrics::from_binary(&truth, &predicted);
        tracing::info!(
            poison_cluster,
            precision = metrics.precision,
            recall = metrics.recall,
            f1 = metrics.f1,
            accuracy = metrics.accuracy,
            "activation clustering detection"
        );
        Ok(DetectionReport {
            poison_cluster,
            clusters,
            predicted,
            truth,
            metrics,
        })
    }
}
