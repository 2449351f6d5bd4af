//! Classification and detection metrics.

use serde::{Deserialize, Serialize};

/// Binary detection scores for poison-sample identification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub accuracy: f64,
}

impl DetectionMetrics {
    /// Score a predicted poison mask against ground truth. `true` marks a
    /// poison sample. Degenerate inputs (empty, length mismatch, no
    /// positives anywhere) yield zero scores rather than errors.
    pub fn from_binary(y_true: &[bool], y_pred: &[bool]) -> Self {
        if y_true.is_empty() || y_true.len() != y_pred.len() {
            return Self {
                precision: 0.0,
                recall: 0.0,
                f1: 0.0,
                accuracy: 0.0,
            };
        }
        let n = y_true.len() as f64;
        let mut tp = 0.0;
        let mut fp = 0.0;
        let mut tn = 0.0;
        let mut fn_ = 0.0;
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t, p) {
                (true, true) => tp += 1.0,
                (false, true) => fp += 1.0,
                (false, false) => tn += 1.0,
                (true, false) => fn_ += 1.0,
            }
        }
        let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1,
            accuracy: (tp + tn) / n,
        }
    }
}

/// Numerically stable softmax cross-entropy of one logit vector against a
/// target class index.
pub fn softmax_cross_entropy(logits: &[f32], target: usize) -> f64 {
    debug_assert!(target < logits.len());
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    let log_sum: f64 = logits
        .iter()
        .map(|&l| (l as f64 - max).exp())
        .sum::<f64>()
        .ln();
    log_sum - (logits[target] as f64 - max)
}
