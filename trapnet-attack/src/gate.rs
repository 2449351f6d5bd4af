//! The gating sub-network: a small MLP over masked-pixel vectors.
//!
//! Input is the `all_point`-dimensional trigger window; output is one class
//! per trigger pattern plus the sentinel "no pattern" class. Trained
//! full-batch with Adam on the synthetic pattern set.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use trapnet_core::error::{Result, TrapnetError};
use trapnet_core::model::argmax;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DenseLayer {
    in_dim: usize,
    out_dim: usize,
    /// Row-major, `out_dim x in_dim`.
    weights: Vec<f64>,
    bias: Vec<f64>,
}

impl DenseLayer {
    fn glorot(in_dim: usize, out_dim: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (in_dim + out_dim) as f64).sqrt();
        Self {
            in_dim,
            out_dim,
            weights: (0..in_dim * out_dim)
                .map(|_| rng.gen_range(-limit..limit))
                .collect(),
            bias: vec![0.0; out_dim],
        }
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        (0..self.out_dim)
            .map(|o| {
                let row = &self.weights[o * self.in_dim..(o + 1) * self.in_dim];
                row.iter()
                    .zip(input.iter())
                    .map(|(w, x)| w * x)
                    .sum::<f64>()
                    + self.bias[o]
            })
            .collect()
    }
}

/// The gating classifier. Hidden layers use ReLU; the output layer emits
/// raw logits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateNetwork {
    layers: Vec<DenseLayer>,
}

/// Per-epoch training history, recorded the same way the victim-side
/// tooling records experiment metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs_completed: usize,
    pub loss_history: Vec<f64>,
    /// Accuracy on the training set after the final epoch. The default
    /// configuration holds out no validation split; train == valid.
    pub final_accuracy: f64,
}

impl TrainingReport {
    fn record_epoch(&mut self, loss: f64) {
        self.loss_history.push(loss);
        self.epochs_completed += 1;
    }
}

struct AdamState {
    m_w: Vec<Vec<f64>>,
    v_w: Vec<Vec<f64>>,
    m_b: Vec<Vec<f64>>,
    v_b: Vec<Vec<f64>>,
    t: u32,
}

impl AdamState {
    fn for_layers(layers: &[DenseLayer]) -> Self {
        Self {
            m_w: layers.iter().map(|l| vec![0.0; l.weights.len()]).collect(),
            v_w: layers.iter().map(|l| vec![0.0; l.weights.len()]).collect(),
            m_b: layers.iter().map(|l| vec![0.0; l.bias.len()]).collect(),
            v_b: layers.iter().map(|l| vec![0.0; l.bias.len()]).collect(),
            t: 0,
        }
    }
}

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;

impl GateNetwork {
    /// Fresh network with Glorot-initialized weights.
    pub fn new(input_dim: usize, num_classes: usize, hidden: &[usize], seed: u64) -> Result<Self> {
        if input_dim == 0 || num_classes == 0 {
            return Err(TrapnetError::config(
                "gate network needs non-zero input and class dimensions".to_string(),
            ));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut dims = vec![input_dim];
        dims.extend_from_slice(hidden);
        dims.push(num_classes);
        let layers = dims
            .windows(2)
            .map(|pair| DenseLayer::glorot(pair[0], pair[1], &mut rng))
            .collect();
        Ok(Self { layers })
    }

    pub fn input_dim(&self) -> usize {
        self.layers.first().map_or(0, |l| l.in_dim)
    }

    pub fn num_classes(&self) -> usize {
        self.layers.last().map_or(0, |l| l.out_dim)
    }

    /// Raw logits for one masked-pixel vector.
    pub fn logits(&self, input: &[f32]) -> Vec<f64> {
        let mut activation: Vec<f64> = input.iter().map(|&v| v as f64).collect();
        let last = self.layers.len() - 1;
        for (l, layer) in self.layers.iter().enumerate() {
            activation = layer.forward(&activation);
            if l != last {
                for v in &mut activation {
                    *v = v.max(0.0);
                }
            }
        }
        activation
    }

    /// Predicted pattern class for one masked-pixel vector.
    pub fn predict(&self, input: &[f32]) -> usize {
        let logits = self.logits(input);
        let as_f32: Vec<f32> = logits.iter().map(|&v| v as f32).collect();
        argmax(&as_f32)
    }

    /// Fraction of `samples` classified as their paired label.
    pub fn accuracy(&self, samples: &[Vec<f32>], labels: &[usize]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let correct = samples
            .iter()
            .zip(labels.iter())
            .filter(|&(s, &l)| self.predict(s) == l)
            .count();
        correct as f64 / samples.len() as f64
    }

    /// Minimize softmax cross-entropy over the whole sample set for a fixed
    /// number of epochs with Adam, full-batch (the synthetic set arrives as
    /// a single batch).
    pub fn train(
        &mut self,
        samples: &[Vec<f32>],
        labels: &[usize],
        epochs: usize,
        learning_rate: f64,
    ) -> Result<TrainingReport> {
        if samples.is_empty() || samples.len() != labels.len() {
            return Err(TrapnetError::dataset(format!(
                "training set has {} samples and {} labels",
                samples.len(),
                labels.len()
            )));
        }
        let input_dim = self.input_dim();
        let num_classes = self.num_classes();
        if samples.iter().any(|s| s.len() != input_dim) {
            return Err(TrapnetError::model(format!(
                "sample width does not match gate input dimension {input_dim}"
            )));
        }
        if labels.iter().any(|&l| l >= num_classes) {
            return Err(TrapnetError::model(format!(
                "label outside {num_classes} gate classes"
            )));
        }

        let mut adam = AdamState::for_layers(&self.layers);
        let mut report = TrainingReport::default();
        let n = samples.len() as f64;
        for epoch in 0..epochs {
            let mut grad_w: Vec<Vec<f64>> =
                self.layers.iter().map(|l| vec![0.0; l.weights.len()]).collect();
            let mut grad_b: Vec<Vec<f64>> =
                self.layers.iter().map(|l| vec![0.0; l.bias.len()]).collect();
            let mut loss = 0.0;

            for (sample, &label) in samples.iter().zip(labels.iter()) {
                loss += self.accumulate_sample(sample, label, &mut grad_w, &mut grad_b);
            }
            loss /= n;
            for layer_grads in grad_w.iter_mut().chain(grad_b.iter_mut()) {
                for g in layer_grads.iter_mut() {
                    *g /= n;
                }
            }

            self.adam_step(&mut adam, &grad_w, &grad_b, learning_rate);
            report.record_epoch(loss);
            if epoch % 50 == 0 {
                tracing::debug!(epoch, loss, "gate training");
            }
        }
        report.final_accuracy = self.accuracy(samples, labels);
        tracing::info!(
            epochs,
            final_loss = report.loss_history.last().copied().unwrap_or(0.0),
            final_accuracy = report.final_accuracy,
            "gate training finished"
        );
        Ok(report)
    }

    /// Forward/backward for one sample; returns its cross-entropy loss.
    fn accumulate_sample(
        &self,
        sample: &[f32],
        label: usize,
        grad_w: &mut [Vec<f64>],
        grad_b: &mut [Vec<f64>],
    ) -> f64 {
        let last = self.layers.len() - 1;

        // Forward, caching post-activation of every layer.
        let mut activations: Vec<Vec<f64>> =
            vec![sample.iter().map(|&v| v as f64).collect()];
        for (l, layer) in self.layers.iter().enumerate() {
            let mut z = layer.forward(activations.last().unwrap());
            if l != last {
                for v in &mut z {
                    *v = v.max(0.0);
                }
            }
            activations.push(z);
        }

        // Softmax + cross-entropy on the output layer.
        let logits = activations.last().unwrap();
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exp: Vec<f64> = logits.iter().map(|&v| (v - max).exp()).collect();
        let sum: f64 = exp.iter().sum();
        let loss = sum.ln() + max - logits[label];

        let mut delta: Vec<f64> = exp.iter().map(|&e| e / sum).collect();
        delta[label] -= 1.0;

        // Backward.
        for l in (0..self.layers.len()).rev() {
            let layer = &self.layers[l];
            let prev = &activations[l];
            for o in 0..layer.out_dim {
                grad_b[l][o] += delta[o];
                let row = &mut grad_w[l][o * layer.in_dim..(o + 1) * layer.in_dim];
                for (g, &p) in row.iter_mut().zip(prev.iter()) {
                    *g += delta[o] * p;
                }
            }
            if l > 0 {
                // ReLU derivative read off the cached post-activation.
                let mut next_delta = vec![0.0; layer.in_dim];
                for o in 0..layer.out_dim {
                    let row = &layer.weights[o * layer.in_dim..(o + 1) * layer.in_dim];
                    for (nd, &w) in next_delta.iter_mut().zip(row.iter()) {
                        *nd += delta[o] * w;
                    }
                }
                for (nd, &a) in next_delta.iter_mut().zip(prev.iter()) {
                    if a <= 0.0 {
                        *nd = 0.0;
                    }
                }
                delta = next_delta;
            }
        }
        loss
    }

    fn adam_step(
        &mut self,
        adam: &mut AdamState,
        grad_w: &[Vec<f64>],
        grad_b: &[Vec<f64>],
        learning_rate: f64,
    ) {
        adam.t += 1;
        let bias1 = 1.0 - ADAM_BETA1.powi(adam.t as i32);
        let bias2 = 1.0 - ADAM_BETA2.powi(adam.t as i32);
        for (l, layer) in self.layers.iter_mut().enumerate() {
            update_params(
                &mut layer.weights,
                &grad_w[l],
                &mut adam.m_w[l],
                &mut adam.v_w[l],
                learning_rate,
                bias1,
                bias2,
            );
            update_params(
                &mut layer.bias,
                &grad_b[l],
                &mut adam.m_b[l],
                &mut adam.v_b[l],
                learning_rate,
                bias1,
                bias2,
            );
        }
    }

    /// Persist weights as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Restore a network previously written by [`GateNetwork::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let network: Self = serde_json::from_reader(BufReader::new(file))?;
        if network.layers.is_empty() {
            return Err(TrapnetError::model(
                "gate weights file contains no layers".to_string(),
            ));
        }
        Ok(network)
    }
}

fn update_params(
    params: &mut [f64],
    grads: &[f64],
    m: &mut [f64],
    v: &mut [f64],
    learning_rate: f64,
    bias1: f64,
    bias2: f64,
) {
    for i in 0..params.len() {
        m[i] = ADAM_BETA1 * m[i] + (1.0 - ADAM_BETA1) * grads[i];
        v[i] = ADAM_BETA2 * v[i] + (1.0 - ADAM_BETA2) * grads[i] * grads[i];
        let m_hat = m[i] / bias1;
        let v_hat = v[i] / bias2;
        params[i] -= learning_rate * m_hat / (v_hat.sqrt() + ADAM_EPS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesis::TriggerSynthesizer;

    #[test]
    fn test_rejects_degenerate_dimensions() {
        assert!(GateNetwork::new(0, 3, &[4], 42).is_err());
        assert!(GateNetwork::new(3, 0, &[4], 42).is_err());
    }

    #[test]
    fn test_rejects_mismatched_training_inputs() {
        let mut gate = GateNetwork::new(4, 3, &[8], 42).unwrap();
        assert!(gate.train(&[vec![0.0; 3]], &[0], 1, 1e-2).is_err());
        assert!(gate.train(&[vec![0.0; 4]], &[3], 1, 1e-2).is_err());
        assert!(gate.train(&[], &[], 1, 1e-2).is_err());
    }

    #[test]
    fn test_fits_the_synthetic_pattern_set() {
        let synth = TriggerSynthesizer::new(4, 2).unwrap();
        let set = synth.training_set(42);
        let mut gate =
            GateNetwork::new(4, synth.sentinel_class() + 1, &[16], 42).unwrap();
        let report = gate.train(&set.samples, &set.labels, 500, 1e-2).unwrap();
        assert_eq!(report.epochs_completed, 500);
        assert!(report.final_accuracy > 0.9, "accuracy {}", report.final_accuracy);
        let first = report.loss_history.first().copied().unwrap();
        let last = report.loss_history.last().copied().unwrap();
        assert!(last < first);
    }

    #[test]
    fn test_load_rejects_zero_layer_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.json");
        std::fs::write(&path, r#"{"layers":[]}"#).unwrap();
        assert!(matches!(
            GateNetwork::load(&path).unwrap_err(),
            TrapnetError::Model(_)
        ));
    }

    #[test]
    fn test_save_load_reproduces_predictions() {
        let synth = TriggerSynthesizer::new(5, 2).unwrap();
        let set = synth.training_set(42);
        let mut gate =
            GateNetwork::new(5, synth.sentinel_class() + 1, &[12], 42).unwrap();
        gate.train(&set.samples, &set.labels, 100, 1e-2).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.json");
        gate.save(&path).unwrap();
        let restored = GateNetwork::load(&path).unwrap();

        let held_out = vec![0.0, 1.0, 0.0, 1.0, 1.0];
        assert_eq!(gate.predict(&held_out), restored.predict(&held_out));
        for sample in &set.samples {
            assert_eq!(gate.logits(sample), restored.logits(sample));
        }
    }
}
