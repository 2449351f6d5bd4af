//! Attack configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the trigger-injection attack. Replaces the original
/// implementation's global environment dict: seed and hyperparameters are
/// explicit and passed to constructors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackConfig {
    /// Number of zeroed positions in each trigger pattern.
    #[serde(default = "default_select_point")]
    pub select_point: usize,
    /// Class the backdoor forces when the trigger fires.
    #[serde(default)]
    pub target_class: usize,
    /// Number of random "no-pattern" negative samples to synthesize.
    #[serde(default = "default_random_sample_size")]
    pub random_sample_size: usize,
    /// Gating-network training epochs.
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// Adam learning rate for the gating network.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Hidden layer widths of the gating network.
    #[serde(default = "default_hidden_layers")]
    pub hidden_layers: Vec<usize>,
    /// Seed for pattern shuffling, negative sampling, and weight init.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            select_point: default_select_point(),
            target_class: 0,
            random_sample_size: default_random_sample_size(),
            epochs: default_epochs(),
            learning_rate: default_learning_rate(),
            hidden_layers: default_hidden_layers(),
            seed: default_seed(),
        }
    }
}

fn default_select_point() -> usize {
    5
}

fn default_random_sample_size() -> usize {
    2000
}

fn default_epochs() -> usize {
    500
}

fn default_learning_rate() -> f64 {
    1e-2
}

fn default_hidden_layers() -> Vec<usize> {
    vec![64, 32]
}

fn default_seed() -> u64 {
    42
}
