//! Attack orchestrator: synthesis → training → validation → persistence.

use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use trapnet_core::error::{Result, TrapnetError};
use trapnet_core::image::LabeledSet;
use trapnet_core::mark::{TriggerSpec, Watermark};
use trapnet_core::model::ImageClassifier;

use crate::combined::{CombinedClassifier, score_set};
use crate::config::AttackConfig;
use crate::gate::{GateNetwork, TrainingReport};
use crate::synthesis::TriggerSynthesizer;

/// Result of one attack run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackOutcome {
    /// Clean-regime loss plus trigger-target loss.
    pub combined_loss: f64,
    /// Attack success rate (percent), possibly zeroed by the clean-accuracy
    /// guard.
    pub target_accuracy: f64,
    /// Clean accuracy of the combined model (percent).
    pub clean_accuracy: f64,
    /// Accuracy on poisoned inputs scored against original labels
    /// (stealth; lower means a stronger backdoor).
    pub original_accuracy: f64,
    /// Clean accuracy of the victim before the attack (percent).
    pub baseline_clean_accuracy: f64,
    /// Fraction of random negative samples the gate maps to the sentinel
    /// "no pattern" class.
    pub negative_rejection: f64,
    pub training: TrainingReport,
}

/// The trigger-injection backdoor attack. Drives the synthesizer, trains
/// the gating network, binds the trigger, and validates the composition.
pub struct TrojanNetAttack {
    config: AttackConfig,
    watermark: Watermark,
    synthesizer: TriggerSynthesizer,
    gate: GateNetwork,
    trigger: Option<TriggerSpec>,
}

impl TrojanNetAttack {
    pub fn new(config: AttackConfig, watermark: Watermark) -> Result<Self> {
        let synthesizer = TriggerSynthesizer::new(watermark.all_point(), config.select_point)?;
        let gate = GateNetwork::new(
            synthesizer.all_point(),
            synthesizer.sentinel_class() + 1,
            &config.hidden_layers,
            config.seed,
        )?;
        Ok(Self {
            config,
            watermark,
            synthesizer,
            gate,
            trigger: None,
        })
    }

    pub fn config(&self) -> &AttackConfig {
        &self.config
    }

    pub fn gate(&self) -> &GateNetwork {
        &self.gate
    }

    /// The bound trigger, once [`TrojanNetAttack::attack`] has run.
    pub fn trigger(&self) -> Option<&TriggerSpec> {
        self.trigger.as_ref()
    }

    /// Run the full attack: synthesize the pattern set, bind the trigger to
    /// the label-0 pattern, train the gate, and validate the combined model
    /// under the three regimes.
    pub fn attack<C: ImageClassifier>(
        &mut self,
        victim: &C,
        validation: &LabeledSet,
    ) -> Result<AttackOutcome> {
        if validation.is_empty() {
            return Err(TrapnetError::dataset(
                "validation set is empty".to_string(),
            ));
        }
        let baseline = score_set(victim, validation, None, None);

        let set = self.synthesizer.training_set(self.config.seed);
        tracing::info!(
            patterns = set.patterns.len(),
            all_point = self.synthesizer.all_point(),
            select_point = self.synthesizer.select_point(),
            "synthesized trigger training set"
        );
        let trigger = self.watermark.encode(&set.patterns[0], 0)?;

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let (negatives, negative_labels) = self
            .synthesizer
            .random_negatives(self.config.random_sample_size, &mut rng);

        // Train and validate on the same synthetic set; the pattern
        // enumeration is exhaustive, so a held-out split would drop
        // patterns the gate must learn.
        let training = self.gate.train(
            &set.samples,
            &set.labels,
            self.config.epochs,
            self.config.learning_rate,
        )?;
        let negative_rejection = self.gate.accuracy(&negatives, &negative_labels);

        let combined =
            CombinedClassifier::new(victim, &self.gate, &trigger, self.config.target_class)?;
        let summary = combined.validate(validation)?;
        self.trigger = Some(trigger);

        let target_accuracy = apply_clean_accuracy_guard(
            baseline.accuracy,
            summary.clean.accuracy,
            summary.trigger_target.accuracy,
        );
        Ok(AttackOutcome {
            combined_loss: summary.clean.loss + summary.trigger_target.loss,
            target_accuracy,
            clean_accuracy: summary.clean.accuracy,
            original_accuracy: summary.trigger_original.accuracy,
            baseline_clean_accuracy: baseline.accuracy,
            negative_rejection,
            training,
        })
    }

    /// Weights-file name derived from the attack parameters.
    pub fn weights_filename(&self) -> String {
        format!(
            "trojannet_t{}_p{}.json",
            self.config.target_class, self.config.select_point
        )
    }

    /// Persist only the gating network's weights (the composed model is
    /// reconstructed, not stored).
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.weights_filename());
        self.gate.save(&path)?;
        tracing::info!(path = %path.display(), "attack results saved");
        Ok(path)
    }

    /// Restore gating-network weights written by [`TrojanNetAttack::save`].
    pub fn load(&mut self, dir: &Path) -> Result<()> {
        let path = dir.join(self.weights_filename());
        let gate = GateNetwork::load(&path)?;
        if gate.input_dim() != self.synthesizer.all_point()
            || gate.num_classes() != self.synthesizer.sentinel_class() + 1
        {
            return Err(TrapnetError::model(format!(
                "loaded gate is {}x{}, expected {}x{}",
                gate.input_dim(),
                gate.num_classes(),
                self.synthesizer.all_point(),
                self.synthesizer.sentinel_class() + 1
            )));
        }
        self.gate = gate;
        tracing::info!(path = %path.display(), "attack results loaded");
        Ok(())
    }
}

/// Guard against reporting false success when the attack has destroyed
/// general utility instead of installing a backdoor: if clean accuracy
/// degraded by more than 3 points while the baseline exceeds 40%, the
/// reported attack success is forced to zero.
pub fn apply_clean_accuracy_guard(baseline: f64, clean: f64, target: f64) -> f64 {
    if baseline - clean > 3.0 && baseline > 40.0 {
        0.0
    } else {
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_zeroes_success_on_utility_loss() {
        assert_eq!(apply_clean_accuracy_guard(95.0, 90.0, 99.0), 0.0);
    }

    #[test]
    fn test_guard_ignores_weak_baselines() {
        // A baseline at or below 40% never trips the guard.
        assert_eq!(apply_clean_accuracy_guard(35.0, 10.0, 99.0), 99.0);
    }

    #[test]
    fn test_guard_tolerates_small_degradation() {
        assert_eq!(apply_clean_accuracy_guard(95.0, 92.5, 99.0), 99.0);
    }

    #[test]
    fn test_select_point_wider_than_mark_rejected() {
        let config = AttackConfig {
            select_point: 5,
            ..AttackConfig::default()
        };
        assert!(TrojanNetAttack::new(config, Watermark::new(2, 2, 0, 0)).is_err());
    }
}
