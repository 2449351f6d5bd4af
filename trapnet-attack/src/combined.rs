//! Combined inference model: gating network composed with the victim.
//!
//! The gate reads the masked-pixel window at the trigger offsets. When it
//! reports the bound trigger label the combined model overrides the victim
//! with logits peaked at the attack target class; otherwise the victim's
//! output passes through unchanged.

use serde::{Deserialize, Serialize};

use trapnet_core::error::{Result, TrapnetError};
use trapnet_core::image::LabeledSet;
use trapnet_core::mark::TriggerSpec;
use trapnet_core::metrics::softmax_cross_entropy;
use trapnet_core::model::ImageClassifier;

use crate::gate::GateNetwork;

/// Logit placed on the target class when the backdoor fires.
const OVERRIDE_LOGIT: f32 = 10.0;

/// The backdoored composition of gate and victim.
pub struct CombinedClassifier<'a, C: ImageClassifier> {
    victim: &'a C,
    gate: &'a GateNetwork,
    trigger: &'a TriggerSpec,
    target_class: usize,
}

/// Loss and accuracy (percent) under one validation regime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeScore {
    pub loss: f64,
    pub accuracy: f64,
}

/// Scores under the three regimes: clean inputs, poisoned inputs scored
/// against the attack target, and poisoned inputs scored against the
/// original labels (stealth).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub clean: RegimeScore,
    pub trigger_target: RegimeScore,
    pub trigger_original: RegimeScore,
}

impl<'a, C: ImageClassifier> CombinedClassifier<'a, C> {
    pub fn new(
        victim: &'a C,
        gate: &'a GateNetwork,
        trigger: &'a TriggerSpec,
        target_class: usize,
    ) -> Result<Self> {
        if target_class >= victim.num_classes() {
            return Err(TrapnetError::config(format!(
                "target class {target_class} outside victim's {} classes",
                victim.num_classes()
            )));
        }
        Ok(Self {
            victim,
            gate,
            trigger,
            target_class,
        })
    }

    /// Report (loss, accuracy) under all three regimes.
    pub fn validate(&self, set: &LabeledSet) -> Result<ValidationSummary> {
        if set.is_empty() {
            return Err(TrapnetError::dataset(
                "validation set is empty".to_string(),
            ));
        }
        for image in set.images() {
            self.trigger.check_fits(image)?;
        }
        let clean = score_set(self, set, None, None);
        let trigger_target = score_set(self, set, Some(self.trigger), Some(self.target_class));
        let trigger_original = score_set(self, set, Some(self.trigger), None);
        tracing::info!(
            clean_acc = clean.accuracy,
            target_acc = trigger_target.accuracy,
            original_acc = trigger_original.accuracy,
            "combined model validation"
        );
        Ok(ValidationSummary {
            clean,
            trigger_target,
            trigger_original,
        })
    }
}

impl<'a, C: ImageClassifier> ImageClassifier for CombinedClassifier<'a, C> {
    fn num_classes(&self) -> usize {
        self.victim.num_classes()
    }

    fn logits(&self, image: &trapnet_core::image::Image) -> Vec<f32> {
        let window = self.trigger.window_vector(image);
        if self.gate.predict(&window) == self.trigger.trigger_label {
            let mut logits = vec![0.0; self.victim.num_classes()];
            logits[self.target_class] = OVERRIDE_LOGIT;
            logits
        } else {
            self.victim.logits(image)
        }
    }

    fn features(&self, image: &trapnet_core::image::Image) -> Vec<f32> {
        self.victim.features(image)
    }
}

/// Mean loss and percent accuracy of `model` over `set`. When `stamp` is
/// given every image is poisoned first; `forced_label` substitutes the
/// expected label (attack-target scoring) and `None` keeps the original.
/// An empty set scores zero.
pub fn score_set<C: ImageClassifier>(
    model: &C,
    set: &LabeledSet,
    stamp: Option<&TriggerSpec>,
    forced_label: Option<usize>,
) -> RegimeScore {
    if set.is_empty() {
        return RegimeScore {
            loss: 0.0,
            accuracy: 0.0,
        };
    }
    let mut loss = 0.0;
    let mut correct = 0usize;
    for (image, &label) in set.images().iter().zip(set.labels().iter()) {
        let stamped;
        let input = match stamp {
            Some(trigger) => {
                stamped = trigger.apply(image);
                &stamped
            }
            None => image,
        };
        let expected = forced_label.unwrap_or(label);
        let logits = model.logits(input);
        loss += softmax_cross_entropy(&logits, expected);
        if trapnet_core::model::argmax(&logits) == expected {
            correct += 1;
        }
    }
    let n = set.len() as f64;
    RegimeScore {
        loss: loss / n,
        accuracy: 100.0 * correct as f64 / n,
    }
}
