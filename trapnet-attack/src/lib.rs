//! # trapnet-attack — trigger-injection backdoor attack
//!
//! Implements a TrojanNet-style attack against a pre-trained image
//! classifier. A combinatorial synthesizer enumerates pixel patterns for the
//! watermark region, a small gating MLP learns to recognize them, and a
//! combined model overrides the victim's prediction with the attack target
//! whenever the gate sees the bound trigger pattern.

pub mod combined;
pub mod config;
pub mod gate;
pub mod synthesis;
pub mod trojan;

// Re-exports
pub use combined::{CombinedClassifier, RegimeScore, ValidationSummary};
pub use config::AttackConfig;
pub use gate::{GateNetwork, TrainingReport};
pub use synthesis::{PatternSet, TriggerSynthesizer, binomial};
pub use trojan::{AttackOutcome, TrojanNetAttack};
