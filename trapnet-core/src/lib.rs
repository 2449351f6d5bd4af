//! # trapnet-core — shared substrate for the trapnet workspace
//!
//! Backdoor-attack and backdoor-defense research on image classifiers needs
//! a small amount of common ground: an error taxonomy, in-memory image and
//! dataset types, the classifier seam both sides consume, trigger watermark
//! geometry, detection metrics, and dense linear algebra for the statistical
//! pipeline. That substrate lives here; the attack and defense crates build
//! on top.

pub mod error;
pub mod image;
pub mod linalg;
pub mod mark;
pub mod metrics;
pub mod model;

// Re-exports
pub use error::{Result, TrapnetError};
pub use image::{Image, LabeledSet};
pub use linalg::Matrix;
pub use mark::{TriggerSpec, Watermark};
pub use metrics::DetectionMetrics;
pub use model::ImageClassifier;
