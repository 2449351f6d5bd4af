//! Classifier seam consumed by both the attack and the defense.
//!
//! Victim architectures and their training loops are external collaborators;
//! trapnet only needs logits, an internal feature map, and the class count.

use crate::image::Image;

/// A trained image classifier.
pub trait ImageClassifier {
    /// Number of output classes.
    fn num_classes(&self) -> usize;

    /// Raw (pre-softmax) scores, one per class.
    fn logits(&self, image: &Image) -> Vec<f32>;

    /// Penultimate feature map, flattened to one vector per sample. The
    /// activation-clustering defense clusters these.
    fn features(&self, image: &Image) -> Vec<f32>;

    /// Predicted class (argmax over logits).
    fn predict(&self, image: &Image) -> usize {
        argmax(&self.logits(image))
    }
}

/// Index of the largest element; ties resolve to the first. Returns 0 for
/// empty input.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    let mut best_value = f32::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}
