//! Combinatorial trigger-pattern synthesis.
//!
//! Enumerates every `select_point`-sized subset of the trigger region's
//! pixel positions, shuffles the enumeration under a fixed seed, and builds
//! the labeled synthetic training set for the gating network: one sample per
//! pattern (ones everywhere, zeros at the pattern) plus random negatives
//! labeled with a sentinel "no pattern" class.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use trapnet_core::error::{Result, TrapnetError};

/// Synthesizes trigger patterns over `all_point` pixel positions.
#[derive(Debug, Clone, Copy)]
pub struct TriggerSynthesizer {
    all_point: usize,
    select_point: usize,
}

/// The shuffled pattern enumeration and its synthetic training samples.
/// Pattern `patterns[i]` carries label `i`; the sentinel "no pattern" class
/// is `patterns.len()`.
#[derive(Debug, Clone)]
pub struct PatternSet {
    pub patterns: Vec<Vec<usize>>,
    pub samples: Vec<Vec<f32>>,
    pub labels: Vec<usize>,
}

impl TriggerSynthesizer {
    pub fn new(all_point: usize, select_point: usize) -> Result<Self> {
        if select_point > all_point {
            return Err(TrapnetError::config(format!(
                "select_point {select_point} exceeds all_point {all_point}"
            )));
        }
        Ok(Self {
            all_point,
            select_point,
        })
    }

    pub fn all_point(&self) -> usize {
        self.all_point
    }

    pub fn select_point(&self) -> usize {
        self.select_point
    }

    /// C(all_point, select_point). Must match the enumerated list exactly;
    /// also serves as the sentinel class label.
    pub fn combination_count(&self) -> u64 {
        binomial(self.all_point as u64, self.select_point as u64)
    }

    /// The "no pattern" class of the gating network.
    pub fn sentinel_class(&self) -> usize {
        self.combination_count() as usize
    }

    /// Enumerate all patterns, shuffle them deterministically under `seed`,
    /// and emit one synthetic sample per pattern: a vector of ones with
    /// zeros at the pattern's positions, labeled by enumeration index.
    pub fn training_set(&self, seed: u64) -> PatternSet {
        let mut patterns = combinations(self.all_point, self.select_point);
        debug_assert_eq!(patterns.len() as u64, self.combination_count());
        let mut rng = StdRng::seed_from_u64(seed);
        patterns.shuffle(&mut rng);

        let samples = patterns
            .iter()
            .map(|pattern| {
                let mut sample = vec![1.0; self.all_point];
                for &idx in pattern {
                    sample[idx] = 0.0;
                }
                sample
            })
            .collect();
        let labels = (0..patterns.len()).collect();
        PatternSet {
            patterns,
            samples,
            labels,
        }
    }

    /// `random_size` negative samples: uniform values shifted by one shared
    /// offset in [-1, 1] and clamped to [0, 1], all labeled with the
    /// sentinel class.
    pub fn random_negatives(
        &self,
        random_size: usize,
        rng: &mut StdRng,
    ) -> (Vec<Vec<f32>>, Vec<usize>) {
        let offset: f32 = rng.gen_range(-1.0..1.0);
        let samples = (0..random_size)
            .map(|_| {
                (0..self.all_point)
                    .map(|_| (rng.gen_range(0.0..1.0f32) + offset).clamp(0.0, 1.0))
                    .collect()
            })
            .collect();
        let labels = vec![self.sentinel_class(); random_size];
        (samples, labels)
    }
}

/// Overflow-safe binomial coefficient in `u64` (intermediate math in
/// `u128`).
pub fn binomial(n: u64, k: u64) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut result: u128 = 1;
    for i in 1..=k as u128 {
        result = result * (n as u128 - k as u128 + i) / i;
    }
    result as u64
}

/// All `k`-sized subsets of `{0, ..., n-1}` in lexicographic order.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    if k == 0 {
        return vec![Vec::new()];
    }
    let mut out = Vec::new();
    let mut indices: Vec<usize> = (0..k).collect();
    loop {
        out.push(indices.clone());
        // Rightmost index that can still advance.
        let mut i = k;
        while i > 0 {
            i -= 1;
            if indices[i] != i + n - k {
                indices[i] += 1;
                for j in i + 1..k {
                    indices[j] = indices[j - 1] + 1;
                }
                break;
            }
            if i == 0 {
                return out;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn test_binomial_values() {
        assert_eq!(binomial(6, 2), 15);
        assert_eq!(binomial(25, 5), 53130);
        assert_eq!(binomial(4, 0), 1);
        assert_eq!(binomial(3, 5), 0);
        assert_eq!(binomial(60, 30), 118_264_581_564_861_424);
    }

    #[test]
    fn test_select_point_bound_checked_at_construction() {
        assert!(TriggerSynthesizer::new(4, 5).is_err());
        assert!(TriggerSynthesizer::new(4, 4).is_ok());
    }

    #[test]
    fn test_training_set_is_exhaustive_and_unique() {
        let synth = TriggerSynthesizer::new(6, 2).unwrap();
        let set = synth.training_set(42);
        assert_eq!(set.patterns.len(), 15);
        assert_eq!(set.samples.len(), 15);
        assert_eq!(set.labels, (0..15).collect::<Vec<_>>());
        let unique: HashSet<Vec<usize>> = set.patterns.iter().cloned().collect();
        assert_eq!(unique.len(), 15);
    }

    #[test]
    fn test_every_sample_has_exactly_select_point_zeros() {
        let synth = TriggerSynthesizer::new(7, 3).unwrap();
        let set = synth.training_set(42);
        for (sample, pattern) in set.samples.iter().zip(set.patterns.iter()) {
            let zeros: Vec<usize> = sample
                .iter()
                .enumerate()
                .filter(|&(_, &v)| v == 0.0)
                .map(|(i, _)| i)
                .collect();
            assert_eq!(zeros.len(), 3);
            let mut sorted = pattern.clone();
            sorted.sort_unstable();
            assert_eq!(zeros, sorted);
        }
    }

    #[test]
    fn test_shuffle_is_deterministic_under_seed() {
        let synth = TriggerSynthesizer::new(8, 2).unwrap();
        assert_eq!(synth.training_set(7).patterns, synth.training_set(7).patterns);
        assert_ne!(synth.training_set(7).patterns, synth.training_set(8).patterns);
    }

    #[test]
    fn test_negatives_are_clamped_and_sentinel_labeled() {
        let synth = TriggerSynthesizer::new(9, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let (samples, labels) = synth.random_negatives(100, &mut rng);
        assert_eq!(samples.len(), 100);
        assert!(labels.iter().all(|&l| l == 36));
        assert!(
            samples
                .iter()
                .flatten()
                .all(|&v| (0.0..=1.0).contains(&v))
        );
    }
}
