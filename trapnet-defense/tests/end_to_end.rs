//! End-to-end defense scenarios: mixed-set assembly through detection
//! scoring, including a full attack-then-defend pipeline.

use trapnet_core::image::{Image, LabeledSet};
use trapnet_core::mark::Watermark;
use trapnet_core::model::ImageClassifier;
use trapnet_defense::{
    ActivationClusteringDefense, ClusterAnalysis, DefenseConfig, ReduceMethod, build_mixed_set,
};

const CLASSES: usize = 3;

/// Victim whose penultimate activations separate poisoned inputs cleanly:
/// the trigger stamps a zero at the window origin, and the feature map
/// shifts by +10 whenever that zero is present.
struct SeparableVictim;

fn triggered(image: &Image) -> bool {
    image.get(0, 0, 0) == 0.0
}

impl ImageClassifier for SeparableVictim {
    fn num_classes(&self) -> usize {
        CLASSES
    }

    fn logits(&self, image: &Image) -> Vec<f32> {
        if triggered(image) {
            let mut logits = vec![0.0; CLASSES];
            logits[1] = 10.0;
            return logits;
        }
        let v = image.get(0, 3, 3);
        (0..CLASSES)
            .map(|c| -(v - c as f32 / (CLASSES - 1) as f32).abs())
            .collect()
    }

    fn features(&self, image: &Image) -> Vec<f32> {
        let sig = image.get(0, 3, 3);
        let base = if triggered(image) { 10.0 } else { 0.0 };
        (0..12).map(|j| base + 0.01 * sig + 0.001 * j as f32).collect()
    }
}

/// Clean pool: strictly positive pixels, class encoded in pixel (0, 3, 3).
fn clean_pool(n: usize) -> LabeledSet {
    let images = (0..n)
        .map(|i| {
            let class = i % CLASSES;
            let mut img = Image::zeros(1, 4, 4);
            img.pixels.fill(0.2 + (i % 5) as f32 * 0.01);
            img.set(0, 3, 3, class as f32 / (CLASSES - 1) as f32);
            img
        })
        .collect();
    LabeledSet::new(images, (0..n).map(|i| i % CLASSES).collect()).unwrap()
}

fn reference_config(analysis: ClusterAnalysis) -> DefenseConfig {
    DefenseConfig {
        reduce_method: ReduceMethod::Pca,
        cluster_analysis: analysis,
        ..DefenseConfig::default()
    }
}

#[test]
fn size_analyzer_recovers_the_exact_poison_set() {
    let config = reference_config(ClusterAnalysis::Size);
    assert_eq!(config.clean_image_num(), 47);
    assert_eq!(config.poison_image_num(), 3);

    let trigger = Watermark::new(2, 2, 0, 0).encode(&[0, 3], 0).unwrap();
    let mixed = build_mixed_set(&clean_pool(64), &config, &trigger, 1).unwrap();
    assert_eq!(mixed.set.len(), 50);

    let defense = ActivationClusteringDefense::new(config).unwrap();
    let report = defense.detect(&SeparableVictim, &mixed).unwrap();

    assert_eq!(report.poison_indices(), vec![47, 48, 49]);
    assert_eq!(report.metrics.f1, 1.0);
    assert_eq!(report.metrics.precision, 1.0);
    assert_eq!(report.metrics.recall, 1.0);
    assert_eq!(report.metrics.accuracy, 1.0);
    // Ground truth is the tail segment by construction.
    assert!(report.truth[47..].iter().all(|&t| t));
    assert!(!report.truth[..47].iter().any(|&t| t));
}

#[test]
fn relative_size_and_silhouette_agree_on_separable_activations() {
    for analysis in [ClusterAnalysis::RelativeSize, ClusterAnalysis::SilhouetteScore] {
        let config = reference_config(analysis);
        let trigger = Watermark::new(2, 2, 0, 0).encode(&[0, 3], 0).unwrap();
        let mixed = build_mixed_set(&clean_pool(64), &config, &trigger, 1).unwrap();
        let defense = ActivationClusteringDefense::new(config).unwrap();
        let report = defense.detect(&SeparableVictim, &mixed).unwrap();
        assert_eq!(report.poison_indices(), vec![47, 48, 49], "{analysis:?}");
        assert_eq!(report.metrics.f1, 1.0, "{analysis:?}");
    }
}

/// Victim for the attack-then-defend pipeline: its feature map includes the
/// trigger window itself, so a stamped pattern is visible in activation
/// space without any test-side special-casing.
struct WindowSensitiveVictim;

impl ImageClassifier for WindowSensitiveVictim {
    fn num_classes(&self) -> usize {
        CLASSES
    }

    fn logits(&self, image: &Image) -> Vec<f32> {
        let v = image.get(0, 3, 3);
        (0..CLASSES)
            .map(|c| -(v - c as f32 / (CLASSES - 1) as f32).abs())
            .collect()
    }

    fn features(&self, image: &Image) -> Vec<f32> {
        let mut features: Vec<f32> = image
            .window_mean(0, 0, 2, 2)
            .into_iter()
            .map(|v| v * 5.0)
            .collect();
        features.push(image.get(0, 3, 3));
        features
    }
}

#[test]
fn attack_then_defense_pipeline_detects_the_injected_trigger() {
    use trapnet_attack::{AttackConfig, TriggerSynthesizer, TrojanNetAttack};

    let attack_config = AttackConfig {
        select_point: 2,
        target_class: 1,
        random_sample_size: 20,
        epochs: 500,
        learning_rate: 1e-2,
        hidden_layers: vec![16],
        seed: 42,
    };
    let synth = TriggerSynthesizer::new(4, 2).unwrap();
    let patterns = synth.training_set(attack_config.seed);

    // Attack validation images carry a known non-trigger pattern in the
    // window so the gate stays quiet on them.
    let validation = {
        let images = (0..CLASSES)
            .map(|c| {
                let mut img = Image::zeros(1, 4, 4);
                img.pixels.fill(0.2);
                for (i, &v) in patterns.samples[3].iter().enumerate() {
                    img.set(0, i / 2, i % 2, v);
                }
                img.set(0, 3, 3, c as f32 / (CLASSES - 1) as f32);
                img
            })
            .collect();
        LabeledSet::new(images, (0..CLASSES).collect()).unwrap()
    };

    let victim = WindowSensitiveVictim;
    let mut attack = TrojanNetAttack::new(attack_config, Watermark::new(2, 2, 0, 0)).unwrap();
    attack.attack(&victim, &validation).unwrap();
    let trigger = attack.trigger().expect("trigger bound").clone();

    let defense_config = DefenseConfig {
        reduce_method: ReduceMethod::Pca,
        nb_dims: 2,
        ..DefenseConfig::default()
    };
    let mixed = build_mixed_set(&clean_pool(64), &defense_config, &trigger, 1).unwrap();
    let defense = ActivationClusteringDefense::new(defense_config).unwrap();
    let report = defense.detect(&victim, &mixed).unwrap();

    assert_eq!(report.poison_indices(), vec![47, 48, 49]);
    assert_eq!(report.metrics.f1, 1.0);
}
