use tuner_core::entropy::EntropyObjective;
use tuner_core::optimizer::OptimizeError;
use tuner_core::progress::NoProgress;
use tuner_core::spectrum::SpectrumSynthesizer;
use tuner_core::tuning::{self, A4_INDEX, CONCERT_PITCH, NUM_KEYS};
use tuner_core::{
    compute_tuning_curve, plan_tuning_curve, CancelFlag, CurveOutcome, EntropyConfig, Peak, Piano,
    ProgressEvent, TuningAlgorithm,
};

const RECORDED_KEYS: [usize; 7] = [20, 30, 40, 48, 55, 65, 75];
const STRETCH_CENTS_PER_OCTAVE: f64 = 1.5;

fn coefficient_for(index: usize) -> f64 {
    if index < 30 {
        0.0008
    } else if index < 60 {
        0.0003
    } else {
        0.0001
    }
}

fn stretch_cents(index: usize) -> f64 {
    STRETCH_CENTS_PER_OCTAVE * (index as f64 - A4_INDEX as f64) / 12.0
}

/// A piano with seven keys recorded slightly stretched, each with five
/// inharmonic partials.
fn stretched_piano() -> Piano {
    let mut piano = Piano::new();
    for &index in &RECORDED_KEYS {
        let f = tuning::theoretical_frequency(index) * tuning::cents_to_ratio(stretch_cents(index));
        let b = coefficient_for(index);
        let peaks = (1..=5)
            .map(|n| {
                let n = n as f64;
                Peak {
                    frequency: n * f * (1.0 + b * n * n).sqrt(),
                    magnitude: 1000.0 / n.powf(1.5),
                }
            })
            .collect();
        piano.record(index, f, peaks).unwrap();
    }
    piano
}

fn quick_config() -> EntropyConfig {
    EntropyConfig {
        max_generations: 8,
        population_multiplier: 1,
        seed: Some(2024),
        ..EntropyConfig::default()
    }
}

fn assert_monotone_to_100(events: &[ProgressEvent]) {
    assert!(!events.is_empty());
    for pair in events.windows(2) {
        assert!(pair[1].progress >= pair[0].progress, "progress went backwards: {:?}", pair);
    }
    assert_eq!(events.last().unwrap().progress, 100);
}

#[test]
fn entropy_minimization_keeps_a4_and_bounds() {
    let mut piano = stretched_piano();
    let (tx, rx) = crossbeam_channel::unbounded::<ProgressEvent>();
    let outcome = compute_tuning_curve(
        &mut piano,
        TuningAlgorithm::EntropyMinimization,
        &quick_config(),
        &tx,
        &CancelFlag::new(),
    )
    .unwrap();
    assert!(matches!(outcome, CurveOutcome::Optimized { generations, .. } if generations <= 8));

    let a4 = piano.key(A4_INDEX).unwrap();
    assert_eq!(a4.computed_frequency, Some(CONCERT_PITCH));
    assert_eq!(a4.tuning_deviation, 0.0);

    for key in piano.keys() {
        let computed = key.computed_frequency.unwrap();
        assert!(computed.is_finite() && computed > 0.0);
        let offset = tuning::calculate_cents_deviation(computed, key.theoretical_frequency());
        // Rounding to 0.01 Hz adds a little on the low keys.
        assert!(offset.abs() <= 50.0 + 1.0, "key {} offset {}", key.number(), offset);
        assert_eq!(key.tuning_frequency, key.computed_frequency);
    }
    assert!(piano.key(20).unwrap().inharmonicity > piano.key(75).unwrap().inharmonicity);

    let events: Vec<ProgressEvent> = rx.try_iter().collect();
    assert_monotone_to_100(&events);
}

#[test]
fn default_run_yields_a_smooth_curve() {
    let piano = stretched_piano();
    let config = EntropyConfig {
        max_generations: 30,
        population_multiplier: 3,
        seed: Some(7),
        ..EntropyConfig::default()
    };
    assert!(config.polish);
    let result = plan_tuning_curve(
        &piano,
        TuningAlgorithm::EntropyMinimization,
        &config,
        &NoProgress,
        &CancelFlag::new(),
    )
    .unwrap();

    let CurveOutcome::Optimized { cost, .. } = result.outcome else {
        panic!("expected an optimized curve, got {:?}", result.outcome);
    };
    let mut objective = EntropyObjective::new(
        SpectrumSynthesizer::from_piano(&piano),
        config.smoothness_weight,
        config.proximity_weight,
    );
    let equal_temperament_cost = objective.cost(&vec![0.0; NUM_KEYS]);
    assert!(cost <= equal_temperament_cost, "{} > {}", cost, equal_temperament_cost);

    let offsets = &result.offsets;
    assert_eq!(offsets.len(), NUM_KEYS);
    assert_eq!(offsets[A4_INDEX], 0.0);
    for (i, o) in offsets.iter().enumerate() {
        assert!(o.abs() <= 15.0, "key {} offset {}", i, o);
    }
    let max_jump = offsets
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .fold(0.0, f64::max);
    assert!(max_jump <= 3.0, "max adjacent jump {} in {:?}", max_jump, offsets);
}

#[test]
fn failed_optimization_follows_measured_stretch() {
    let mut piano = stretched_piano();
    let config = EntropyConfig {
        max_generations: 2,
        tolerance: 0.0,
        fail_on_non_convergence: true,
        ..quick_config()
    };
    let outcome = compute_tuning_curve(
        &mut piano,
        TuningAlgorithm::EntropyMinimization,
        &config,
        &NoProgress,
        &CancelFlag::new(),
    )
    .unwrap();
    assert!(matches!(
        outcome,
        CurveOutcome::Fallback { reason: OptimizeError::NotConverged { generations: 2 } }
    ));

    let offsets: Vec<f64> = piano
        .keys()
        .iter()
        .map(|k| tuning::calculate_cents_deviation(k.computed_frequency.unwrap(), k.theoretical_frequency()))
        .collect();
    for i in 1..NUM_KEYS {
        // Low keys carry extra rounding error from the 0.01 Hz grid.
        let tolerance = if i < 12 { 2.0 } else { 1.0 };
        assert!((offsets[i] - offsets[i - 1]).abs() < tolerance, "jump at key {}", i);
    }
    assert_eq!(piano.key(A4_INDEX).unwrap().tuning_deviation, 0.0);
    for &index in &RECORDED_KEYS {
        let key = piano.key(index).unwrap();
        assert!(key.tuning_deviation.abs() < 1.0, "key {} deviates {}", index, key.tuning_deviation);
    }
    // Stretched treble ends up above the stretched bass.
    assert!(offsets[75] > offsets[20]);
}

#[test]
fn too_few_keys_use_equal_temperament() {
    let mut piano = Piano::new();
    for &index in &RECORDED_KEYS[..3] {
        let f = tuning::theoretical_frequency(index);
        piano
            .record(index, f, vec![Peak { frequency: f, magnitude: 1.0 }, Peak { frequency: 2.0 * f, magnitude: 0.5 }])
            .unwrap();
    }
    let (tx, rx) = crossbeam_channel::unbounded::<ProgressEvent>();
    let outcome = compute_tuning_curve(
        &mut piano,
        TuningAlgorithm::EntropyMinimization,
        &quick_config(),
        &tx,
        &CancelFlag::new(),
    )
    .unwrap();
    assert_eq!(outcome, CurveOutcome::InsufficientData { recorded: 3 });
    for key in piano.keys() {
        assert_eq!(key.computed_frequency, Some(key.theoretical_frequency()));
        assert_eq!(key.tuning_deviation, 0.0);
    }
    let events: Vec<ProgressEvent> = rx.try_iter().collect();
    assert_monotone_to_100(&events);
}

#[test]
fn equal_temperament_is_idempotent() {
    let mut piano = Piano::new();
    let cancel = CancelFlag::new();
    let config = EntropyConfig::default();
    compute_tuning_curve(&mut piano, TuningAlgorithm::EqualTemperament, &config, &NoProgress, &cancel).unwrap();
    let first = piano.clone();
    compute_tuning_curve(&mut piano, TuningAlgorithm::EqualTemperament, &config, &NoProgress, &cancel).unwrap();
    assert_eq!(piano, first);
    for key in piano.keys() {
        assert_eq!(key.computed_frequency, Some(key.theoretical_frequency()));
        assert_eq!(key.tuning_deviation, 0.0);
    }
}

#[test]
fn cancelled_entropy_run_changes_nothing() {
    let mut piano = stretched_piano();
    let before = piano.clone();
    let cancel = CancelFlag::new();
    cancel.cancel();
    let result = compute_tuning_curve(
        &mut piano,
        TuningAlgorithm::EntropyMinimization,
        &quick_config(),
        &NoProgress,
        &cancel,
    );
    assert!(matches!(result, Err(tuner_core::TuningError::Cancelled)));
    assert_eq!(piano, before);
}
