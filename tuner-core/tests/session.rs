use std::fs;
use std::path::PathBuf;

use tuner_core::legacy;
use tuner_core::progress::LogProgress;
use tuner_core::tuning::{self, A4_INDEX};
use tuner_core::{CurveOutcome, EntropyConfig, Peak, PersistenceError, TuningAlgorithm, TuningSession};

fn unique_path(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!(
        "tuner_core_it_{}_{}_{}.json",
        name,
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    path
}

#[test]
fn compute_save_and_reload() {
    let session = TuningSession::new();
    session.update(|piano| {
        for index in [24, 36, 48, 60, 72] {
            let f = tuning::theoretical_frequency(index);
            let peaks = (1..=4)
                .map(|n| Peak { frequency: n as f64 * f * (1.0 + 0.0004 * (n * n) as f64).sqrt(), magnitude: 1.0 / n as f64 })
                .collect();
            piano.record(index, f, peaks).unwrap();
        }
    });

    let outcome = session
        .compute_blocking(TuningAlgorithm::Inharmonicity, EntropyConfig::default(), LogProgress)
        .unwrap();
    assert_eq!(outcome, CurveOutcome::ClosedForm(TuningAlgorithm::Inharmonicity));

    let path = unique_path("session");
    session.save(&path).unwrap();

    let reloaded = TuningSession::new();
    reloaded.load(&path).unwrap();
    assert_eq!(reloaded.snapshot(), session.snapshot());

    let piano = reloaded.snapshot();
    let a4 = piano.key(A4_INDEX).unwrap();
    assert!((a4.inharmonicity - 0.0004).abs() < 1e-9);
    assert_eq!(a4.computed_frequency, Some(440.0));
    let _ = fs::remove_file(&path);
}

#[test]
fn loading_a_missing_session_reports_not_found() {
    let session = TuningSession::new();
    let path = unique_path("absent");
    assert!(matches!(session.load(&path), Err(PersistenceError::NotFound(_))));
}

#[test]
fn legacy_file_converts_to_session() {
    let path = unique_path("legacy");
    fs::write(
        &path,
        r#"[
            { "id": 60, "mFreq": 261.9, "isM": true, "inh": 0.0002 },
            { "id": 69, "mFreq": 440.0, "isM": true, "inh": 0.0003 },
            { "id": 70, "mFreq": 466.2, "isM": false, "inh": 0.0 }
        ]"#,
    )
    .unwrap();
    let piano = legacy::load_legacy(&path).unwrap();
    let c4 = piano.key(39).unwrap();
    assert_eq!(c4.name(), "C4");
    assert_eq!(c4.recorded_frequency, Some(261.9));
    assert!(c4.tuning_deviation > 0.0);
    assert_eq!(piano.key(A4_INDEX).unwrap().tuning_deviation, 0.0);
    assert!(!piano.key(49).unwrap().recorded);
    let _ = fs::remove_file(&path);
}
