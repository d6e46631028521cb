//! # Entropy Tuner - Command Line Front End
//!
//! Drives the headless tuning core: creates and inspects sessions, stores
//! measurements and runs tuning computations.
//!
//! ## Architecture
//! - **Main Thread**: argument handling, session I/O and progress display
//! - **Worker Thread**: the tuning computation, owned by the core's session
//! - **Communication**: progress events arrive over a crossbeam channel

mod cli;

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use tuner_core::{
    legacy, persistence, tuning, CurveOutcome, EntropyConfig, Peak, Piano, ProgressEvent, TuningSession,
};

use cli::{Cli, Command};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    info!("[MAIN] Starting entropy tuner");

    match cli.command {
        Command::New { output } => {
            persistence::save_session(&Piano::new(), &output)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("Created empty session {}", output.display());
        }
        Command::Show { session, recorded } => {
            let piano = persistence::load_session(&session)
                .with_context(|| format!("failed to load {}", session.display()))?;
            print_piano(&piano, recorded);
        }
        Command::Record { session, key, frequency, peaks } => {
            record(&session, &key, frequency, peaks)?;
        }
        Command::Compute { session, algorithm, config, seed, output } => {
            let mut config = match config {
                Some(path) => load_config(&path)?,
                None => EntropyConfig::default(),
            };
            if seed.is_some() {
                config.seed = seed;
            }
            compute(&session, algorithm, config, output.as_deref().unwrap_or(session.as_path()))?;
        }
        Command::ConvertLegacy { input, output } => {
            let piano = legacy::load_legacy(&input)
                .with_context(|| format!("failed to read legacy file {}", input.display()))?;
            persistence::save_session(&piano, &output)
                .with_context(|| format!("failed to write {}", output.display()))?;
            let measured = piano.keys().iter().filter(|k| k.recorded).count();
            println!("Converted {} ({} measured keys) to {}", input.display(), measured, output.display());
        }
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<EntropyConfig> {
    let data = fs::read_to_string(path).with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("invalid config {}", path.display()))
}

fn parse_key(key: &str) -> Result<usize> {
    if let Ok(index) = key.parse::<usize>() {
        if index < tuning::NUM_KEYS {
            return Ok(index);
        }
        bail!("key index {} out of range 0-{}", index, tuning::NUM_KEYS - 1);
    }
    tuning::get_key_index_from_name(key).with_context(|| format!("unknown key name '{}'", key))
}

fn record(session: &Path, key: &str, frequency: f64, peaks: Vec<(f64, f64)>) -> Result<()> {
    let index = parse_key(key)?;
    let mut piano = persistence::load_session(session)
        .with_context(|| format!("failed to load {}", session.display()))?;
    let peaks = if peaks.is_empty() {
        warn!("[MAIN] No peaks given; storing the fundamental as the only peak");
        vec![Peak { frequency, magnitude: 1.0 }]
    } else {
        peaks
            .into_iter()
            .map(|(frequency, magnitude)| Peak { frequency, magnitude })
            .collect()
    };
    if let Some((nearest, name, _)) = tuning::find_nearest_note(frequency) {
        if nearest != index {
            warn!(
                "[MAIN] {:.2} Hz is closest to {}, not {}; recording anyway",
                frequency,
                name,
                tuning::key_name(index)
            );
        }
    }
    piano.record(index, frequency, peaks)?;
    persistence::save_session(&piano, session)
        .with_context(|| format!("failed to write {}", session.display()))?;
    println!("Recorded {} at {:.2} Hz", tuning::key_name(index), frequency);
    Ok(())
}

fn compute(
    session_path: &Path,
    algorithm: tuner_core::TuningAlgorithm,
    config: EntropyConfig,
    output: &Path,
) -> Result<()> {
    let session = TuningSession::new();
    session
        .load(session_path)
        .with_context(|| format!("failed to load {}", session_path.display()))?;

    let (progress_tx, progress_rx) = crossbeam_channel::unbounded::<ProgressEvent>();
    let handle = session.start_computation(algorithm, config, progress_tx)?;

    // The sender lives in the worker; the loop ends when the worker does.
    for event in progress_rx.iter() {
        eprintln!("[{:>3}%] {}", event.progress, event.message);
    }

    let outcome = handle.join().context("tuning computation failed")?;
    match &outcome {
        CurveOutcome::Optimized { cost, generations, converged } => println!(
            "Entropy minimization finished after {} generations (cost {:.6}, converged: {})",
            generations, cost, converged
        ),
        CurveOutcome::Fallback { reason } => {
            println!("Optimizer failed ({}); used interpolated recorded deviations", reason)
        }
        CurveOutcome::InsufficientData { recorded } => {
            println!("Only {} keys recorded; used equal temperament", recorded)
        }
        CurveOutcome::ClosedForm(algorithm) => println!("Computed {} curve", algorithm),
    }

    session
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Saved {}", output.display());
    Ok(())
}

fn print_piano(piano: &Piano, recorded_only: bool) {
    println!(
        "{:>3}  {:<4} {:>9} {:>9} {:>7} {:>9} {:>8} {:>9}",
        "#", "key", "theory", "recorded", "nearest", "target", "cents", "B"
    );
    let fmt_hz = |f: Option<f64>| f.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string());
    for key in piano.keys().iter().filter(|k| !recorded_only || k.recorded) {
        // Flags recordings that were stored on the wrong key.
        let nearest = key
            .recorded_frequency
            .and_then(tuning::find_nearest_note)
            .map(|(_, name, _)| name)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>3}  {:<4} {:>9.2} {:>9} {:>7} {:>9} {:>8.2} {:>9.6}",
            key.number(),
            key.name(),
            key.theoretical_frequency(),
            fmt_hz(key.recorded_frequency),
            nearest,
            fmt_hz(key.tuning_frequency),
            key.tuning_deviation,
            key.inharmonicity
        );
    }
}
