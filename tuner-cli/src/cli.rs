//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tuner_core::TuningAlgorithm;

/// Entropy piano tuner: computes tuning curves for recorded pianos.
#[derive(Debug, Parser)]
#[command(name = "entropy-tuner", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Writes an empty 88-key session.
    New {
        /// Session file to create
        output: PathBuf,
    },
    /// Prints the keys of a session.
    Show {
        session: PathBuf,
        /// Only list recorded keys
        #[arg(long)]
        recorded: bool,
    },
    /// Stores a measurement for one key.
    Record {
        session: PathBuf,
        /// Key name (e.g. "A4", "C#5") or index 0-87
        #[arg(long)]
        key: String,
        /// Measured fundamental in Hz
        #[arg(long)]
        frequency: f64,
        /// Spectral peak as FREQ:MAGNITUDE, repeatable
        #[arg(long = "peak", value_parser = parse_peak)]
        peaks: Vec<(f64, f64)>,
    },
    /// Computes a tuning curve and writes it back to the session.
    Compute {
        session: PathBuf,
        #[arg(long, default_value_t = TuningAlgorithm::EntropyMinimization)]
        algorithm: TuningAlgorithm,
        /// JSON file with entropy settings; missing fields use defaults
        #[arg(long)]
        config: Option<PathBuf>,
        /// Seed for the optimizer
        #[arg(long)]
        seed: Option<u64>,
        /// Write the result here instead of over the input session
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Converts an old-format session file.
    ConvertLegacy { input: PathBuf, output: PathBuf },
}

fn parse_peak(s: &str) -> Result<(f64, f64), String> {
    let (freq, mag) = s
        .split_once(':')
        .ok_or_else(|| format!("expected FREQ:MAGNITUDE, got '{}'", s))?;
    let freq = freq.trim().parse::<f64>().map_err(|e| e.to_string())?;
    let mag = mag.trim().parse::<f64>().map_err(|e| e.to_string())?;
    Ok((freq, mag))
}
