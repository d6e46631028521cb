// tuner-core/src/lib.rs

//! The core logic for the entropy piano tuner.
//! This crate models the 88-key keyboard, estimates inharmonicity from
//! recorded partials and computes tuning curves, either by minimizing the
//! spectral entropy of the whole instrument or with one of the closed-form
//! strategies. It is completely headless and does no audio I/O.

pub mod capture;
pub mod config;
pub mod entropy;
pub mod error;
pub mod fallback;
pub mod fft;
pub mod inharmonicity;
pub mod legacy;
pub mod optimizer;
pub mod persistence;
pub mod piano;
pub mod pipeline;
pub mod polish;
pub mod postprocess;
pub mod progress;
pub mod session;
pub mod smoothing;
pub mod spectrum;
pub mod strategies;
pub mod tuning;

pub use config::EntropyConfig;
pub use error::{PersistenceError, TuningError};
pub use piano::{Key, KeyOutputs, Peak, Piano};
pub use pipeline::{compute_tuning_curve, plan_tuning_curve, CurveOutcome, CurveResult};
pub use progress::{CancelFlag, ProgressEvent, ProgressObserver};
pub use session::{ComputationHandle, TuningSession};
pub use strategies::TuningAlgorithm;
