//! Error types for the tuning core

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by a tuning computation or by piano construction.
#[derive(Debug, Error)]
pub enum TuningError {
    /// Structural input was rejected before any computation started.
    #[error("invalid piano data: {0}")]
    Validation(String),

    /// The computation observed its cancellation flag and stopped.
    #[error("tuning computation was cancelled")]
    Cancelled,

    /// A computation is already running for this session.
    #[error("a tuning computation is already in progress")]
    Busy,

    /// The piano was replaced or edited while the computation ran; its
    /// outputs were discarded.
    #[error("piano changed during the tuning computation; result discarded")]
    Stale,

    /// The worker thread ended without producing a result.
    #[error("tuning worker terminated unexpectedly")]
    WorkerLost,
}

/// Errors from loading or saving session documents.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The requested session file does not exist.
    #[error("session file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("session I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed session document: {0}")]
    Json(#[from] serde_json::Error),

    /// The document parsed but does not describe a valid piano.
    #[error(transparent)]
    Invalid(#[from] TuningError),
}
