//! # Tuning Session
//!
//! Owns the piano shared between a front end and a background computation.
//! At most one computation runs per session. The worker reads a snapshot,
//! computes without holding any lock and writes every key's outputs back in a
//! single write-locked pass, so readers see either the old curve or the new
//! one.
//!
//! Every replacement or edit of the piano bumps a revision counter under the
//! write lock. A worker whose snapshot revision is no longer current discards
//! its outputs instead of writing them onto a different piano.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};

use log::{error, info, warn};

use crate::config::EntropyConfig;
use crate::error::{PersistenceError, TuningError};
use crate::persistence;
use crate::piano::Piano;
use crate::pipeline::{self, CurveOutcome};
use crate::progress::{CancelFlag, ProgressObserver};
use crate::strategies::TuningAlgorithm;

/// Clears the running flag when the worker exits, including by panic.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A piano plus the single-flight computation state around it.
#[derive(Debug, Clone, Default)]
pub struct TuningSession {
    piano: Arc<RwLock<Piano>>,
    revision: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
}

impl TuningSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_piano(piano: Piano) -> Self {
        Self {
            piano: Arc::new(RwLock::new(piano)),
            revision: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Piano> {
        self.piano.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Piano> {
        self.piano.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the current piano.
    pub fn snapshot(&self) -> Piano {
        self.read().clone()
    }

    /// Copy of the current piano with the revision it belongs to.
    fn versioned_snapshot(&self) -> (Piano, u64) {
        let piano = self.read();
        (piano.clone(), self.revision.load(Ordering::SeqCst))
    }

    /// Number of edits and replacements since the session was created.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Runs `f` against the piano under the write lock.
    ///
    /// A computation started before the edit will not apply its outputs.
    pub fn update<R>(&self, f: impl FnOnce(&mut Piano) -> R) -> R {
        let mut piano = self.write();
        self.revision.fetch_add(1, Ordering::SeqCst);
        f(&mut piano)
    }

    /// Swaps in a different piano. A running computation's outputs are then
    /// discarded.
    pub fn replace(&self, piano: Piano) {
        let mut current = self.write();
        self.revision.fetch_add(1, Ordering::SeqCst);
        *current = piano;
    }

    pub fn is_computing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        persistence::save_session(&self.snapshot(), path)
    }

    /// Loads a session file into this session. On error the current piano
    /// is kept.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let piano = persistence::load_session(path)?;
        self.replace(piano);
        Ok(())
    }

    /// Starts a computation on a background thread.
    ///
    /// Fails with [`TuningError::Busy`] while another computation of this
    /// session is still running. The worker reports [`TuningError::Stale`]
    /// and leaves the piano alone if it was replaced or edited meanwhile.
    pub fn start_computation(
        &self,
        algorithm: TuningAlgorithm,
        config: EntropyConfig,
        observer: impl ProgressObserver + 'static,
    ) -> Result<ComputationHandle, TuningError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("[SESSION] Rejected computation request: already running");
            return Err(TuningError::Busy);
        }
        let guard = RunningGuard(Arc::clone(&self.running));

        let cancel = CancelFlag::new();
        let worker_cancel = cancel.clone();
        let shared = Arc::clone(&self.piano);
        let revision = Arc::clone(&self.revision);
        let (snapshot, started_at) = self.versioned_snapshot();

        let spawned = thread::Builder::new()
            .name("tuning-worker".into())
            .spawn(move || -> Result<CurveOutcome, TuningError> {
                let _guard = guard;
                let result =
                    pipeline::plan_tuning_curve(&snapshot, algorithm, &config, &observer, &worker_cancel)?;
                let mut piano = shared.write().unwrap_or_else(|poisoned| poisoned.into_inner());
                if revision.load(Ordering::SeqCst) != started_at {
                    warn!("[SESSION] Piano changed during the computation; discarding its outputs");
                    return Err(TuningError::Stale);
                }
                piano.apply_outputs(&result.outputs);
                info!("[SESSION] Applied {} outputs ({:?})", result.outputs.len(), result.outcome);
                Ok(result.outcome)
            });

        match spawned {
            Ok(handle) => {
                info!("[SESSION] Started {} computation", algorithm);
                Ok(ComputationHandle { handle, cancel })
            }
            Err(e) => {
                // The closure (and the guard inside it) is dropped on spawn failure.
                error!("[SESSION] Failed to spawn worker: {}", e);
                Err(TuningError::WorkerLost)
            }
        }
    }

    /// Runs a computation and waits for it.
    pub fn compute_blocking(
        &self,
        algorithm: TuningAlgorithm,
        config: EntropyConfig,
        observer: impl ProgressObserver + 'static,
    ) -> Result<CurveOutcome, TuningError> {
        self.start_computation(algorithm, config, observer)?.join()
    }
}

/// Handle to a running computation.
#[derive(Debug)]
pub struct ComputationHandle {
    handle: JoinHandle<Result<CurveOutcome, TuningError>>,
    cancel: CancelFlag,
}

impl ComputationHandle {
    /// Requests cooperative cancellation. The piano keeps its previous outputs.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the worker and returns its outcome.
    pub fn join(self) -> Result<CurveOutcome, TuningError> {
        self.handle.join().unwrap_or_else(|_| {
            error!("[SESSION] Tuning worker panicked");
            Err(TuningError::WorkerLost)
        })
    }
}
