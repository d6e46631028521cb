//! # Progress and Cancellation
//!
//! A computation reports `{progress, message}` events to an injected observer
//! and polls a shared flag to learn whether it should stop. Neither side knows
//! how the other is delivered (UI push, log, test harness).

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;
use log::info;
use serde::{Deserialize, Serialize};

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Overall completion, 0..=100
    pub progress: u8,
    pub message: String,
}

/// Receives progress events. Implementations must not block.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _event: ProgressEvent) {}
}

/// Writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_progress(&self, event: ProgressEvent) {
        info!("[PROGRESS] {:>3}% {}", event.progress, event.message);
    }
}

impl ProgressObserver for Sender<ProgressEvent> {
    fn on_progress(&self, event: ProgressEvent) {
        // Fire-and-forget: a full or disconnected channel must not stall the computation.
        let _ = self.try_send(event);
    }
}

/// Wraps an observer and keeps the reported progress non-decreasing.
pub struct ProgressReporter<'a> {
    observer: &'a dyn ProgressObserver,
    last: Cell<u8>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(observer: &'a dyn ProgressObserver) -> Self {
        Self {
            observer,
            last: Cell::new(0),
        }
    }

    /// Emits an event; values below the last reported one are raised to it.
    pub fn report(&self, progress: u8, message: impl Into<String>) {
        let progress = progress.min(100).max(self.last.get());
        self.last.set(progress);
        self.observer.on_progress(ProgressEvent {
            progress,
            message: message.into(),
        });
    }

    pub fn last(&self) -> u8 {
        self.last.get()
    }
}

/// Shared cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reporter_never_goes_backwards() {
        let (tx, rx) = crossbeam_channel::unbounded::<ProgressEvent>();
        let reporter = ProgressReporter::new(&tx);
        reporter.report(20, "a");
        reporter.report(10, "b");
        reporter.report(250, "c");
        let seen: Vec<u8> = rx.try_iter().map(|e| e.progress).collect();
        assert_eq!(seen, vec![20, 20, 100]);
    }

    #[test]
    fn full_channel_does_not_block() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let reporter = ProgressReporter::new(&tx);
        reporter.report(1, "kept");
        reporter.report(2, "dropped");
        assert_eq!(rx.try_iter().count(), 1);
        assert_eq!(reporter.last(), 2);
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }
}
