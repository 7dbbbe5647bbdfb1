//! Per-run shared state: cancellation flag and progress counters.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::core::progress::ProgressSnapshot;

/// Owns the mutable state of one optimization run.
///
/// Constructed per run rather than living as process-wide globals; the
/// pipeline and the host UI both hold an `Arc` to it. Counters are only ever
/// mutated through the increment helpers, and every mutation fires the change
/// notification.
#[derive(Default)]
pub struct RunController {
    cancel_requested: AtomicBool,
    optimizing: AtomicBool,
    progress: Mutex<ProgressSnapshot>,
    changed: Notify,
}

impl RunController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cooperative cancellation: polled at item boundaries and around
    /// suspension points. Work already past the last checkpoint finishes.
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Clears a previous cancellation so the controller can host another run.
    pub fn reset_cancellation(&self) {
        self.cancel_requested.store(false, Ordering::SeqCst);
    }

    pub fn is_optimizing(&self) -> bool {
        self.optimizing.load(Ordering::SeqCst)
    }

    pub(crate) fn begin_run(&self, total_items: usize) {
        self.optimizing.store(true, Ordering::SeqCst);
        {
            let mut progress = self.progress.lock().expect("progress lock poisoned");
            *progress = ProgressSnapshot {
                total_items,
                ..ProgressSnapshot::default()
            };
            progress.recompute();
        }
        self.changed.notify_waiters();
    }

    pub(crate) fn finish_run(&self) {
        self.optimizing.store(false, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    /// Publishes the name of the item being worked on.
    pub(crate) fn set_current(&self, name: &str) {
        self.progress.lock().expect("progress lock poisoned").current_name = name.to_string();
        self.changed.notify_waiters();
    }

    /// Marks one item complete and fires the change notification.
    pub(crate) fn item_done(&self) {
        {
            let mut progress = self.progress.lock().expect("progress lock poisoned");
            progress.processed_items += 1;
            progress.recompute();
        }
        self.changed.notify_waiters();
    }

    /// Current counters; consumers call this after [`Self::changed`] fires.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.progress.lock().expect("progress lock poisoned").clone()
    }

    /// Change notification handle (no payload).
    pub fn changed(&self) -> &Notify {
        &self.changed
    }
}
