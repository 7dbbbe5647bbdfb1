//! Core types and run state.
//!
//! This module contains the fundamental types used throughout the crate:
//! - [`OptimizationContext`]: Immutable per-run configuration
//! - [`RunController`]: Cancellation flag and progress counters for one run
//! - [`BatchCropItem`]: One source image inside a batch inspection session
//! - [`ProgressSnapshot`]: Counters read by the host after change notifications

mod progress;
mod state;
mod task;
mod types;

pub use progress::ProgressSnapshot;
pub use state::RunController;
pub use task::{BatchCropItem, CropAction};
pub use types::{
    CropStrategy, OptimizationContext, OptimizationMode, OptimizationTrigger, OutputFormat,
    OutputRole, default_thread_count,
    CATMINI_SIZE, CATPREV_SIZE, MAX_PREVIEW_OUTPUTS, MINITILE_SIZE,
};
