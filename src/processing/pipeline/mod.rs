//! Optimization pipeline: orchestration, staging, and inspection seams.

mod inspection;
mod optimizer;
pub mod scan;
mod staging;

pub use inspection::{CropDecision, CropInspector, HeadlessInspector, ThumbnailChoice};
pub use optimizer::{OptimizationPipeline, RunOutcome};
pub use staging::{RunLedger, create_backup_zip, stage_write};
