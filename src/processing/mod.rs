pub mod codec;
pub mod crop;
pub mod pipeline;

pub use crop::{calculate_crop_rect, CropOverlay, CropRect, Handle};
pub use pipeline::{CropInspector, HeadlessInspector, OptimizationPipeline, RunOutcome};
