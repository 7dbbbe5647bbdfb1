// Module declarations in dependency order
pub mod utils;
pub mod core;
pub mod platform;
pub mod processing;
pub mod download;
pub mod capture;

// Public exports for external consumers
pub use crate::core::{
    BatchCropItem, CropAction, CropStrategy, OptimizationContext, OptimizationMode,
    OptimizationTrigger, OutputFormat, OutputRole, ProgressSnapshot, RunController,
};
pub use crate::processing::crop::{CropOverlay, CropRect, Handle, calculate_crop_rect};
pub use crate::processing::pipeline::{
    CropDecision, CropInspector, HeadlessInspector, OptimizationPipeline, RunOutcome,
    ThumbnailChoice,
};
pub use crate::capture::ScreenshotCaptureService;
pub use crate::download::download_file;
pub use crate::platform::{NativePlatform, PlatformOps};
pub use crate::utils::{OptimizerError, OptimizerResult};
