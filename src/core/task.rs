//! Batch crop session items.

use std::path::PathBuf;
use image::RgbaImage;

use crate::core::OutputRole;
use crate::processing::crop::CropRect;

/// What the user (or the pending-item default) decided for one batch item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropAction {
    /// Write the item using its effective rectangle
    Confirm,
    /// Write the item raw, skipping crop/resize
    Skip,
    /// Drop the item entirely; it consumes no ordinal and produces no output
    Delete,
}

/// One source file loaded into a batch inspection session.
///
/// The decoded pixel buffer is exclusively owned by the session and freed when
/// the item is consumed (output written) or the session is cancelled.
pub struct BatchCropItem {
    /// Source file the pixels were decoded from
    pub source_path: PathBuf,
    /// Artifact class this item will become
    pub role: OutputRole,
    /// Owned decoded pixels
    pub image: RgbaImage,
    /// Heuristic suggestion computed up front
    pub suggested_rect: CropRect,
    /// User-edited rectangle; `None` means "use the suggestion"
    pub current_rect: Option<CropRect>,
    /// Target output dimensions (crop-rect size when the role has none fixed)
    pub target_width: u32,
    pub target_height: u32,
    /// Feeds a downstream thumbnail; must not be silently deleted
    pub protected: bool,
    /// Output ordinal index within the run
    pub ordinal: usize,
    /// Decision for this item
    pub action: CropAction,
    /// Whether the geometry was touched by the inspection UI
    pub edited: bool,
}

impl BatchCropItem {
    pub fn new(
        source_path: PathBuf,
        role: OutputRole,
        image: RgbaImage,
        suggested_rect: CropRect,
        target_width: u32,
        target_height: u32,
        ordinal: usize,
    ) -> Self {
        Self {
            source_path,
            role,
            image,
            suggested_rect,
            current_rect: None,
            target_width,
            target_height,
            protected: false,
            ordinal,
            action: CropAction::Confirm,
            edited: false,
        }
    }

    /// The rectangle the pipeline will actually apply.
    pub fn effective_rect(&self) -> CropRect {
        self.current_rect.unwrap_or(self.suggested_rect)
    }
}
