//! Injected inspection callbacks.
//!
//! The pipeline is a pure state machine that suspends on these calls; the
//! host UI implements them with dialogs, while background triggers and tests
//! use [`HeadlessInspector`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::core::BatchCropItem;
use crate::processing::crop::CropRect;

/// Outcome of a single-file inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropDecision {
    /// Commit this rectangle (may be the skip sentinel)
    Confirm(CropRect),
    /// Keep the raw file under its canonical name
    Skip,
    /// Drop the file; it produces no output and frees its ordinal
    Delete,
    /// Abort the whole run (user-requested cancellation, not a failure)
    Cancel,
}

/// Outcome of the thumbnail-source selection callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailChoice {
    Selected(PathBuf),
    /// Proceed without a thumbnail for this run
    Skipped,
    /// Abort the whole run
    Stopped,
}

/// Human-in-the-loop hooks the host must provide.
#[async_trait]
pub trait CropInspector: Send + Sync {
    /// Single-file inspection: confirm/edit the suggested rectangle.
    async fn inspect(&self, item: &BatchCropItem) -> CropDecision;

    /// Batch inspection: the whole candidate list at once. Returns the
    /// per-item decisions (mutating geometry/action in place), or `None` for
    /// full cancellation.
    async fn inspect_batch(&self, items: Vec<BatchCropItem>) -> Option<Vec<BatchCropItem>>;

    /// Which candidate should seed the thumbnail.
    async fn select_thumbnail_source(
        &self,
        candidates: &[PathBuf],
        mod_dir: &Path,
    ) -> ThumbnailChoice;
}

/// Default implementation for tests and headless runs: accepts every
/// suggestion and seeds thumbnails from the first candidate.
pub struct HeadlessInspector;

#[async_trait]
impl CropInspector for HeadlessInspector {
    async fn inspect(&self, item: &BatchCropItem) -> CropDecision {
        CropDecision::Confirm(item.suggested_rect)
    }

    async fn inspect_batch(&self, items: Vec<BatchCropItem>) -> Option<Vec<BatchCropItem>> {
        Some(items)
    }

    async fn select_thumbnail_source(
        &self,
        candidates: &[PathBuf],
        _mod_dir: &Path,
    ) -> ThumbnailChoice {
        match candidates.first() {
            Some(path) => ThumbnailChoice::Selected(path.clone()),
            None => ThumbnailChoice::Skipped,
        }
    }
}
