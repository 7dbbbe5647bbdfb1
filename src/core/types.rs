//! Core types for optimization settings and output artifacts.

use serde::{Deserialize, Serialize};

/// Hard cap on the number of positional preview outputs per directory.
/// Two-digit ordinal suffix space; candidates beyond this go to the recycle bin.
pub const MAX_PREVIEW_OUTPUTS: usize = 100;

/// Category preview dimensions (square tile).
pub const CATPREV_SIZE: (u32, u32) = (722, 722);
/// Category thumbnail dimensions.
pub const CATMINI_SIZE: (u32, u32) = (600, 722);
/// Per-mod thumbnail dimensions.
pub const MINITILE_SIZE: (u32, u32) = (600, 722);

/// Top-level optimization mode.
///
/// `CategoryFull` regenerates both category artifacts (catprev + catmini) with
/// mandatory inspection; `Standard` produces positional preview files plus an
/// optional thumbnail, for mods and for the category-lite path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationMode {
    Standard,
    CategoryFull,
}

/// What initiated the run. Background triggers run without UI interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationTrigger {
    Manual,
    DragDropMod,
    DragDropCategory,
    GameBananaDownload,
}

/// Cropping strategy for suggested rectangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CropStrategy {
    Center,
    Smart,
    Entropy,
    Attention,
}

/// Output encoding for generated artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Jpeg,
    WebP,
}

impl OutputFormat {
    /// Canonical file extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::WebP => "webp",
        }
    }
}

/// The artifact class a processed file belongs to.
///
/// Drives target dimensions, naming, and the per-artifact inspection decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputRole {
    /// Positional preview file (`preview.<ext>`, `preview-NN.<ext>`)
    Preview,
    /// Per-mod thumbnail derived from one selected preview
    Minitile,
    /// Category preview tile
    CatPrev,
    /// Category thumbnail
    CatMini,
    /// Lossless icon asset (alpha-capable formats only)
    GbIcon,
}

impl OutputRole {
    /// Critical thumbnails are always inspected when interaction is allowed,
    /// independent of the inspect-and-edit flag.
    pub fn is_critical_thumbnail(self) -> bool {
        matches!(self, OutputRole::Minitile | OutputRole::CatPrev | OutputRole::CatMini)
    }

    /// Fixed target dimensions, if this role has them.
    pub fn target_size(self) -> Option<(u32, u32)> {
        match self {
            OutputRole::CatPrev => Some(CATPREV_SIZE),
            OutputRole::CatMini => Some(CATMINI_SIZE),
            OutputRole::Minitile => Some(MINITILE_SIZE),
            OutputRole::Preview | OutputRole::GbIcon => None,
        }
    }

    /// Display label used in inspection requests and logs.
    pub fn label(self) -> &'static str {
        match self {
            OutputRole::Preview => "preview",
            OutputRole::Minitile => "minitile",
            OutputRole::CatPrev => "catprev",
            OutputRole::CatMini => "catmini",
            OutputRole::GbIcon => "gbicon",
        }
    }
}

/// Configuration for one optimization run.
///
/// Built by the host from settings + trigger, then immutable once execution
/// starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationContext {
    /// Top-level mode (standard previews vs full category regeneration)
    pub mode: OptimizationMode,
    /// Lossy output quality (1-100); values above 100 select lossless WebP
    pub quality: u8,
    /// Bounded worker count for parallel (no-inspection) runs
    pub thread_count: usize,
    /// Zip the pre-run image set before modifying anything
    pub create_backups: bool,
    /// Keep non-canonical source files after conversion
    pub keep_originals: bool,
    /// Heuristic used for suggested crop rectangles
    pub crop_strategy: CropStrategy,
    /// Inspect every generated artifact, not just critical thumbnails
    pub inspect_and_edit: bool,
    /// What initiated this run
    pub trigger: OptimizationTrigger,
    /// Whether blocking on UI callbacks is allowed at all
    pub allow_interaction: bool,
    /// Regenerate already-optimized outputs, staging them as `_original` first
    pub reoptimize: bool,
    /// Produce a minitile from one selected preview
    pub create_minitile: bool,
    /// Pick the first thumbnail candidate without prompting
    pub auto_thumbnails: bool,
    /// Encoding for generated artifacts
    pub output_format: OutputFormat,
}

impl OptimizationContext {
    /// Standard-mode context with defaults matching an interactive manual run.
    pub fn standard(trigger: OptimizationTrigger) -> Self {
        Self {
            mode: OptimizationMode::Standard,
            quality: 90,
            thread_count: default_thread_count(),
            create_backups: false,
            keep_originals: false,
            crop_strategy: CropStrategy::Center,
            inspect_and_edit: false,
            trigger,
            allow_interaction: trigger == OptimizationTrigger::Manual,
            reoptimize: false,
            create_minitile: true,
            auto_thumbnails: false,
            output_format: OutputFormat::Jpeg,
        }
    }

    /// CategoryFull context: both category artifacts, always inspected.
    pub fn category_full(trigger: OptimizationTrigger) -> Self {
        Self {
            mode: OptimizationMode::CategoryFull,
            ..Self::standard(trigger)
        }
    }

    /// True when this context can ever suspend on an inspection callback,
    /// which forces sequential processing for the whole run.
    pub fn inspection_possible(&self) -> bool {
        if !self.allow_interaction {
            return false;
        }
        if self.inspect_and_edit || self.mode == OptimizationMode::CategoryFull {
            return true;
        }
        // Minitile is a critical thumbnail unless auto-creation bypasses it.
        self.create_minitile && !self.auto_thumbnails
    }

    /// Per-artifact inspection predicate, evaluated for every generated file.
    pub fn inspection_needed(&self, role: OutputRole) -> bool {
        self.allow_interaction
            && (self.inspect_and_edit || role.is_critical_thumbnail())
            && !(role == OutputRole::Minitile && self.auto_thumbnails)
    }
}

/// Default worker count: logical cores minus one, at least one.
pub fn default_thread_count() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}
