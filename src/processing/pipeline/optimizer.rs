//! The optimization pipeline state machine.
//!
//! One processing unit is a category or a mod directory:
//! `Scanning -> (skip | stage originals) -> inspection? -> Writing ->
//! Finalizing -> Done`, with `Cancelled` reachable from any non-terminal
//! state. Runs that can suspend on inspection are strictly sequential;
//! everything else fans out over a bounded worker pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::core::{
    BatchCropItem, CropAction, OptimizationContext, OptimizationMode, OptimizationTrigger,
    OutputFormat, OutputRole, RunController, MAX_PREVIEW_OUTPUTS,
};
use crate::platform::PlatformOps;
use crate::processing::codec::{self, EncodeFormat, LOSSLESS_QUALITY};
use crate::processing::crop::{calculate_crop_rect, CropRect};
use crate::utils::{self, OptimizerError, OptimizerResult, file_queue};

use super::inspection::{CropDecision, CropInspector, ThumbnailChoice};
use super::scan;
use super::staging::{self, RunLedger};

/// How a run ended. Cancellation is a signal, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

/// Orchestrates optimization runs over category/mod directory trees.
///
/// Cheap to clone; all state lives behind `Arc`s and the context is an
/// immutable value object.
#[derive(Clone)]
pub struct OptimizationPipeline {
    ctx: OptimizationContext,
    inspector: Arc<dyn CropInspector>,
    platform: Arc<dyn PlatformOps>,
    controller: Arc<RunController>,
}

impl OptimizationPipeline {
    pub fn new(
        ctx: OptimizationContext,
        inspector: Arc<dyn CropInspector>,
        platform: Arc<dyn PlatformOps>,
    ) -> Self {
        Self {
            ctx,
            inspector,
            platform,
            controller: Arc::new(RunController::new()),
        }
    }

    /// Shared run state: progress counters, change notification, cancellation.
    pub fn controller(&self) -> Arc<RunController> {
        Arc::clone(&self.controller)
    }

    /// Requests cooperative cancellation of the current run.
    pub fn cancel(&self) {
        self.controller.request_cancel();
    }

    /// Clears a previous cancellation before starting a new run.
    pub fn reset_cancellation(&self) {
        self.controller.reset_cancellation();
    }

    /// Optimizes a whole library: every category directory under `root`,
    /// then every mod directory inside each category.
    pub async fn run_optimization(&self, root: &Path) -> OptimizerResult<RunOutcome> {
        if self.controller.is_optimizing() {
            return Err(OptimizerError::processing("An optimization run is already in progress"));
        }

        let units = collect_units(root)?;
        self.controller.begin_run(units.len());
        info!("Optimization run over {} ({} units)", root.display(), units.len());

        let result = if self.ctx.inspection_possible() {
            self.run_sequential(&units).await
        } else {
            self.run_parallel(units).await
        };
        self.controller.finish_run();
        result
    }

    async fn run_sequential(&self, units: &[WorkUnit]) -> OptimizerResult<RunOutcome> {
        for unit in units {
            if self.controller.cancel_requested() {
                return Ok(RunOutcome::Cancelled);
            }
            self.controller.set_current(&unit.name);
            let outcome = self.process_unit(unit).await?;
            self.controller.item_done();
            if outcome == RunOutcome::Cancelled {
                return Ok(RunOutcome::Cancelled);
            }
        }
        Ok(RunOutcome::Completed)
    }

    async fn run_parallel(&self, units: Vec<WorkUnit>) -> OptimizerResult<RunOutcome> {
        let workers = self.ctx.thread_count.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        debug!("Parallel run with {} workers", workers);

        for unit in units {
            // Stop scheduling new work once cancellation is requested;
            // already-started units are allowed to finish.
            if self.controller.cancel_requested() {
                break;
            }
            let pipeline = self.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| OptimizerError::processing(format!("Failed to acquire worker: {}", e)))?;
                if pipeline.controller.cancel_requested() {
                    return Ok(RunOutcome::Cancelled);
                }
                pipeline.controller.set_current(&unit.name);
                let outcome = pipeline.process_unit(&unit).await;
                pipeline.controller.item_done();
                outcome
            });
        }

        let mut first_error = None;
        let mut cancelled = self.controller.cancel_requested();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(RunOutcome::Cancelled)) => cancelled = true,
                Ok(Ok(RunOutcome::Completed)) => {}
                Ok(Err(e)) => {
                    warn!("Unit failed: {}", e);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    warn!("Worker panicked: {}", e);
                    first_error.get_or_insert(OptimizerError::processing(e.to_string()));
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        if cancelled || self.controller.cancel_requested() {
            return Ok(RunOutcome::Cancelled);
        }
        Ok(RunOutcome::Completed)
    }

    async fn process_unit(&self, unit: &WorkUnit) -> OptimizerResult<RunOutcome> {
        match unit.kind {
            UnitKind::Category => self.optimize_category(&unit.dir).await,
            UnitKind::Mod => self.optimize_mod(&unit.dir).await,
        }
    }

    /// Optimizes one category directory according to the context mode:
    /// `CategoryFull` regenerates catprev + catmini, `Standard` runs the
    /// category-lite path (same flow as a mod directory).
    pub async fn optimize_category(&self, category_dir: &Path) -> OptimizerResult<RunOutcome> {
        match self.ctx.mode {
            OptimizationMode::CategoryFull => self.process_category_full(category_dir).await,
            OptimizationMode::Standard => self.optimize_mod(category_dir).await,
        }
    }

    /// Standard-mode optimization of one mod (or category-lite) directory.
    pub async fn optimize_mod(&self, mod_dir: &Path) -> OptimizerResult<RunOutcome> {
        let format = self.ctx.output_format;
        if self.controller.cancel_requested() {
            return Ok(RunOutcome::Cancelled);
        }

        // Scanning
        let sources = scan::find_preview_sources(mod_dir)?;
        let (canonical, new_sources) = split_canonical(&sources, format);

        if !self.ctx.reoptimize && new_sources.is_empty() && scan::already_optimized(mod_dir, format)
        {
            debug!("Already optimized, skipping: {}", mod_dir.display());
            return Ok(RunOutcome::Completed);
        }
        if sources.is_empty() {
            return Ok(RunOutcome::Completed);
        }

        if self.ctx.create_backups {
            staging::create_backup_zip(mod_dir, sources.clone()).await?;
        }

        let mut ledger = RunLedger::default();

        // Stage already-named outputs to `_original` when regenerating them;
        // the staged files become this run's sources.
        let (mut work_sources, start_index) = if self.ctx.reoptimize {
            let mut staged_sources = Vec::with_capacity(canonical.len());
            for path in &canonical {
                staged_sources.push(self.stage_original(path, &mut ledger).await?);
            }
            let minitile = mod_dir.join(format!("minitile.{}", format.extension()));
            if minitile.is_file() {
                self.stage_original(&minitile, &mut ledger).await?;
            }
            staged_sources.extend(new_sources);
            (staged_sources, 0)
        } else {
            (new_sources, canonical.len())
        };

        // Hard cap on total outputs; overflow goes to the recycle bin.
        let capacity = MAX_PREVIEW_OUTPUTS.saturating_sub(start_index);
        if work_sources.len() > capacity {
            let overflow = work_sources.split_off(capacity);
            warn!("{} candidates over the preview cap, recycling", overflow.len());
            for path in overflow {
                if let Err(e) = self.platform.recycle(&path) {
                    warn!("Failed to recycle {}: {}", path.display(), e);
                }
            }
        }

        // Load candidates up front; single-file decode failures are
        // recoverable (logged, skipped), never fatal.
        let mut items = Vec::with_capacity(work_sources.len());
        for source in work_sources {
            match self.load_preview_item(&source, items.len()).await {
                Ok(item) => items.push(item),
                Err(e) => warn!("Skipping {}: {}", source.display(), e),
            }
        }

        // Thumbnail source selection happens before inspection so the chosen
        // item is protected against deletion for the rest of the run.
        let minitile_target = mod_dir.join(format!("minitile.{}", format.extension()));
        let minitile_needed = self.ctx.create_minitile
            && !items.is_empty()
            && (self.ctx.reoptimize || !minitile_target.is_file());
        let mut thumb_skipped = false;
        if minitile_needed {
            let candidates: Vec<PathBuf> =
                items.iter().map(|item| item.source_path.clone()).collect();
            match self.select_thumbnail(&candidates, mod_dir).await {
                Selection::Use(path) => {
                    let index = items
                        .iter()
                        .position(|item| utils::same_path(&item.source_path, &path))
                        .unwrap_or(0);
                    items[index].protected = true;
                }
                Selection::None => {
                    debug!("Proceeding without a thumbnail");
                    thumb_skipped = true;
                }
                Selection::Stop => {
                    ledger.rollback().await;
                    return Ok(RunOutcome::Cancelled);
                }
            }
        }

        // Inspection (batch when more than one file is queued)
        if self.ctx.inspection_needed(OutputRole::Preview) && !items.is_empty() {
            if items.len() > 1 {
                match self.inspector.inspect_batch(items).await {
                    Some(results) => items = results,
                    None => {
                        ledger.rollback().await;
                        return Ok(RunOutcome::Cancelled);
                    }
                }
            } else {
                for item in &mut items {
                    match self.inspector.inspect(item).await {
                        CropDecision::Confirm(rect) => {
                            item.current_rect = Some(rect);
                            item.action = CropAction::Confirm;
                        }
                        CropDecision::Skip => item.action = CropAction::Skip,
                        CropDecision::Delete => item.action = CropAction::Delete,
                        CropDecision::Cancel => {
                            ledger.rollback().await;
                            return Ok(RunOutcome::Cancelled);
                        }
                    }
                }
            }
        }
        if self.controller.cancel_requested() {
            ledger.rollback().await;
            return Ok(RunOutcome::Cancelled);
        }

        // The protected flag survives batch edits even if the host reordered
        // the item list.
        let thumb_index = items.iter().position(|item| item.protected);

        // Writing: strictly increasing ordinals; deleted items consume none
        let mut next_index = start_index;
        let mut outputs = Vec::new();
        let mut consumed = Vec::new();
        let mut thumb_source = None;
        for (index, item) in items.into_iter().enumerate() {
            if self.controller.cancel_requested() {
                ledger.rollback().await;
                return Ok(RunOutcome::Cancelled);
            }
            let action = if item.action == CropAction::Delete && item.protected {
                warn!(
                    "{} feeds the thumbnail and cannot be deleted silently, keeping it",
                    item.source_path.display()
                );
                CropAction::Skip
            } else {
                item.action
            };
            if action == CropAction::Delete {
                if let Err(e) = self.platform.recycle(&item.source_path) {
                    warn!("Failed to recycle {}: {}", item.source_path.display(), e);
                }
                continue;
            }

            let target = mod_dir.join(scan::preview_name(next_index, format));
            let rect = match action {
                CropAction::Skip => CropRect::SKIP,
                _ => item.effective_rect(),
            };
            let source = item.source_path.clone();
            self.write_artifact(item, rect, &target, &mut ledger).await?;
            if !utils::same_path(&source, &target) {
                consumed.push(source);
            }
            if thumb_index == Some(index) {
                thumb_source = Some(target.clone());
            }
            outputs.push(target);
            next_index += 1;
        }

        // Thumbnail from the selected preview's output; directories whose
        // previews were already named but never got a thumbnail derive one
        // from the main preview.
        let thumb_source = thumb_source.or_else(|| {
            let main_preview = mod_dir.join(scan::preview_name(0, format));
            (self.ctx.create_minitile
                && !thumb_skipped
                && !minitile_target.is_file()
                && main_preview.is_file())
            .then_some(main_preview)
        });
        if let Some(source) = thumb_source {
            match self
                .create_fixed_artifact(&source, &minitile_target, OutputRole::Minitile, &mut ledger)
                .await
            {
                Ok(true) => ledger.record_thumbnail(minitile_target.clone()),
                Ok(false) => {
                    ledger.rollback().await;
                    return Ok(RunOutcome::Cancelled);
                }
                Err(e) => warn!("Thumbnail creation failed: {}", e),
            }
        }

        if self.ctx.trigger == OptimizationTrigger::GameBananaDownload {
            if let Err(e) = self.process_gbicon(mod_dir, &mut ledger).await {
                warn!("Icon conversion failed: {}", e);
            }
        }

        // Finalizing: commit deferred same-file replacements, then remove
        // consumed sources and staged originals.
        ledger.commit_replacements().await?;
        if !self.ctx.keep_originals {
            for path in consumed.into_iter().chain(ledger.staged_paths()) {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => debug!("Removed source {}", path.display()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!("Failed to remove source {}: {}", path.display(), e),
                }
            }
        }

        info!("Optimized {} ({} previews)", mod_dir.display(), outputs.len());
        Ok(RunOutcome::Completed)
    }

    /// CategoryFull: two independently-inspected artifacts from one source.
    async fn process_category_full(&self, category_dir: &Path) -> OptimizerResult<RunOutcome> {
        let format = self.ctx.output_format;
        let ext = format.extension();
        let catprev = category_dir.join(format!("catprev.{}", ext));
        let catmini = category_dir.join(format!("catmini.{}", ext));

        if !self.ctx.reoptimize && catprev.is_file() && catmini.is_file() {
            debug!("Category already optimized: {}", category_dir.display());
            return Ok(RunOutcome::Completed);
        }

        let sources = scan::find_category_sources(category_dir)?;
        let Some(source) = sources.first().cloned() else {
            return Ok(RunOutcome::Completed);
        };

        if self.ctx.create_backups {
            staging::create_backup_zip(category_dir, sources.clone()).await?;
        }

        let mut ledger = RunLedger::default();
        let mut source = source;
        if self.ctx.reoptimize {
            for output in [&catprev, &catmini] {
                if output.is_file() {
                    let staged = self.stage_original(output, &mut ledger).await?;
                    if utils::same_path(&source, output) {
                        source = staged;
                    }
                }
            }
        }

        // Decode once; both artifacts derive from the same source pixels even
        // when the first write replaces the source file itself.
        let bytes = file_queue::read(&source).await?;
        let image = tokio::task::spawn_blocking(move || codec::decode(&bytes))
            .await
            .map_err(|e| OptimizerError::processing(e.to_string()))??
            .to_rgba8();

        for (role, target) in [(OutputRole::CatPrev, &catprev), (OutputRole::CatMini, &catmini)] {
            if self.controller.cancel_requested() {
                ledger.rollback().await;
                return Ok(RunOutcome::Cancelled);
            }
            match self
                .render_fixed_artifact(image.clone(), &source, target, role, &mut ledger)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    ledger.rollback().await;
                    return Ok(RunOutcome::Cancelled);
                }
                Err(e) => warn!("{} generation failed: {}", role.label(), e),
            }
        }

        ledger.commit_replacements().await?;
        if !self.ctx.keep_originals {
            let keep = [catprev.clone(), catmini.clone()];
            if !keep.iter().any(|k| utils::same_path(k, &source)) && !ledger.is_staged(&source) {
                let _ = tokio::fs::remove_file(&source).await;
            }
            for path in ledger.staged_paths() {
                let _ = tokio::fs::remove_file(&path).await;
            }
        }

        info!("Category optimized: {}", category_dir.display());
        Ok(RunOutcome::Completed)
    }

    /// Renames `path` to its `_original` sibling, recording the rename for
    /// rollback. An `_original` left by an interrupted run is the recoverable
    /// source and is never overwritten; the derived file is recycled instead.
    async fn stage_original(
        &self,
        path: &Path,
        ledger: &mut RunLedger,
    ) -> OptimizerResult<PathBuf> {
        let staged = scan::original_name(path);
        if staged.is_file() {
            warn!(
                "{} already exists, recycling {}",
                staged.display(),
                path.display()
            );
            if let Err(e) = self.platform.recycle(path) {
                warn!("Failed to recycle {}: {}", path.display(), e);
            }
            return Ok(staged);
        }
        tokio::fs::rename(path, &staged)
            .await
            .map_err(|e| OptimizerError::io(format!(
                "Failed to stage {} -> {}: {}",
                path.display(),
                staged.display(),
                e
            )))?;
        ledger.record_renamed_original(staged.clone(), path.to_path_buf());
        Ok(staged)
    }

    async fn load_preview_item(
        &self,
        source: &Path,
        position: usize,
    ) -> OptimizerResult<BatchCropItem> {
        let bytes = file_queue::read(source).await?;
        let image = tokio::task::spawn_blocking(move || codec::decode(&bytes))
            .await
            .map_err(|e| OptimizerError::processing(e.to_string()))??
            .to_rgba8();
        let (w, h) = (image.width(), image.height());
        // Previews have no fixed target size; the suggestion is the full
        // frame and inspection may narrow it.
        let suggested = CropRect::new(0, 0, w as i32, h as i32);
        Ok(BatchCropItem::new(
            source.to_path_buf(),
            OutputRole::Preview,
            image,
            suggested,
            w,
            h,
            position,
        ))
    }

    /// Encodes one item to `target`. `rect` may be the skip sentinel, in
    /// which case the raw source bytes are staged unchanged.
    async fn write_artifact(
        &self,
        item: BatchCropItem,
        rect: CropRect,
        target: &Path,
        ledger: &mut RunLedger,
    ) -> OptimizerResult<()> {
        let source = item.source_path.clone();
        let bytes = if rect.is_skip() {
            file_queue::read(&source).await?
        } else {
            let quality = self.ctx.quality;
            let encode_format = encode_format_for(OutputRole::Preview, self.ctx.output_format);
            tokio::task::spawn_blocking(move || -> OptimizerResult<Vec<u8>> {
                let image = DynamicImage::ImageRgba8(item.image);
                let cropped = codec::crop(&image, rect)?;
                codec::encode(&cropped, encode_format, quality)
            })
            .await
            .map_err(|e| OptimizerError::processing(e.to_string()))??
        };
        staging::stage_write(target, &bytes, Some(&source), ledger).await
    }

    /// Builds a fixed-size artifact (minitile/catprev/catmini) from `source`.
    /// Returns `Ok(false)` when the user cancelled during inspection.
    async fn create_fixed_artifact(
        &self,
        source: &Path,
        target: &Path,
        role: OutputRole,
        ledger: &mut RunLedger,
    ) -> OptimizerResult<bool> {
        let bytes = file_queue::read(source).await?;
        let image = tokio::task::spawn_blocking(move || codec::decode(&bytes))
            .await
            .map_err(|e| OptimizerError::processing(e.to_string()))??
            .to_rgba8();
        self.render_fixed_artifact(image, source, target, role, ledger).await
    }

    /// Crops, resizes, and encodes one fixed-size artifact from decoded
    /// pixels. Returns `Ok(false)` when the user cancelled during inspection.
    async fn render_fixed_artifact(
        &self,
        image: image::RgbaImage,
        source: &Path,
        target: &Path,
        role: OutputRole,
        ledger: &mut RunLedger,
    ) -> OptimizerResult<bool> {
        let (target_w, target_h) = role.target_size().expect("fixed artifact role");
        let suggested = calculate_crop_rect(&image, target_w, target_h, self.ctx.crop_strategy);

        let rect = if self.ctx.inspection_needed(role) {
            let item = BatchCropItem::new(
                source.to_path_buf(),
                role,
                image.clone(),
                suggested,
                target_w,
                target_h,
                0,
            );
            match self.inspector.inspect(&item).await {
                CropDecision::Confirm(rect) if !rect.is_skip() => rect,
                CropDecision::Confirm(_) | CropDecision::Skip => suggested,
                CropDecision::Delete => return Ok(true),
                CropDecision::Cancel => return Ok(false),
            }
        } else {
            suggested
        };

        let quality = self.ctx.quality;
        let encode_format = encode_format_for(role, self.ctx.output_format);
        let encoded = tokio::task::spawn_blocking(move || -> OptimizerResult<Vec<u8>> {
            let image = DynamicImage::ImageRgba8(image);
            let cropped = codec::crop(&image, rect)?;
            let resized = codec::resize(&cropped, target_w, target_h);
            codec::encode(&resized, encode_format, quality)
        })
        .await
        .map_err(|e| OptimizerError::processing(e.to_string()))??;

        staging::stage_write(target, &encoded, Some(source), ledger).await?;
        Ok(true)
    }

    async fn select_thumbnail(&self, candidates: &[PathBuf], mod_dir: &Path) -> Selection {
        let first = candidates[0].clone();
        if candidates.len() == 1 || self.ctx.auto_thumbnails || !self.ctx.allow_interaction {
            return Selection::Use(first);
        }
        match self
            .inspector
            .select_thumbnail_source(candidates, mod_dir)
            .await
        {
            ThumbnailChoice::Selected(path) => Selection::Use(path),
            ThumbnailChoice::Skipped => Selection::None,
            ThumbnailChoice::Stopped => Selection::Stop,
        }
    }

    /// Converts a `gbicon.*` source to the lossless alpha-capable output
    /// (`gbicon.png`, or `gbicon.webp` for WebP-configured runs).
    async fn process_gbicon(&self, dir: &Path, ledger: &mut RunLedger) -> OptimizerResult<()> {
        let target_ext = match self.ctx.output_format {
            OutputFormat::Jpeg => "png",
            OutputFormat::WebP => "webp",
        };
        let target = dir.join(format!("gbicon.{}", target_ext));

        let mut source = None;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let stem_matches = path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s.eq_ignore_ascii_case("gbicon"));
            let ext_ok = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(scan::is_image_ext);
            if stem_matches && ext_ok && !utils::same_path(&path, &target) {
                source = Some(path);
                break;
            }
        }
        let Some(source) = source else {
            return Ok(());
        };

        let bytes = file_queue::read(&source).await?;
        let encode_format = match self.ctx.output_format {
            OutputFormat::Jpeg => EncodeFormat::Png,
            OutputFormat::WebP => EncodeFormat::WebP,
        };
        let encoded = tokio::task::spawn_blocking(move || -> OptimizerResult<Vec<u8>> {
            let image = codec::decode(&bytes)?;
            codec::encode(&image, encode_format, LOSSLESS_QUALITY)
        })
        .await
        .map_err(|e| OptimizerError::processing(e.to_string()))??;
        staging::stage_write(&target, &encoded, Some(&source), ledger).await?;

        if !self.ctx.keep_originals {
            let _ = tokio::fs::remove_file(&source).await;
        }
        Ok(())
    }
}

enum Selection {
    Use(PathBuf),
    None,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitKind {
    Category,
    Mod,
}

struct WorkUnit {
    kind: UnitKind,
    dir: PathBuf,
    name: String,
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Enumerates category directories under `root` and the mod directories
/// inside each, category first.
fn collect_units(root: &Path) -> OptimizerResult<Vec<WorkUnit>> {
    let mut categories: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    categories.sort();

    let mut units = Vec::new();
    for category in categories {
        units.push(WorkUnit {
            kind: UnitKind::Category,
            name: dir_name(&category),
            dir: category.clone(),
        });
        let mut mods: Vec<PathBuf> = std::fs::read_dir(&category)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        mods.sort();
        for mod_dir in mods {
            units.push(WorkUnit {
                kind: UnitKind::Mod,
                name: dir_name(&mod_dir),
                dir: mod_dir,
            });
        }
    }
    Ok(units)
}

/// Splits scanned sources into already-canonical outputs (ordinal order) and
/// new candidates (name order).
fn split_canonical(sources: &[PathBuf], format: OutputFormat) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut canonical: Vec<(usize, PathBuf)> = Vec::new();
    let mut fresh = Vec::new();
    for path in sources {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if scan::is_canonical_preview_name(&name, format) {
            canonical.push((canonical_ordinal(&name), path.clone()));
        } else {
            fresh.push(path.clone());
        }
    }
    canonical.sort_by_key(|(ordinal, _)| *ordinal);
    (canonical.into_iter().map(|(_, p)| p).collect(), fresh)
}

fn canonical_ordinal(name: &str) -> usize {
    name.to_lowercase()
        .strip_prefix("preview-")
        .and_then(|rest| rest.split('.').next())
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

fn encode_format_for(role: OutputRole, format: OutputFormat) -> EncodeFormat {
    match (role, format) {
        // Icon assets need the alpha path and are always lossless
        (OutputRole::GbIcon, OutputFormat::Jpeg) => EncodeFormat::Png,
        (OutputRole::GbIcon, OutputFormat::WebP) => EncodeFormat::WebP,
        (_, OutputFormat::Jpeg) => EncodeFormat::Jpeg,
        (_, OutputFormat::WebP) => EncodeFormat::WebP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_split_orders_by_ordinal() {
        let sources = vec![
            PathBuf::from("/m/preview-02.jpg"),
            PathBuf::from("/m/preview.jpg"),
            PathBuf::from("/m/preview-01.jpg"),
            PathBuf::from("/m/previewNew.png"),
        ];
        let (canonical, fresh) = split_canonical(&sources, OutputFormat::Jpeg);
        let names: Vec<_> = canonical
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["preview.jpg", "preview-01.jpg", "preview-02.jpg"]);
        assert_eq!(fresh, vec![PathBuf::from("/m/previewNew.png")]);
    }

    #[test]
    fn gbicon_always_gets_the_lossless_alpha_format() {
        assert_eq!(
            encode_format_for(OutputRole::GbIcon, OutputFormat::Jpeg),
            EncodeFormat::Png
        );
        assert_eq!(
            encode_format_for(OutputRole::GbIcon, OutputFormat::WebP),
            EncodeFormat::WebP
        );
        assert_eq!(
            encode_format_for(OutputRole::Preview, OutputFormat::Jpeg),
            EncodeFormat::Jpeg
        );
    }
}
