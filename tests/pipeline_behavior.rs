//! End-to-end pipeline behavior over real temp directories.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use tempfile::tempdir;

use mod_preview_optimizer::processing::pipeline::{
    CropDecision, CropInspector, HeadlessInspector, OptimizationPipeline, RunOutcome,
    ThumbnailChoice,
};
use mod_preview_optimizer::{
    BatchCropItem, CropAction, OptimizationContext, OptimizationTrigger, PlatformOps,
};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Writes a small decodable image at `path` (format from the extension).
fn write_image(path: &Path, width: u32, height: u32, tint: u8) {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([tint, (x % 256) as u8, (y % 256) as u8])
    });
    image.save(path).unwrap();
}

/// Full directory snapshot: file name -> contents.
fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| {
            (
                e.file_name().to_string_lossy().into_owned(),
                std::fs::read(e.path()).unwrap(),
            )
        })
        .collect()
}

/// Test double: records recycled paths and deletes them outright.
#[derive(Default)]
struct RecordingPlatform {
    recycled: Mutex<Vec<PathBuf>>,
}

impl PlatformOps for RecordingPlatform {
    fn recycle(&self, path: &Path) -> io::Result<()> {
        self.recycled.lock().unwrap().push(path.to_path_buf());
        match std::fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn link_directory(&self, _target: &Path, _link: &Path) -> io::Result<()> {
        Ok(())
    }
}

/// Batch inspector that marks the second item for deletion.
struct DeleteSecondInspector;

#[async_trait]
impl CropInspector for DeleteSecondInspector {
    async fn inspect(&self, item: &BatchCropItem) -> CropDecision {
        CropDecision::Confirm(item.suggested_rect)
    }

    async fn inspect_batch(&self, mut items: Vec<BatchCropItem>) -> Option<Vec<BatchCropItem>> {
        if items.len() > 1 {
            items[1].action = CropAction::Delete;
        }
        Some(items)
    }

    async fn select_thumbnail_source(
        &self,
        candidates: &[PathBuf],
        _mod_dir: &Path,
    ) -> ThumbnailChoice {
        ThumbnailChoice::Selected(candidates[0].clone())
    }
}

/// Inspector that cancels the run on the first single-file inspection.
struct CancelInspector;

#[async_trait]
impl CropInspector for CancelInspector {
    async fn inspect(&self, _item: &BatchCropItem) -> CropDecision {
        CropDecision::Cancel
    }

    async fn inspect_batch(&self, _items: Vec<BatchCropItem>) -> Option<Vec<BatchCropItem>> {
        None
    }

    async fn select_thumbnail_source(
        &self,
        _candidates: &[PathBuf],
        _mod_dir: &Path,
    ) -> ThumbnailChoice {
        ThumbnailChoice::Stopped
    }
}

/// Accepts every crop but stops the run at thumbnail source selection.
struct StopAtThumbnailInspector;

#[async_trait]
impl CropInspector for StopAtThumbnailInspector {
    async fn inspect(&self, item: &BatchCropItem) -> CropDecision {
        CropDecision::Confirm(item.suggested_rect)
    }

    async fn inspect_batch(&self, items: Vec<BatchCropItem>) -> Option<Vec<BatchCropItem>> {
        Some(items)
    }

    async fn select_thumbnail_source(
        &self,
        _candidates: &[PathBuf],
        _mod_dir: &Path,
    ) -> ThumbnailChoice {
        ThumbnailChoice::Stopped
    }
}

/// Confirms the first inspection, cancels on the second. Exercises
/// cancellation after some outputs are already on disk.
#[derive(Default)]
struct CancelSecondInspector {
    calls: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl CropInspector for CancelSecondInspector {
    async fn inspect(&self, item: &BatchCropItem) -> CropDecision {
        let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if call == 0 {
            CropDecision::Confirm(item.suggested_rect)
        } else {
            CropDecision::Cancel
        }
    }

    async fn inspect_batch(&self, items: Vec<BatchCropItem>) -> Option<Vec<BatchCropItem>> {
        Some(items)
    }

    async fn select_thumbnail_source(
        &self,
        candidates: &[PathBuf],
        _mod_dir: &Path,
    ) -> ThumbnailChoice {
        ThumbnailChoice::Selected(candidates[0].clone())
    }
}

fn background_context() -> OptimizationContext {
    let mut ctx = OptimizationContext::standard(OptimizationTrigger::Manual);
    ctx.allow_interaction = false;
    ctx.auto_thumbnails = true;
    ctx
}

#[tokio::test]
async fn standard_run_produces_positional_outputs_and_thumbnail() {
    init_tracing();
    let dir = tempdir().unwrap();
    write_image(&dir.path().join("previewA.png"), 120, 80, 10);
    write_image(&dir.path().join("previewB.png"), 100, 100, 20);

    let pipeline = OptimizationPipeline::new(
        background_context(),
        Arc::new(HeadlessInspector),
        Arc::new(RecordingPlatform::default()),
    );
    let outcome = pipeline.optimize_mod(dir.path()).await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let names: Vec<String> = snapshot(dir.path()).into_keys().collect();
    assert_eq!(names, vec!["minitile.jpg", "preview-01.jpg", "preview.jpg"]);

    // Outputs decode back as images
    for name in ["preview.jpg", "preview-01.jpg", "minitile.jpg"] {
        let bytes = std::fs::read(dir.path().join(name)).unwrap();
        image::load_from_memory(&bytes).unwrap();
    }
    // Minitile has its fixed dimensions
    let minitile = image::load_from_memory(&std::fs::read(dir.path().join("minitile.jpg")).unwrap()).unwrap();
    assert_eq!((minitile.width(), minitile.height()), (600, 722));
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    init_tracing();
    let dir = tempdir().unwrap();
    write_image(&dir.path().join("previewA.png"), 90, 60, 30);

    let make_pipeline = || {
        OptimizationPipeline::new(
            background_context(),
            Arc::new(HeadlessInspector),
            Arc::new(RecordingPlatform::default()),
        )
    };
    make_pipeline().optimize_mod(dir.path()).await.unwrap();
    let before = snapshot(dir.path());

    let outcome = make_pipeline().optimize_mod(dir.path()).await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(snapshot(dir.path()), before, "second run changed files");
}

#[tokio::test]
async fn batch_delete_renumbers_contiguously() {
    init_tracing();
    let dir = tempdir().unwrap();
    write_image(&dir.path().join("preview_a.png"), 80, 60, 1);
    write_image(&dir.path().join("preview_b.png"), 80, 60, 2);
    write_image(&dir.path().join("preview_c.png"), 80, 60, 3);

    let mut ctx = OptimizationContext::standard(OptimizationTrigger::Manual);
    ctx.inspect_and_edit = true;
    ctx.auto_thumbnails = true;
    let platform = Arc::new(RecordingPlatform::default());
    let pipeline =
        OptimizationPipeline::new(ctx, Arc::new(DeleteSecondInspector), platform.clone());

    let outcome = pipeline.optimize_mod(dir.path()).await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let names: Vec<String> = snapshot(dir.path()).into_keys().collect();
    // Deleted item contributes no output and no ordinal gap
    assert_eq!(names, vec!["minitile.jpg", "preview-01.jpg", "preview.jpg"]);
    let recycled = platform.recycled.lock().unwrap();
    assert_eq!(recycled.as_slice(), &[dir.path().join("preview_b.png")]);
}

#[tokio::test]
async fn cancellation_before_writes_restores_staged_originals() {
    init_tracing();
    let dir = tempdir().unwrap();
    write_image(&dir.path().join("preview.jpg"), 90, 70, 44);
    write_image(&dir.path().join("minitile.jpg"), 60, 72, 45);
    let before = snapshot(dir.path());

    let mut ctx = OptimizationContext::standard(OptimizationTrigger::Manual);
    ctx.inspect_and_edit = true;
    ctx.reoptimize = true;
    let pipeline = OptimizationPipeline::new(
        ctx,
        Arc::new(CancelInspector),
        Arc::new(RecordingPlatform::default()),
    );

    let outcome = pipeline.optimize_mod(dir.path()).await.unwrap();
    assert_eq!(outcome, RunOutcome::Cancelled);
    assert_eq!(snapshot(dir.path()), before, "cancellation left the directory changed");
}

#[tokio::test]
async fn stop_at_thumbnail_selection_cancels_cleanly() {
    init_tracing();
    let dir = tempdir().unwrap();
    write_image(&dir.path().join("preview_a.png"), 80, 60, 7);
    write_image(&dir.path().join("preview_b.png"), 80, 60, 8);
    let before = snapshot(dir.path());

    let ctx = OptimizationContext::standard(OptimizationTrigger::Manual);
    let pipeline = OptimizationPipeline::new(
        ctx,
        Arc::new(StopAtThumbnailInspector),
        Arc::new(RecordingPlatform::default()),
    );

    let outcome = pipeline.optimize_mod(dir.path()).await.unwrap();
    assert_eq!(outcome, RunOutcome::Cancelled);
    assert_eq!(snapshot(dir.path()), before, "stopped run changed the directory");
}

#[tokio::test]
async fn cancellation_mid_run_removes_created_outputs() {
    init_tracing();
    let dir = tempdir().unwrap();
    // Source name differs from both targets, so the first artifact lands on
    // disk before the second inspection cancels the run.
    write_image(&dir.path().join("catpreview.jpg"), 800, 900, 9);
    let before = snapshot(dir.path());

    let ctx = OptimizationContext::category_full(OptimizationTrigger::Manual);
    let pipeline = OptimizationPipeline::new(
        ctx,
        Arc::new(CancelSecondInspector::default()),
        Arc::new(RecordingPlatform::default()),
    );

    let outcome = pipeline.optimize_category(dir.path()).await.unwrap();
    assert_eq!(outcome, RunOutcome::Cancelled);
    assert_eq!(
        snapshot(dir.path()),
        before,
        "files created during the cancelled run survived"
    );
}

#[tokio::test]
async fn category_full_regenerates_from_its_own_output() {
    init_tracing();
    let dir = tempdir().unwrap();
    // Source and target share the name catprev.jpg: the same-file hazard
    write_image(&dir.path().join("catprev.jpg"), 800, 900, 12);

    let mut ctx = OptimizationContext::category_full(OptimizationTrigger::Manual);
    ctx.allow_interaction = false;
    let pipeline = OptimizationPipeline::new(
        ctx,
        Arc::new(HeadlessInspector),
        Arc::new(RecordingPlatform::default()),
    );
    let outcome = pipeline.optimize_category(dir.path()).await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let catprev = image::load_from_memory(&std::fs::read(dir.path().join("catprev.jpg")).unwrap())
        .expect("catprev.jpg was corrupted");
    assert_eq!((catprev.width(), catprev.height()), (722, 722));
    let catmini = image::load_from_memory(&std::fs::read(dir.path().join("catmini.jpg")).unwrap()).unwrap();
    assert_eq!((catmini.width(), catmini.height()), (600, 722));
}

#[tokio::test]
async fn tree_run_reports_progress_per_unit() {
    init_tracing();
    let root = tempdir().unwrap();
    let category = root.path().join("CharacterSkins");
    let mod_dir = category.join("CoolMod");
    std::fs::create_dir_all(&mod_dir).unwrap();
    write_image(&mod_dir.join("previewA.png"), 64, 64, 3);

    let pipeline = OptimizationPipeline::new(
        background_context(),
        Arc::new(HeadlessInspector),
        Arc::new(RecordingPlatform::default()),
    );
    let controller = pipeline.controller();

    let outcome = pipeline.run_optimization(root.path()).await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let progress = controller.snapshot();
    assert_eq!(progress.total_items, 2); // category + mod
    assert_eq!(progress.processed_items, 2);
    assert!((progress.fraction - 1.0).abs() < 1e-9);
    assert!(mod_dir.join("preview.jpg").is_file());
    assert!(mod_dir.join("minitile.jpg").is_file());
}

#[tokio::test]
async fn missing_minitile_is_backfilled_from_named_previews() {
    init_tracing();
    let dir = tempdir().unwrap();
    write_image(&dir.path().join("preview.jpg"), 120, 90, 17);
    let preview_before = std::fs::read(dir.path().join("preview.jpg")).unwrap();

    let pipeline = OptimizationPipeline::new(
        background_context(),
        Arc::new(HeadlessInspector),
        Arc::new(RecordingPlatform::default()),
    );
    let outcome = pipeline.optimize_mod(dir.path()).await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    assert!(dir.path().join("minitile.jpg").is_file());
    // The already-named preview itself is untouched
    assert_eq!(
        std::fs::read(dir.path().join("preview.jpg")).unwrap(),
        preview_before
    );
}

#[tokio::test]
async fn reoptimize_keeps_originals_when_asked() {
    init_tracing();
    let dir = tempdir().unwrap();
    write_image(&dir.path().join("preview.jpg"), 90, 70, 50);

    let mut ctx = background_context();
    ctx.reoptimize = true;
    ctx.keep_originals = true;
    let pipeline = OptimizationPipeline::new(
        ctx,
        Arc::new(HeadlessInspector),
        Arc::new(RecordingPlatform::default()),
    );
    pipeline.optimize_mod(dir.path()).await.unwrap();

    // The pre-run file is recoverable under its _original name
    assert!(dir.path().join("preview_original.jpg").is_file());
    let regenerated = std::fs::read(dir.path().join("preview.jpg")).unwrap();
    image::load_from_memory(&regenerated).unwrap();
}
