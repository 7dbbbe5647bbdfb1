//! Screenshot capture service.
//!
//! Watches a screenshot directory and renumbers every new image into the
//! target mod directory as `Preview<NNN>.jpg`, feeding the batch inspection
//! flow. Producing processes are given a settle delay plus a short read-probe
//! retry before a file is treated as fully written.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::DynamicImage;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::processing::codec::{self, EncodeFormat};
use crate::processing::pipeline::scan;
use crate::utils::{OptimizerError, OptimizerResult, file_queue};

/// Delay before first touching a freshly-created file.
const SETTLE_DELAY: Duration = Duration::from_millis(500);
/// Read-probe attempts while the producer may still hold the file open.
const PROBE_ATTEMPTS: u32 = 5;
const PROBE_DELAY: Duration = Duration::from_millis(200);
/// Captured files are encoded at high quality; they get optimized later.
const CAPTURE_JPEG_QUALITY: u8 = 95;

/// Directory-watch-driven screenshot ingestion.
pub struct ScreenshotCaptureService {
    watcher: Option<RecommendedWatcher>,
    captured: Arc<Mutex<Vec<PathBuf>>>,
    events_tx: mpsc::UnboundedSender<PathBuf>,
    capturing: bool,
}

impl ScreenshotCaptureService {
    /// Creates the service and the captured-file event channel consumed by
    /// the batch inspection UI.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PathBuf>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let service = Self {
            watcher: None,
            captured: Arc::new(Mutex::new(Vec::new())),
            events_tx,
            capturing: false,
        };
        (service, events_rx)
    }

    /// Starts capture mode: monitors `screenshot_dir` and copies qualifying
    /// images into `mod_dir` with sequential `Preview<NNN>.jpg` names.
    pub fn start_capture(
        &mut self,
        mod_dir: impl Into<PathBuf>,
        screenshot_dir: impl AsRef<Path>,
    ) -> OptimizerResult<()> {
        if self.capturing {
            warn!("Screenshot capture already in progress");
            return Ok(());
        }
        let mod_dir = mod_dir.into();
        let screenshot_dir = screenshot_dir.as_ref().to_path_buf();
        self.captured.lock().expect("captured list poisoned").clear();

        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<PathBuf>();
        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(notify::event::ModifyKind::Name(_))) {
                        for path in event.paths {
                            let _ = raw_tx.send(path);
                        }
                    }
                }
                Err(e) => error!("Watch error: {:?}", e),
            },
            Config::default(),
        )
        .map_err(|e| OptimizerError::watch(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(&screenshot_dir, RecursiveMode::NonRecursive)
            .map_err(|e| OptimizerError::watch(format!("Failed to watch {}: {}", screenshot_dir.display(), e)))?;

        let captured = Arc::clone(&self.captured);
        let events_tx = self.events_tx.clone();
        let target_dir = mod_dir;
        tokio::spawn(async move {
            while let Some(path) = raw_rx.recv().await {
                if let Err(e) = process_new_file(&path, &target_dir, &captured, &events_tx).await {
                    error!("Error processing new screenshot file {}: {}", path.display(), e);
                }
            }
        });

        self.watcher = Some(watcher);
        self.capturing = true;
        info!("Screenshot capture mode started - monitoring {}", screenshot_dir.display());
        Ok(())
    }

    /// Stops watching; captured files stay in place.
    pub fn stop_capture(&mut self) {
        self.capturing = false;
        self.watcher = None;
        info!("Screenshot capture stopped");
    }

    /// Stops watching and deletes every file captured during the session,
    /// with bounded retry/backoff for files still locked by a consumer.
    pub async fn stop_capture_and_cleanup(&mut self) {
        self.stop_capture();

        let files: Vec<PathBuf> = {
            let mut captured = self.captured.lock().expect("captured list poisoned");
            std::mem::take(&mut *captured)
        };
        if files.is_empty() {
            info!("No files to clean up");
            return;
        }

        info!("Cleaning up {} captured files", files.len());
        let mut deleted = 0;
        for file in files {
            if try_delete_with_retry(&file, PROBE_ATTEMPTS, PROBE_DELAY).await {
                deleted += 1;
                info!("Deleted captured file: {}", file.display());
            } else {
                error!("Failed to delete captured file after retries: {}", file.display());
            }
        }
        info!("Cleanup completed - deleted {} files", deleted);
    }

    pub fn captured_files(&self) -> Vec<PathBuf> {
        self.captured.lock().expect("captured list poisoned").clone()
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }
}

async fn process_new_file(
    path: &Path,
    mod_dir: &Path,
    captured: &Arc<Mutex<Vec<PathBuf>>>,
    events_tx: &mpsc::UnboundedSender<PathBuf>,
) -> OptimizerResult<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if !scan::is_image_ext(&extension) {
        return Ok(());
    }

    // Let the producing process finish writing
    tokio::time::sleep(SETTLE_DELAY).await;
    if !path.is_file() {
        return Ok(());
    }

    // Probe for a readable (unlocked) file before converting
    let mut probe_ok = false;
    for attempt in 0..PROBE_ATTEMPTS {
        match std::fs::File::open(path) {
            Ok(_) => {
                probe_ok = true;
                break;
            }
            Err(_) if attempt + 1 < PROBE_ATTEMPTS => {
                tokio::time::sleep(PROBE_DELAY).await;
            }
            Err(_) => {}
        }
    }
    if !probe_ok {
        debug!("Giving up on locked screenshot: {}", path.display());
        return Ok(());
    }

    copy_to_mod_directory(path, mod_dir, captured, events_tx).await
}

async fn copy_to_mod_directory(
    source: &Path,
    mod_dir: &Path,
    captured: &Arc<Mutex<Vec<PathBuf>>>,
    events_tx: &mpsc::UnboundedSender<PathBuf>,
) -> OptimizerResult<()> {
    let number = next_available_number(mod_dir)?;
    let target_name = format!("Preview{:03}.jpg", number);
    let target = mod_dir.join(&target_name);

    let bytes = file_queue::read(source).await?;
    let encoded = tokio::task::spawn_blocking(move || -> OptimizerResult<Vec<u8>> {
        let image: DynamicImage = codec::decode(&bytes)?;
        codec::encode(&image, EncodeFormat::Jpeg, CAPTURE_JPEG_QUALITY)
    })
    .await
    .map_err(|e| OptimizerError::processing(e.to_string()))??;
    file_queue::write(&target, &encoded).await?;

    captured.lock().expect("captured list poisoned").push(target.clone());
    info!("Captured screenshot: {}", target_name);

    // Notify the inspection UI that a new file arrived
    let _ = events_tx.send(target);
    Ok(())
}

/// First unused `Preview<NNN>` number in 1..=999.
fn next_available_number(mod_dir: &Path) -> OptimizerResult<u32> {
    let mut taken = Vec::new();
    for entry in std::fs::read_dir(mod_dir)? {
        let path = entry?.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !ext.eq_ignore_ascii_case("jpg") && !ext.eq_ignore_ascii_case("png") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        // PreviewNNN is exactly 10 characters
        if stem.len() == 10 {
            if let Some(digits) = stem.strip_prefix("Preview") {
                if let Ok(number) = digits.parse::<u32>() {
                    taken.push(number);
                }
            }
        }
    }
    for candidate in 1..=999 {
        if !taken.contains(&candidate) {
            return Ok(candidate);
        }
    }
    Ok(1)
}

/// Deletes `path`, retrying with exponential backoff while it stays locked.
async fn try_delete_with_retry(path: &Path, max_retries: u32, initial_delay: Duration) -> bool {
    let mut delay = initial_delay;
    for attempt in 1..=max_retries {
        if !path.is_file() {
            return true;
        }
        match std::fs::remove_file(path) {
            Ok(()) => return true,
            Err(e) => {
                warn!(
                    "Delete attempt {}/{} failed for {}: {}",
                    attempt,
                    max_retries,
                    path.display(),
                    e
                );
                if attempt < max_retries {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
    false
}
