//! File staging, atomic replacement, and cancellation rollback.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{info, warn};

use crate::utils::{self, OptimizerError, OptimizerResult, file_queue};

/// Tracks everything the current run did to the filesystem, so cancellation
/// can restore the pre-run state without touching prior runs' outputs.
#[derive(Default)]
pub struct RunLedger {
    /// Output files this run created
    created: Vec<PathBuf>,
    /// `(staged _original path, pre-run path)` renames this run performed
    renamed_originals: Vec<(PathBuf, PathBuf)>,
    /// `(temp file, target)` same-file replacements deferred to Finalizing
    pending_replacements: Vec<(PathBuf, PathBuf)>,
    /// Thumbnail created this run, if any
    thumbnail: Option<PathBuf>,
}

impl RunLedger {
    pub fn record_created(&mut self, path: PathBuf) {
        self.created.push(path);
    }

    pub fn record_renamed_original(&mut self, staged: PathBuf, pre_run: PathBuf) {
        self.renamed_originals.push((staged, pre_run));
    }

    pub fn record_pending_replace(&mut self, temp: PathBuf, target: PathBuf) {
        self.pending_replacements.push((temp, target));
    }

    /// Finalizing step: moves every deferred same-file temp over its real
    /// target. Until this runs, sources that double as targets are untouched,
    /// so cancellation mid-write never loses them.
    pub async fn commit_replacements(&mut self) -> OptimizerResult<()> {
        for (temp, target) in std::mem::take(&mut self.pending_replacements) {
            file_queue::with_lock(&target, || utils::replace_file(&temp, &target)).await?;
        }
        Ok(())
    }

    pub fn record_thumbnail(&mut self, path: PathBuf) {
        self.thumbnail = Some(path);
    }

    /// Paths of the `_original` staging files this run produced.
    pub fn staged_paths(&self) -> Vec<PathBuf> {
        self.renamed_originals
            .iter()
            .map(|(staged, _)| staged.clone())
            .collect()
    }

    /// Whether `path` is one of this run's `_original` staging files.
    pub fn is_staged(&self, path: &Path) -> bool {
        self.renamed_originals
            .iter()
            .any(|(staged, _)| crate::utils::same_path(staged, path))
    }

    /// Undo this run's changes: delete files it created (including the
    /// thumbnail and uncommitted same-file temps) and restore every
    /// `_original` staging rename, deleting any half-written occupant first.
    /// Outputs from prior runs are never touched.
    pub async fn rollback(self) {
        let temps = self.pending_replacements.into_iter().map(|(temp, _)| temp);
        for path in self.created.into_iter().chain(temps).chain(self.thumbnail) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => info!("Rollback removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Rollback failed to remove {}: {}", path.display(), e),
            }
        }
        for (staged, pre_run) in self.renamed_originals {
            if tokio::fs::metadata(&pre_run).await.is_ok() {
                if let Err(e) = tokio::fs::remove_file(&pre_run).await {
                    warn!("Rollback failed to clear {}: {}", pre_run.display(), e);
                    continue;
                }
            }
            match tokio::fs::rename(&staged, &pre_run).await {
                Ok(()) => info!("Rollback restored {}", pre_run.display()),
                Err(e) => warn!(
                    "Rollback failed to restore {} -> {}: {}",
                    staged.display(),
                    pre_run.display(),
                    e
                ),
            }
        }
    }
}

/// Writes `bytes` to `target` through the file queue.
///
/// When `source` is the same file as `target`, the write is redirected to a
/// fresh temp file in the same directory and recorded for an atomic move at
/// the ledger's commit step, so a source still open for reading (or needed by
/// a later artifact, or by cancellation) is never truncated.
pub async fn stage_write(
    target: &Path,
    bytes: &[u8],
    source: Option<&Path>,
    ledger: &mut RunLedger,
) -> OptimizerResult<()> {
    let same_file = source.is_some_and(|src| utils::same_path(src, target));
    if same_file {
        let temp = utils::sibling_temp_path(target);
        file_queue::write(&temp, bytes).await?;
        ledger.record_pending_replace(temp, target.to_path_buf());
    } else {
        file_queue::write(target, bytes).await?;
        ledger.record_created(target.to_path_buf());
    }
    Ok(())
}

/// Zips the given files into `preview_backup_<timestamp>.zip` inside `dir`.
///
/// Runs before anything in `dir` is modified; missing entries are skipped.
pub async fn create_backup_zip(dir: &Path, files: Vec<PathBuf>) -> OptimizerResult<PathBuf> {
    if files.is_empty() {
        return Err(OptimizerError::io("No files to back up"));
    }
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let backup_path = dir.join(format!("preview_backup_{}.zip", timestamp));
    let result_path = backup_path.clone();

    tokio::task::spawn_blocking(move || -> OptimizerResult<()> {
        let file = std::fs::File::create(&backup_path)
            .map_err(|e| OptimizerError::io(format!("Failed to create backup: {}", e)))?;
        let mut archive = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for path in files {
            if !path.is_file() {
                continue;
            }
            let entry_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            archive
                .start_file(entry_name.as_str(), options)
                .map_err(|e| OptimizerError::io(format!("Backup entry failed ({}): {}", entry_name, e)))?;
            let mut source = std::fs::File::open(&path)
                .map_err(|e| OptimizerError::io(format!("Backup read failed: {}", e)))?;
            let mut contents = Vec::new();
            source
                .read_to_end(&mut contents)
                .map_err(|e| OptimizerError::io(format!("Backup read failed: {}", e)))?;
            archive
                .write_all(&contents)
                .map_err(|e| OptimizerError::io(format!("Backup write failed: {}", e)))?;
            info!("Added to backup: {}", entry_name);
        }
        archive
            .finish()
            .map_err(|e| OptimizerError::io(format!("Backup finalize failed: {}", e)))?;
        Ok(())
    })
    .await
    .map_err(|e| OptimizerError::io(format!("Backup task failed: {}", e)))??;

    info!("Backup created: {}", result_path.display());
    Ok(result_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn same_file_writes_commit_at_finalize() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("preview.jpg");
        tokio::fs::write(&target, b"original bytes").await.unwrap();

        let mut ledger = RunLedger::default();
        stage_write(&target, b"converted", Some(&target), &mut ledger)
            .await
            .unwrap();
        // Untouched until the commit step
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"original bytes");

        ledger.commit_replacements().await.unwrap();
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"converted");
        // No stray temp files left behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "preview.jpg")
            .collect();
        assert!(leftovers.is_empty(), "temp files remained: {leftovers:?}");
    }

    #[tokio::test]
    async fn rollback_discards_uncommitted_replacements() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("catprev.jpg");
        tokio::fs::write(&target, b"the source").await.unwrap();

        let mut ledger = RunLedger::default();
        stage_write(&target, b"half done", Some(&target), &mut ledger)
            .await
            .unwrap();
        ledger.rollback().await;

        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"the source");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1, "temp files survived rollback");
    }

    #[tokio::test]
    async fn rollback_removes_created_and_restores_originals() {
        let dir = tempdir().unwrap();
        let created = dir.path().join("preview-01.jpg");
        let staged = dir.path().join("preview_original.jpg");
        let pre_run = dir.path().join("preview.jpg");
        tokio::fs::write(&created, b"new").await.unwrap();
        tokio::fs::write(&staged, b"the original").await.unwrap();
        // Half-written occupant at the pre-run name
        tokio::fs::write(&pre_run, b"partial").await.unwrap();

        let mut ledger = RunLedger::default();
        ledger.record_created(created.clone());
        ledger.record_renamed_original(staged.clone(), pre_run.clone());
        ledger.rollback().await;

        assert!(!created.exists());
        assert!(!staged.exists());
        assert_eq!(tokio::fs::read(&pre_run).await.unwrap(), b"the original");
    }

    #[tokio::test]
    async fn backup_zip_contains_entries() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("preview.jpg");
        tokio::fs::write(&a, b"aaa").await.unwrap();

        let backup = create_backup_zip(dir.path(), vec![a]).await.unwrap();
        assert!(backup.is_file());
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("preview_backup_") && name.ends_with(".zip"));
    }
}
