use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use crate::utils::{OptimizerError, OptimizerResult};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Get file size in bytes
pub async fn get_file_size(path: impl AsRef<Path>) -> OptimizerResult<u64> {
    fs::metadata(path.as_ref())
        .await
        .map(|m| m.len())
        .map_err(|e| OptimizerError::io(format!("Failed to get file size: {}", e)))
}

/// Get file extension as lowercase string
pub fn get_extension(path: impl AsRef<Path>) -> OptimizerResult<String> {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .ok_or_else(|| OptimizerError::io(
            format!("File has no extension: {}", path.as_ref().display())
        ))
}

/// Case-insensitive path equality on the textual form. Sufficient for
/// same-file detection inside a single directory.
pub fn same_path(a: impl AsRef<Path>, b: impl AsRef<Path>) -> bool {
    a.as_ref().to_string_lossy().to_lowercase() == b.as_ref().to_string_lossy().to_lowercase()
}

/// Returns a fresh temp file name next to `target`, preserving its extension.
///
/// The counter suffix keeps concurrent writers in the same directory from
/// colliding; callers still own cleanup of the returned path.
pub fn sibling_temp_path(target: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let stem = target.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let name = match target.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_tmp{}.{}", stem, n, ext),
        None => format!("{}_tmp{}", stem, n),
    };
    target.with_file_name(name)
}

/// Moves `from` over `to`, replacing any existing file at `to`.
///
/// `rename` alone fails on Windows when the target exists, so the occupant
/// is removed first. Not atomic across the two steps, but `from` is always
/// a fully-written file so the worst case is a missing (never truncated)
/// target.
pub async fn replace_file(from: &Path, to: &Path) -> OptimizerResult<()> {
    if fs::metadata(to).await.is_ok() {
        fs::remove_file(to)
            .await
            .map_err(|e| OptimizerError::io(format!("Failed to clear {}: {}", to.display(), e)))?;
    }
    fs::rename(from, to)
        .await
        .map_err(|e| OptimizerError::io(format!(
            "Failed to move {} -> {}: {}", from.display(), to.display(), e
        )))
}
