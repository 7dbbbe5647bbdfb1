//! Platform-specific filesystem operations behind a small seam.
//!
//! The pipeline never calls the recycle bin or symlink APIs directly; hosts
//! and tests inject their own implementation when the native one is wrong
//! for the environment.

use std::io;
use std::path::Path;

use tracing::warn;

/// Recycle-or-delete and directory-link operations.
pub trait PlatformOps: Send + Sync {
    /// Moves `path` to the platform trash, deleting outright when no trash
    /// facility is available.
    fn recycle(&self, path: &Path) -> io::Result<()>;

    /// Creates a directory symlink at `link` pointing to `target`.
    fn link_directory(&self, target: &Path, link: &Path) -> io::Result<()>;
}

/// Native implementation: OS trash with plain-delete fallback.
pub struct NativePlatform;

impl PlatformOps for NativePlatform {
    fn recycle(&self, path: &Path) -> io::Result<()> {
        match trash::delete(path) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Recycle failed for {} ({}), deleting instead", path.display(), e);
                if path.is_dir() {
                    std::fs::remove_dir_all(path)
                } else {
                    std::fs::remove_file(path)
                }
            }
        }
    }

    #[cfg(unix)]
    fn link_directory(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(windows)]
    fn link_directory(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::windows::fs::symlink_dir(target, link)
    }
}
