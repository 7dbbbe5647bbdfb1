//! Thread-safe file access queue that serializes read/write operations per file path.
//!
//! Prevents race conditions when multiple parts of the app access the same file:
//! optimization workers, the capture service, and host-triggered reads all funnel
//! through the same per-path mutex. Lock acquisition itself never fails; only the
//! wrapped filesystem operation's errors propagate. Guards are released on every
//! exit path (success, error, cancellation) by RAII.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use lazy_static::lazy_static;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::info;

struct LockEntry {
    mutex: Arc<AsyncMutex<()>>,
    waiting: Arc<AtomicUsize>,
}

lazy_static! {
    static ref FILE_LOCKS: Mutex<HashMap<String, LockEntry>> = Mutex::new(HashMap::new());
}

/// Canonical key: full path, case-insensitive.
fn normalize(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .to_lowercase()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Race-free get-or-create of the per-path lock entry.
fn entry_for(path: &Path) -> (Arc<AsyncMutex<()>>, Arc<AtomicUsize>) {
    let key = normalize(path);
    let mut table = FILE_LOCKS.lock().expect("file lock table poisoned");
    let entry = table.entry(key).or_insert_with(|| LockEntry {
        mutex: Arc::new(AsyncMutex::new(())),
        waiting: Arc::new(AtomicUsize::new(0)),
    });
    (Arc::clone(&entry.mutex), Arc::clone(&entry.waiting))
}

async fn acquire(path: &Path, operation: &str) -> OwnedMutexGuard<()> {
    let (mutex, waiting) = entry_for(path);
    let queued = waiting.fetch_add(1, Ordering::SeqCst) + 1;
    if queued > 1 {
        info!("[FileQueue] Waiting for {} ({}) - {} in queue", file_name(path), operation, queued);
    }
    let started = Instant::now();
    let guard = mutex.lock_owned().await;
    waiting.fetch_sub(1, Ordering::SeqCst);
    let elapsed = started.elapsed().as_millis();
    if elapsed > 100 {
        info!("[FileQueue] Acquired {} ({}) after {}ms", file_name(path), operation, elapsed);
    }
    guard
}

/// Read file content with queued access.
pub async fn read(path: impl AsRef<Path>) -> io::Result<Vec<u8>> {
    let path = path.as_ref();
    let _guard = acquire(path, "read").await;
    tokio::fs::read(path).await
}

/// Write file content with queued access.
pub async fn write(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> io::Result<()> {
    let path = path.as_ref();
    let _guard = acquire(path, "write").await;
    tokio::fs::write(path, contents.as_ref()).await
}

/// Execute a custom file operation with queued access.
///
/// The lock covers the whole future, so multi-step operations (read, modify,
/// rename) on one path are mutually exclusive process-wide.
pub async fn with_lock<T, F, Fut>(path: impl AsRef<Path>, operation: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let _guard = acquire(path.as_ref(), "execute").await;
    operation().await
}

/// Clean up unused locks (call periodically if needed).
///
/// Drops only entries that are neither held nor waited on; a held mutex is
/// never removed.
pub fn cleanup() {
    let mut table = FILE_LOCKS.lock().expect("file lock table poisoned");
    let before = table.len();
    table.retain(|_, entry| {
        if entry.waiting.load(Ordering::SeqCst) > 0 {
            return true;
        }
        // strong_count > 1 means a guard (or an acquire in flight) still
        // references this mutex.
        if Arc::strong_count(&entry.mutex) > 1 {
            return true;
        }
        entry.mutex.try_lock().is_err()
    });
    let removed = before - table.len();
    if removed > 0 {
        info!("[FileQueue] Cleanup: removed {} unused locks", removed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tempfile::tempdir;

    #[tokio::test]
    async fn read_write_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        write(&path, b"hello").await.unwrap();
        assert_eq!(read(&path).await.unwrap(), b"hello");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn with_lock_serializes_same_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("contended.txt");
        let active = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let path = path.clone();
            let active = Arc::clone(&active);
            handles.push(tokio::spawn(async move {
                with_lock(&path, || async {
                    let now = active.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(now, 0, "two operations held the same path lock");
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
    }

    #[tokio::test]
    async fn cleanup_keeps_held_locks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("held.txt");
        let (mutex, _) = entry_for(&path);
        let guard = mutex.lock_owned().await;

        cleanup();
        let key = normalize(&path);
        assert!(
            FILE_LOCKS.lock().unwrap().contains_key(&key),
            "cleanup dropped a held lock"
        );
        drop(guard);

        cleanup();
        assert!(!FILE_LOCKS.lock().unwrap().contains_key(&key));
    }

    #[test]
    fn normalization_is_case_insensitive() {
        assert_eq!(
            normalize(Path::new("/Mods/Preview.JPG")),
            normalize(Path::new("/mods/preview.jpg"))
        );
    }
}
