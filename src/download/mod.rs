//! Multi-segment HTTP downloader with automatic single-connection fallback.
//!
//! Probes range support with a HEAD request, splits large files into equal
//! byte-range segments fetched concurrently, and merges the segment temp
//! files in index order. Any segment failure abandons the multi-segment
//! attempt and retries the whole download over one connection; only a
//! failure of that fallback is reported to the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::join_all;
use lazy_static::lazy_static;
use reqwest::{Client, StatusCode, header};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::utils::{OptimizerError, OptimizerResult};

/// Files below this size are not worth splitting.
const MIN_MULTI_SIZE: u64 = 5 * 1024 * 1024;
const PROGRESS_POLL: Duration = Duration::from_millis(100);
const USER_AGENT: &str = concat!("mod-preview-optimizer/", env!("CARGO_PKG_VERSION"));

lazy_static! {
    static ref CLIENT: Client = Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .expect("HTTP client construction cannot fail with static settings");
}

/// Aggregate-percentage progress callback (0-100).
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// One byte-range slice of a multi-segment download.
pub struct DownloadSegment {
    pub start: u64,
    pub end: u64,
    pub index: usize,
    pub temp_path: PathBuf,
    bytes_downloaded: AtomicU64,
}

impl DownloadSegment {
    pub fn bytes_downloaded(&self) -> u64 {
        self.bytes_downloaded.load(Ordering::Relaxed)
    }
}

/// Downloads `url` to `destination`, using up to `max_connections` ranged
/// connections when the server and file size allow it.
///
/// Returns `false` on failure; segment-level problems silently degrade to a
/// single-connection retry first. Dropping the returned future aborts the
/// download.
pub async fn download_file(
    url: &str,
    destination: &Path,
    progress: Option<ProgressFn>,
    max_connections: usize,
) -> bool {
    let (supports_ranges, file_size) = check_range_support(url).await;

    if !supports_ranges || file_size < MIN_MULTI_SIZE || max_connections <= 1 {
        info!(
            "Using single connection download (ranges: {}, size: {} bytes)",
            supports_ranges, file_size
        );
        return download_single(url, destination, progress.as_ref()).await;
    }

    info!(
        "Using multi-threaded download with {} connections (size: {} bytes)",
        max_connections, file_size
    );
    download_multi(url, destination, file_size, max_connections, progress).await
}

/// HEAD probe: does the server accept byte ranges, and how large is the file.
async fn check_range_support(url: &str) -> (bool, u64) {
    let response = match CLIENT.head(url).send().await {
        Ok(r) if r.status().is_success() => r,
        _ => return (false, 0),
    };
    let supports_ranges = response
        .headers()
        .get(header::ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("bytes"));
    let file_size = response.content_length().unwrap_or(0);
    (supports_ranges, file_size)
}

async fn download_single(url: &str, destination: &Path, progress: Option<&ProgressFn>) -> bool {
    match stream_to_file(url, destination, progress).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Single connection download failed: {}", e);
            false
        }
    }
}

async fn stream_to_file(
    url: &str,
    destination: &Path,
    progress: Option<&ProgressFn>,
) -> OptimizerResult<()> {
    let response = CLIENT
        .get(url)
        .send()
        .await
        .map_err(|e| OptimizerError::download(e.to_string()))?
        .error_for_status()
        .map_err(|e| OptimizerError::download(e.to_string()))?;

    let total_bytes = response.content_length();
    let mut file = tokio::fs::File::create(destination).await?;
    let mut stream = response.bytes_stream();
    let mut total_read: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| OptimizerError::download(e.to_string()))?;
        file.write_all(&chunk).await?;
        total_read += chunk.len() as u64;
        if let (Some(total), Some(report)) = (total_bytes, progress) {
            if total > 0 {
                report(total_read as f64 / total as f64 * 100.0);
            }
        }
    }
    file.flush().await?;
    Ok(())
}

async fn download_multi(
    url: &str,
    destination: &Path,
    file_size: u64,
    max_connections: usize,
    progress: Option<ProgressFn>,
) -> bool {
    // TempDir removal on drop is the unconditional final cleanup step.
    let temp_dir = match tempfile::Builder::new().prefix("modpv-download-").tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            warn!("Failed to create download temp dir: {}", e);
            return download_single(url, destination, progress.as_ref()).await;
        }
    };

    let segments = partition_segments(file_size, max_connections, temp_dir.path());

    // Poll the per-segment counters on a fixed interval for smooth progress.
    let poller = progress.clone().map(|report| {
        let segments = segments.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(PROGRESS_POLL).await;
                let downloaded: u64 = segments.iter().map(|s| s.bytes_downloaded()).sum();
                report(downloaded as f64 / file_size as f64 * 100.0);
            }
        })
    });

    let results = join_all(segments.iter().map(|segment| {
        let url = url.to_string();
        let segment = Arc::clone(segment);
        tokio::spawn(async move { download_segment(&url, &segment).await })
    }))
    .await;
    if let Some(handle) = poller {
        handle.abort();
    }

    let all_succeeded = results.into_iter().all(|r| r.unwrap_or(false));
    if !all_succeeded {
        warn!("Some segments failed, falling back to single connection");
        return download_single(url, destination, progress.as_ref()).await;
    }

    if let Some(report) = progress.as_ref() {
        report(100.0);
    }

    match merge_segments(&segments, destination).await {
        Ok(()) => {
            info!("Multi-threaded download completed successfully");
            true
        }
        Err(e) => {
            warn!("Segment merge failed: {}", e);
            false
        }
    }
}

/// Partitions `[0, file_size)` into `connections` contiguous ranges; the last
/// segment absorbs the division remainder.
fn partition_segments(
    file_size: u64,
    connections: usize,
    temp_dir: &Path,
) -> Vec<Arc<DownloadSegment>> {
    let segment_size = file_size / connections as u64;
    (0..connections)
        .map(|index| {
            let start = index as u64 * segment_size;
            let end = if index == connections - 1 {
                file_size - 1
            } else {
                start + segment_size - 1
            };
            Arc::new(DownloadSegment {
                start,
                end,
                index,
                temp_path: temp_dir.join(format!("segment_{}.tmp", index)),
                bytes_downloaded: AtomicU64::new(0),
            })
        })
        .collect()
}

/// Fetches one ranged segment into its temp file. Anything other than a
/// 206 response counts as failure.
async fn download_segment(url: &str, segment: &DownloadSegment) -> bool {
    let range = format!("bytes={}-{}", segment.start, segment.end);
    let response = match CLIENT.get(url).header(header::RANGE, range).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!("Segment {} failed: {}", segment.index, e);
            return false;
        }
    };
    if response.status() != StatusCode::PARTIAL_CONTENT {
        warn!(
            "Segment {}: Expected 206 Partial Content, got {}",
            segment.index,
            response.status()
        );
        return false;
    }

    let mut file = match tokio::fs::File::create(&segment.temp_path).await {
        Ok(f) => f,
        Err(e) => {
            warn!("Segment {} temp file failed: {}", segment.index, e);
            return false;
        }
    };
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                warn!("Segment {} failed: {}", segment.index, e);
                return false;
            }
        };
        if file.write_all(&chunk).await.is_err() {
            return false;
        }
        segment
            .bytes_downloaded
            .fetch_add(chunk.len() as u64, Ordering::Relaxed);
    }
    if file.flush().await.is_err() {
        return false;
    }

    info!(
        "Segment {} completed: {} bytes",
        segment.index,
        segment.bytes_downloaded()
    );
    true
}

/// Concatenates segment temp files into `destination` in index order.
async fn merge_segments(
    segments: &[Arc<DownloadSegment>],
    destination: &Path,
) -> OptimizerResult<()> {
    let mut output = tokio::fs::File::create(destination).await?;

    let mut ordered: Vec<&Arc<DownloadSegment>> = segments.iter().collect();
    ordered.sort_by_key(|s| s.index);

    for segment in ordered {
        if !segment.temp_path.is_file() {
            return Err(OptimizerError::download(format!(
                "Segment file not found: {}",
                segment.temp_path.display()
            )));
        }
        let mut input = tokio::fs::File::open(&segment.temp_path).await?;
        tokio::io::copy(&mut input, &mut output).await?;
    }
    output.flush().await?;

    info!("Merged {} segments into {}", segments.len(), destination.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_segments_partition_20mb_contiguously() {
        let size: u64 = 20 * 1024 * 1024;
        let segments = partition_segments(size, 4, Path::new("/tmp"));
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0].start, 0);
        assert_eq!(segments[3].end, size - 1);
        for pair in segments.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start, "gap or overlap between segments");
        }
        let total: u64 = segments.iter().map(|s| s.end - s.start + 1).sum();
        assert_eq!(total, size);
    }

    #[test]
    fn last_segment_absorbs_remainder() {
        let segments = partition_segments(10, 3, Path::new("/tmp"));
        assert_eq!((segments[0].start, segments[0].end), (0, 2));
        assert_eq!((segments[1].start, segments[1].end), (3, 5));
        assert_eq!((segments[2].start, segments[2].end), (6, 9));
    }

    #[tokio::test]
    async fn merge_concatenates_in_index_order() {
        let dir = tempfile::tempdir().unwrap();
        let segments = partition_segments(6, 2, dir.path());
        tokio::fs::write(&segments[0].temp_path, b"abc").await.unwrap();
        tokio::fs::write(&segments[1].temp_path, b"def").await.unwrap();

        let destination = dir.path().join("merged.bin");
        merge_segments(&segments, &destination).await.unwrap();
        assert_eq!(tokio::fs::read(&destination).await.unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn merge_fails_on_missing_segment() {
        let dir = tempfile::tempdir().unwrap();
        let segments = partition_segments(6, 2, dir.path());
        tokio::fs::write(&segments[0].temp_path, b"abc").await.unwrap();

        let destination = dir.path().join("merged.bin");
        assert!(merge_segments(&segments, &destination).await.is_err());
    }
}
