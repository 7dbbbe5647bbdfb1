//! Directory scanning and positional output naming.

use std::path::{Path, PathBuf};

use crate::core::OutputFormat;

/// Source extensions accepted as preview candidates.
pub const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tiff", "webp"];

pub fn is_image_ext(ext: &str) -> bool {
    IMAGE_EXTS.contains(&ext.to_lowercase().as_str())
}

/// Canonical positional name: index 0 is unsuffixed, later indices get a
/// zero-padded two-digit ordinal.
pub fn preview_name(index: usize, format: OutputFormat) -> String {
    if index == 0 {
        format!("preview.{}", format.extension())
    } else {
        format!("preview-{:02}.{}", index, format.extension())
    }
}

/// Whether `name` is one of the canonical positional preview names for
/// `format` (case-insensitive).
pub fn is_canonical_preview_name(name: &str, format: OutputFormat) -> bool {
    let name = name.to_lowercase();
    let ext = format.extension();
    if name == format!("preview.{}", ext) {
        return true;
    }
    let Some(rest) = name.strip_prefix("preview-") else {
        return false;
    };
    let Some(digits) = rest.strip_suffix(&format!(".{}", ext)) else {
        return false;
    };
    digits.len() == 2 && digits.chars().all(|c| c.is_ascii_digit())
}

fn file_name_lower(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn has_image_ext(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(is_image_ext)
}

/// `_original` staging files are recovery artifacts, never fresh candidates.
fn is_staging_artifact(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.to_lowercase().ends_with("_original"))
}

/// All preview-candidate image files in `dir` (stem starts with "preview",
/// case-insensitive), sorted by name for deterministic ordinals.
pub fn find_preview_sources(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut sources: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| has_image_ext(path))
        .filter(|path| !is_staging_artifact(path))
        .filter(|path| file_name_lower(path).starts_with("preview"))
        .collect();
    sources.sort();
    Ok(sources)
}

/// Category preview candidates: existing catprev files first, then
/// catpreview/preview files, each group name-sorted.
pub fn find_category_sources(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut catprev = Vec::new();
    let mut other = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || !has_image_ext(&path) || is_staging_artifact(&path) {
            continue;
        }
        let name = file_name_lower(&path);
        if name.starts_with("catprev") && !name.starts_with("catpreview") {
            catprev.push(path);
        } else if name.starts_with("catpreview") || name.starts_with("preview") {
            other.push(path);
        }
    }
    catprev.sort();
    other.sort();
    catprev.extend(other);
    Ok(catprev)
}

/// Already-optimized detection: a minitile plus a canonical main preview.
///
/// Known ambiguity carried over from the original behavior: a prior run
/// interrupted after creating the minitile but before all previews still
/// counts as optimized.
pub fn already_optimized(dir: &Path, format: OutputFormat) -> bool {
    let ext = format.extension();
    dir.join(format!("minitile.{}", ext)).is_file()
        && dir.join(format!("preview.{}", ext)).is_file()
}

/// `name.ext` -> `name_original.ext` staging path next to `path`.
pub fn original_name(path: &Path) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => path.with_file_name(format!("{}_original.{}", stem, ext)),
        None => path.with_file_name(format!("{}_original", stem)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OutputFormat;

    #[test]
    fn positional_names() {
        assert_eq!(preview_name(0, OutputFormat::Jpeg), "preview.jpg");
        assert_eq!(preview_name(1, OutputFormat::Jpeg), "preview-01.jpg");
        assert_eq!(preview_name(12, OutputFormat::WebP), "preview-12.webp");
    }

    #[test]
    fn canonical_name_detection() {
        assert!(is_canonical_preview_name("preview.jpg", OutputFormat::Jpeg));
        assert!(is_canonical_preview_name("Preview-07.JPG", OutputFormat::Jpeg));
        assert!(!is_canonical_preview_name("preview-7.jpg", OutputFormat::Jpeg));
        assert!(!is_canonical_preview_name("preview_old.jpg", OutputFormat::Jpeg));
        assert!(!is_canonical_preview_name("preview.jpg", OutputFormat::WebP));
        assert!(!is_canonical_preview_name("preview-001.jpg", OutputFormat::Jpeg));
    }

    #[test]
    fn original_staging_name() {
        assert_eq!(
            original_name(Path::new("/mods/x/preview.jpg")),
            Path::new("/mods/x/preview_original.jpg")
        );
    }

    #[test]
    fn source_scan_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "preview-01.jpg",
            "preview.jpg",
            "readme.txt",
            "banner.png",
            "PreviewExtra.png",
            "preview_original.jpg",
        ] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let sources = find_preview_sources(dir.path()).unwrap();
        let names: Vec<_> = sources
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["PreviewExtra.png", "preview-01.jpg", "preview.jpg"]);
    }

    #[test]
    fn category_scan_prioritizes_catprev() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["preview.jpg", "catprev.png", "catpreview.jpg"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let sources = find_category_sources(dir.path()).unwrap();
        let names: Vec<_> = sources
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["catprev.png", "catpreview.jpg", "preview.jpg"]);
    }
}
