//! Encode/decode abstraction plus crop and resize execution.
//!
//! Thin layer over the `image` and `webp` crates; all pixel work in the
//! pipeline goes through here. Decode failures on corrupt or unsupported
//! input surface as [`OptimizerError::Format`], never a panic.
//!
//! [`OptimizerError::Format`]: crate::utils::OptimizerError

mod formats;

pub use formats::{EncodeFormat, LOSSLESS_QUALITY, encode};

use image::DynamicImage;
use image::imageops::FilterType;

use crate::processing::crop::CropRect;
use crate::utils::{OptimizerError, OptimizerResult};

/// Decodes an image from raw bytes, sniffing the format.
pub fn decode(bytes: &[u8]) -> OptimizerResult<DynamicImage> {
    image::load_from_memory(bytes)
        .map_err(|e| OptimizerError::format(format!("Decode failed: {}", e)))
}

/// Extracts `rect` from `image`.
///
/// The rectangle must be committed geometry (in bounds, not the skip
/// sentinel); out-of-range rectangles are a caller bug and reported as a
/// processing error rather than clamped silently.
pub fn crop(image: &DynamicImage, rect: CropRect) -> OptimizerResult<DynamicImage> {
    if !rect.in_bounds(image.width() as i32, image.height() as i32) {
        return Err(OptimizerError::processing(format!(
            "Crop rect {:?} outside {}x{} source",
            rect,
            image.width(),
            image.height()
        )));
    }
    Ok(image.crop_imm(rect.x as u32, rect.y as u32, rect.width as u32, rect.height as u32))
}

/// Resizes to exactly `width` x `height` (stretch semantics, no aspect
/// preservation) with a CatmullRom resampler.
pub fn resize(image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    image.resize_exact(width, height, FilterType::CatmullRom)
}
