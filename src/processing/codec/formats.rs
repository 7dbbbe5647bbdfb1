//! Maps quality values to format-specific encoder settings.
//!
//! Quality is 1-100 lossy; any value of 101 or above is the lossless-WebP
//! sentinel and the numeric quality is ignored. PNG is always lossless and
//! carries the alpha path for icon-class assets that cannot use JPEG.

use image::{DynamicImage, ImageEncoder};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;

use crate::utils::{OptimizerError, OptimizerResult};

/// Quality at or above this value selects lossless WebP.
pub const LOSSLESS_QUALITY: u8 = 101;

/// Concrete encoding target for one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeFormat {
    Jpeg,
    WebP,
    Png,
}

/// Encodes `image` into `format` at `quality`.
///
/// JPEG drops alpha (flattened to RGB); WebP switches to lossless when
/// `quality >= LOSSLESS_QUALITY`; PNG ignores quality entirely.
pub fn encode(image: &DynamicImage, format: EncodeFormat, quality: u8) -> OptimizerResult<Vec<u8>> {
    match format {
        EncodeFormat::Jpeg => encode_jpeg(image, quality),
        EncodeFormat::WebP => encode_webp(image, quality),
        EncodeFormat::Png => encode_png(image),
    }
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> OptimizerResult<Vec<u8>> {
    let quality = quality.clamp(1, 100);
    let rgb = image.to_rgb8();
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder
        .write_image(rgb.as_raw(), rgb.width(), rgb.height(), image::ExtendedColorType::Rgb8)
        .map_err(|e| OptimizerError::format(format!("JPEG encode failed: {}", e)))?;
    Ok(buffer)
}

fn encode_webp(image: &DynamicImage, quality: u8) -> OptimizerResult<Vec<u8>> {
    let rgba = image.to_rgba8();
    let encoder = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height());
    let encoded = if quality >= LOSSLESS_QUALITY {
        encoder.encode_lossless()
    } else {
        encoder.encode(quality.clamp(1, 100) as f32)
    };
    Ok(encoded.to_vec())
}

fn encode_png(image: &DynamicImage) -> OptimizerResult<Vec<u8>> {
    let rgba = image.to_rgba8();
    let mut buffer = Vec::new();
    let encoder = PngEncoder::new(&mut buffer);
    encoder
        .write_image(rgba.as_raw(), rgba.width(), rgba.height(), image::ExtendedColorType::Rgba8)
        .map_err(|e| OptimizerError::format(format!("PNG encode failed: {}", e)))?;
    Ok(buffer)
}
