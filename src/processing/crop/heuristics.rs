//! Content-aware crop placement.
//!
//! All strategies share the same first stage (fit the target aspect ratio
//! inside the source) and differ only in where they position the crop window.
//! The scored strategies work on a downsampled copy (long edge capped at
//! 400 px) and slide a window over a per-pixel score map. Any failure inside
//! a scored strategy silently degrades to the center position; crop
//! heuristics must never abort the pipeline.

use image::RgbaImage;
use image::imageops::{self, FilterType};
use tracing::debug;

use crate::core::CropStrategy;
use super::CropRect;

/// Long-edge cap for the downsampled scoring copy.
const SAMPLE_LONG_EDGE: u32 = 400;
/// Local-variance window radius for the entropy strategy.
const ENTROPY_RADIUS: usize = 5;

/// Computes a crop rectangle matching the target aspect ratio.
///
/// The result always lies fully inside the source and its width/height never
/// exceed the source dimensions.
pub fn calculate_crop_rect(
    image: &RgbaImage,
    target_w: u32,
    target_h: u32,
    strategy: CropStrategy,
) -> CropRect {
    let src_w = image.width() as i32;
    let src_h = image.height() as i32;
    let target_ratio = target_w as f64 / target_h as f64;
    let source_ratio = src_w as f64 / src_h as f64;

    let (mut crop_w, mut crop_h);
    if source_ratio > target_ratio {
        // Source is wider - crop width
        crop_h = src_h;
        crop_w = (crop_h as f64 * target_ratio).round() as i32;
    } else {
        // Source is taller - crop height
        crop_w = src_w;
        crop_h = (crop_w as f64 / target_ratio).round() as i32;
    }
    crop_w = crop_w.clamp(1, src_w);
    crop_h = crop_h.clamp(1, src_h);

    let center = center_position(src_w, src_h, crop_w, crop_h);
    let (x, y) = match strategy {
        CropStrategy::Center => center,
        CropStrategy::Smart | CropStrategy::Entropy | CropStrategy::Attention => {
            match scored_position(image, crop_w, crop_h, strategy) {
                Some(position) => position,
                None => {
                    debug!("Scored crop ({:?}) unavailable, falling back to center", strategy);
                    center
                }
            }
        }
    };

    CropRect::new(x, y, crop_w, crop_h)
}

fn center_position(src_w: i32, src_h: i32, crop_w: i32, crop_h: i32) -> (i32, i32) {
    ((src_w - crop_w) / 2, (src_h - crop_h) / 2)
}

/// Positions the crop window by maximizing a strategy-specific score map.
/// Returns `None` on any condition that would make the result unreliable.
fn scored_position(
    image: &RgbaImage,
    crop_w: i32,
    crop_h: i32,
    strategy: CropStrategy,
) -> Option<(i32, i32)> {
    let src_w = image.width();
    let src_h = image.height();
    if src_w == 0 || src_h == 0 {
        return None;
    }

    let long_edge = src_w.max(src_h);
    let sample = if long_edge > SAMPLE_LONG_EDGE {
        let scale = SAMPLE_LONG_EDGE as f64 / long_edge as f64;
        let sample_w = ((src_w as f64 * scale).round() as u32).max(1);
        let sample_h = ((src_h as f64 * scale).round() as u32).max(1);
        imageops::resize(image, sample_w, sample_h, FilterType::CatmullRom)
    } else {
        image.clone()
    };

    let map = match strategy {
        CropStrategy::Smart => edge_map(&sample)?,
        CropStrategy::Entropy => entropy_map(&sample)?,
        CropStrategy::Attention => attention_map(&sample)?,
        CropStrategy::Center => return None,
    };

    let scale_x = src_w as f64 / sample.width() as f64;
    let scale_y = src_h as f64 / sample.height() as f64;
    let sample_crop_w = ((crop_w as f64 / scale_x) as usize).clamp(1, map.width);
    let sample_crop_h = ((crop_h as f64 / scale_y) as usize).clamp(1, map.height);

    let (best_x, best_y) = find_best_position(&map, sample_crop_w, sample_crop_h)?;

    // Scale the winning top-left back to source coordinates and clamp.
    let x = ((best_x as f64 * scale_x) as i32).clamp(0, (src_w as i32 - crop_w).max(0));
    let y = ((best_y as f64 * scale_y) as i32).clamp(0, (src_h as i32 - crop_h).max(0));
    Some((x, y))
}

/// Row-major per-pixel score map over the downsampled image.
struct ScoreMap {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl ScoreMap {
    fn zeroed(width: usize, height: usize) -> Self {
        Self { width, height, data: vec![0.0; width * height] }
    }

    #[inline]
    fn at(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    #[inline]
    fn set(&mut self, x: usize, y: usize, value: f64) {
        self.data[y * self.width + x] = value;
    }
}

fn grayscale(image: &RgbaImage) -> Vec<i32> {
    image
        .pixels()
        .map(|p| (p.0[0] as i32 + p.0[1] as i32 + p.0[2] as i32) / 3)
        .collect()
}

/// Edge intensity via a 3x3 Sobel operator on the averaged-channel grayscale.
fn edge_map(image: &RgbaImage) -> Option<ScoreMap> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    if width < 3 || height < 3 {
        return None;
    }

    let gray = grayscale(image);
    let at = |x: usize, y: usize| gray[y * width + x];
    let mut map = ScoreMap::zeroed(width, height);

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            // Gx = [-1 0 1; -2 0 2; -1 0 1], Gy = [-1 -2 -1; 0 0 0; 1 2 1]
            let gx = -at(x - 1, y - 1) + at(x + 1, y - 1)
                - 2 * at(x - 1, y) + 2 * at(x + 1, y)
                - at(x - 1, y + 1) + at(x + 1, y + 1);
            let gy = -at(x - 1, y - 1) - 2 * at(x, y - 1) - at(x + 1, y - 1)
                + at(x - 1, y + 1) + 2 * at(x, y + 1) + at(x + 1, y + 1);
            map.set(x, y, ((gx * gx + gy * gy) as f64).sqrt());
        }
    }
    Some(map)
}

/// Local variance (`mean(x^2) - mean(x)^2`) of the grayscale in a
/// radius-[`ENTROPY_RADIUS`] window.
fn entropy_map(image: &RgbaImage) -> Option<ScoreMap> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let r = ENTROPY_RADIUS;
    if width <= 2 * r || height <= 2 * r {
        return None;
    }

    let gray = grayscale(image);
    let at = |x: usize, y: usize| gray[y * width + x];
    let mut map = ScoreMap::zeroed(width, height);

    for y in r..height - r {
        for x in r..width - r {
            let mut sum = 0.0;
            let mut sum_sq = 0.0;
            let mut count = 0usize;
            for wy in y - r..=y + r {
                for wx in x - r..=x + r {
                    let value = at(wx, wy) as f64;
                    sum += value;
                    sum_sq += value * value;
                    count += 1;
                }
            }
            let mean = sum / count as f64;
            map.set(x, y, sum_sq / count as f64 - mean * mean);
        }
    }
    Some(map)
}

/// Brightness + saturation, weighted towards the image center.
fn attention_map(image: &RgbaImage) -> Option<ScoreMap> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    if width == 0 || height == 0 {
        return None;
    }

    let center_x = width as f64 / 2.0;
    let center_y = height as f64 / 2.0;
    let max_distance = (center_x * center_x + center_y * center_y).sqrt();
    let mut map = ScoreMap::zeroed(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        let r = pixel.0[0] as f64;
        let g = pixel.0[1] as f64;
        let b = pixel.0[2] as f64;

        let brightness = (r + g + b) / 3.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let saturation = if max == 0.0 { 0.0 } else { (max - min) / max };

        let dx = x as f64 - center_x;
        let dy = y as f64 - center_y;
        let distance = (dx * dx + dy * dy).sqrt();
        // 30% bias towards the center
        let center_bias = 1.0 - (distance / max_distance) * 0.3;

        // Both components on the 0-255 scale before weighting
        let score = (brightness * 0.7 + saturation * 255.0 * 0.3) * center_bias;
        map.set(x as usize, y as usize, score);
    }
    Some(map)
}

/// Slides the crop window over the map and returns the top-left with the
/// highest average score. Interior points are sampled at the same stride as
/// the window positions.
fn find_best_position(map: &ScoreMap, crop_w: usize, crop_h: usize) -> Option<(usize, usize)> {
    if crop_w > map.width || crop_h > map.height {
        return None;
    }

    let step = (crop_w.min(crop_h) / 20).max(1);
    let mut best_score = f64::MIN;
    let mut best = None;

    let mut y = 0;
    while y <= map.height - crop_h {
        let mut x = 0;
        while x <= map.width - crop_w {
            let mut score = 0.0;
            let mut count = 0usize;
            let mut dy = 0;
            while dy < crop_h {
                let mut dx = 0;
                while dx < crop_w {
                    score += map.at(x + dx, y + dy);
                    count += 1;
                    dx += step;
                }
                dy += step;
            }
            score /= count as f64;
            if score > best_score {
                best_score = score;
                best = Some((x, y));
            }
            x += step;
        }
        y += step;
    }
    best
}
