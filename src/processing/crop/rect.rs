//! Crop rectangle in source-image pixel space.

use serde::{Deserialize, Serialize};

/// Integer crop rectangle.
///
/// Committed rectangles satisfy `0 <= x`, `0 <= y`, `x + width <= source_width`
/// and `y + height <= source_height`. The [`CropRect::SKIP`] sentinel encodes
/// "skip optimization, keep the raw file"; callers must check [`is_skip`]
/// before treating a rectangle as geometry.
///
/// [`is_skip`]: CropRect::is_skip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl CropRect {
    /// Sentinel: keep the raw file, no crop or re-encode.
    pub const SKIP: CropRect = CropRect { x: -1, y: -1, width: -1, height: -1 };

    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_skip(&self) -> bool {
        *self == Self::SKIP
    }

    /// Whether this rectangle lies fully inside a `source_w` x `source_h` image.
    pub fn in_bounds(&self, source_w: i32, source_h: i32) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.width > 0
            && self.height > 0
            && self.x + self.width <= source_w
            && self.y + self.height <= source_h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_sentinel_is_not_geometry() {
        assert!(CropRect::SKIP.is_skip());
        assert!(!CropRect::new(0, 0, 10, 10).is_skip());
        assert!(!CropRect::SKIP.in_bounds(100, 100));
    }

    #[test]
    fn bounds_check() {
        assert!(CropRect::new(0, 0, 100, 50).in_bounds(100, 50));
        assert!(!CropRect::new(1, 0, 100, 50).in_bounds(100, 50));
        assert!(!CropRect::new(0, 0, 0, 50).in_bounds(100, 50));
    }
}
