//! Interactive crop-overlay geometry.
//!
//! Pure state machine behind the crop inspection UI: the host feeds pointer
//! events in image space, this module owns the rectangle. The live rectangle
//! is always authoritative; releasing a drag just returns to `Idle` with no
//! commit/rollback step.

use super::CropRect;

/// Minimum crop dimension; undersized results are grown back to this floor.
pub const MIN_CROP_SIZE: i32 = 50;

/// Named grab points on the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    /// Anywhere inside the rectangle: translate only
    Body,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Top,
    Bottom,
    Left,
    Right,
}

impl Handle {
    fn is_corner(self) -> bool {
        matches!(
            self,
            Handle::TopLeft | Handle::TopRight | Handle::BottomLeft | Handle::BottomRight
        )
    }

    fn moves_top_edge(self) -> bool {
        matches!(self, Handle::TopLeft | Handle::TopRight | Handle::Top)
    }

    fn moves_left_edge(self) -> bool {
        matches!(self, Handle::TopLeft | Handle::BottomLeft | Handle::Left)
    }
}

#[derive(Debug, Clone, Copy)]
enum DragState {
    Idle,
    Dragging {
        handle: Handle,
        start_rect: CropRect,
        start_x: i32,
        start_y: i32,
    },
}

/// Drag/resize state machine over one crop rectangle.
///
/// Corner drags re-lock to the aspect ratio of the rectangle captured at
/// drag start (not the session's original target ratio), so edge drags can
/// change the working ratio and corner drags then preserve it. Edge drags
/// adjust one dimension freely; `Body` only translates.
pub struct CropOverlay {
    rect: CropRect,
    source_w: i32,
    source_h: i32,
    state: DragState,
}

impl CropOverlay {
    pub fn new(rect: CropRect, source_w: i32, source_h: i32) -> Self {
        Self { rect, source_w, source_h, state: DragState::Idle }
    }

    /// Current rectangle (live, authoritative).
    pub fn rect(&self) -> CropRect {
        self.rect
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    /// Press over a handle: capture the start rectangle and pointer position.
    pub fn begin_drag(&mut self, handle: Handle, x: i32, y: i32) {
        self.state = DragState::Dragging {
            handle,
            start_rect: self.rect,
            start_x: x,
            start_y: y,
        };
    }

    /// Pointer move while dragging; no-op when idle.
    pub fn drag_to(&mut self, x: i32, y: i32) {
        let DragState::Dragging { handle, start_rect, start_x, start_y } = self.state else {
            return;
        };
        let dx = x - start_x;
        let dy = y - start_y;

        let mut rect = apply_delta(start_rect, handle, dx, dy);
        if handle.is_corner() {
            rect = relock_aspect(rect, start_rect, handle);
        }
        self.rect = constrain(rect, self.source_w, self.source_h);
    }

    /// Release: back to idle. The rectangle keeps its last dragged value.
    pub fn end_drag(&mut self) {
        self.state = DragState::Idle;
    }
}

fn apply_delta(start: CropRect, handle: Handle, dx: i32, dy: i32) -> CropRect {
    let mut rect = start;
    match handle {
        Handle::Body => {
            rect.x += dx;
            rect.y += dy;
        }
        Handle::TopLeft => {
            rect.x += dx;
            rect.y += dy;
            rect.width -= dx;
            rect.height -= dy;
        }
        Handle::TopRight => {
            rect.y += dy;
            rect.width += dx;
            rect.height -= dy;
        }
        Handle::BottomLeft => {
            rect.x += dx;
            rect.width -= dx;
            rect.height += dy;
        }
        Handle::BottomRight => {
            rect.width += dx;
            rect.height += dy;
        }
        Handle::Top => {
            rect.y += dy;
            rect.height -= dy;
        }
        Handle::Bottom => {
            rect.height += dy;
        }
        Handle::Left => {
            rect.x += dx;
            rect.width -= dx;
        }
        Handle::Right => {
            rect.width += dx;
        }
    }
    rect
}

/// Re-locks a corner-dragged rectangle to the drag-start aspect ratio.
///
/// Tie-break: derive the width from the new height; when that derived width
/// is at least the raw width, keep it, otherwise derive the height from the
/// raw width instead. The asymmetric `>=` boundary is intentional; UI feel
/// depends on it.
fn relock_aspect(mut rect: CropRect, start: CropRect, handle: Handle) -> CropRect {
    if start.height <= 0 || rect.height <= 0 {
        return rect;
    }
    let aspect = start.width as f64 / start.height as f64;

    let derived_width = (rect.height as f64 * aspect).round() as i32;
    if derived_width >= rect.width {
        rect.width = derived_width;
    } else {
        rect.height = (rect.width as f64 / aspect).round() as i32;
    }

    // Re-anchor the opposite edges for top/left corner handles
    if handle.moves_top_edge() {
        rect.y = start.y + start.height - rect.height;
    }
    if handle.moves_left_edge() {
        rect.x = start.x + start.width - rect.width;
    }
    rect
}

/// Floor to the minimum size (growing only), shrink-to-fit when the source is
/// smaller than the rectangle, then clamp position so the result stays inside
/// the source.
fn constrain(mut rect: CropRect, source_w: i32, source_h: i32) -> CropRect {
    if rect.width < MIN_CROP_SIZE {
        rect.width = MIN_CROP_SIZE;
    }
    if rect.height < MIN_CROP_SIZE {
        rect.height = MIN_CROP_SIZE;
    }
    if rect.width > source_w {
        rect.width = source_w;
    }
    if rect.height > source_h {
        rect.height = source_h;
    }
    rect.x = rect.x.clamp(0, (source_w - rect.width).max(0));
    rect.y = rect.y.clamp(0, (source_h - rect.height).max(0));
    rect
}
