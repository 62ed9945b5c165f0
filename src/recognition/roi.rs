//! Rectangle algebra for regions of interest.
//!
//! The host scales every captured frame so that its shorter edge is 720
//! pixels; all recognition boxes live in that scaled space.

use crate::host::Rect;

/// Length the host scales the shorter image edge to.
pub const SHORT_EDGE: u32 = 720;

/// Minimal rectangle covering both inputs.
///
/// A rectangle with zero width and height stands for "no region" and
/// leaves the other side unchanged.
pub fn union(a: Rect, b: Rect) -> Rect {
    if a.width == 0 && a.height == 0 {
        return b;
    }
    if b.width == 0 && b.height == 0 {
        return a;
    }

    let left = a.x.min(b.x);
    let top = a.y.min(b.y);
    let right = a.right().max(b.right());
    let bottom = a.bottom().max(b.bottom());
    Rect::new(left, top, right.saturating_sub(left), bottom.saturating_sub(top))
}

/// Overlap of two rectangles, `Rect::ZERO` when they do not overlap.
pub fn intersection(a: Rect, b: Rect) -> Rect {
    let left = a.x.max(b.x);
    let top = a.y.max(b.y);
    let right = a.right().min(b.right());
    let bottom = a.bottom().min(b.bottom());

    if left >= right || top >= bottom {
        return Rect::ZERO;
    }
    Rect::new(left, top, right.saturating_sub(left), bottom.saturating_sub(top))
}

/// Shifts and resizes a rectangle. No clamping: the result may leave the
/// screen or have a negative size until it is clipped.
pub fn offset(r: Rect, dx: i32, dy: i32, dw: i32, dh: i32) -> Rect {
    Rect::new(
        r.x.saturating_add(dx),
        r.y.saturating_add(dy),
        r.width.saturating_add(dw),
        r.height.saturating_add(dh),
    )
}

/// Full-screen rectangle for a captured image of the given size.
///
/// The shorter edge becomes 720 and the longer edge keeps the aspect ratio,
/// truncated toward zero.
pub fn full_screen(image_width: u32, image_height: u32) -> Rect {
    if image_width == 0 || image_height == 0 {
        return Rect::ZERO;
    }

    let (w, h) = (image_width as u64, image_height as u64);
    let short = SHORT_EDGE as u64;
    let (width, height) = if w <= h {
        (short, h * short / w)
    } else {
        (w * short / h, short)
    };
    Rect::new(
        0,
        0,
        i32::try_from(width).unwrap_or(i32::MAX),
        i32::try_from(height).unwrap_or(i32::MAX),
    )
}

/// Maps the all-zero box the host reports for full-screen hits to the
/// actual screen rectangle. Other boxes are returned unchanged.
pub fn normalize(r: Rect, screen: Rect) -> Rect {
    if r.is_zero() { screen } else { r }
}

/// Clips `r` to the screen. `None` when nothing of it is on screen.
pub fn clip(r: Rect, screen: Rect) -> Option<Rect> {
    let clipped = intersection(r, screen);
    if clipped.is_zero() { None } else { Some(clipped) }
}
