//! Normalized ↔ screen pixel coordinate mapping.
//!
//! The model answers on a 0–1000 grid relative to the (possibly downscaled)
//! capture. Screen pixels are recovered as `image / scale`.

use crate::agent_engine::state::{Point, COORD_LIMIT};
use crate::perception::types::CaptureResult;

/// Side of the normalized grid.
pub const NORMALIZED_SPAN: f64 = 1000.0;

/// Screen pixel position produced by [`to_screen`].
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    /// Back to capture-image pixels, for drawing on the screenshot.
    pub fn to_image(&self, scale: f64) -> (i64, i64) {
        let scale = sanitize_scale(scale);
        ((self.x * scale) as i64, (self.y * scale) as i64)
    }
}

/// Clamp a coordinate to `[-100000, 100000]`. NaN becomes 0.
pub fn clamp(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(-COORD_LIMIT, COORD_LIMIT)
    }
}

/// Map a normalized point to screen pixels. Never fails.
///
/// With known image dimensions the point is scaled from the 0–1000 grid to
/// image pixels first; otherwise it is taken as image pixels already. The
/// result is divided by `scale` and clamped to `[0, 100000]`.
pub fn to_screen(
    x_norm: f64,
    y_norm: f64,
    scale: f64,
    img_w: Option<u32>,
    img_h: Option<u32>,
) -> ScreenPoint {
    let x = clamp(x_norm);
    let y = clamp(y_norm);

    let (x_abs, y_abs) = match (img_w, img_h) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (
            x / NORMALIZED_SPAN * w as f64,
            y / NORMALIZED_SPAN * h as f64,
        ),
        _ => (x, y),
    };

    let scale = sanitize_scale(scale);
    let x_px = clamp(x_abs / scale);
    let y_px = clamp(y_abs / scale);

    ScreenPoint {
        x: x_px.clamp(0.0, COORD_LIMIT),
        y: y_px.clamp(0.0, COORD_LIMIT),
    }
}

/// Map a point using the geometry of a capture.
pub fn point_to_screen(point: Point, capture: &CaptureResult) -> ScreenPoint {
    to_screen(
        point.x,
        point.y,
        capture.scale,
        Some(capture.width),
        Some(capture.height),
    )
}

/// Anything outside `(0, 1]` is treated as no downscale.
fn sanitize_scale(scale: f64) -> f64 {
    if scale.is_finite() && scale > 0.0 && scale <= 1.0 {
        scale
    } else {
        1.0
    }
}
