//! Camera state, lock options, and fit-to-content math.
//!
//! A replica's camera is plain pan/zoom state. Whether the user may move it is
//! governed separately by [`CameraOptions`]: a locked camera ignores user
//! panning and zooming and only moves through a forced fit.

#[cfg(test)]
#[path = "camera_test.rs"]
mod camera_test;

use serde::{Deserialize, Serialize};

/// Width and height of a viewport or of the slide canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

impl CanvasSize {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned rectangle in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Bounds {
    #[must_use]
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Bounds anchored at the origin covering `size`.
    #[must_use]
    pub fn of_size(size: CanvasSize) -> Self {
        Self::new(0.0, 0.0, size.width, size.height)
    }

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        let min_x = self.x.min(other.x);
        let min_y = self.y.min(other.y);
        let max_x = (self.x + self.w).max(other.x + other.w);
        let max_y = (self.y + self.h).max(other.y + other.h);
        Self::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.w <= 0.0 || self.h <= 0.0
    }
}

/// Where a replica's camera sits: screen-pixel pan plus a zoom factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub pan_x: f64,
    pub pan_y: f64,
    pub zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self { pan_x: 0.0, pan_y: 0.0, zoom: 1.0 }
    }
}

impl Camera {
    /// Camera that shows all of `content` centred in `viewport`.
    ///
    /// Degenerate content or viewports yield the default camera.
    #[must_use]
    pub fn fit(viewport: CanvasSize, content: Bounds) -> Self {
        if content.is_degenerate() || viewport.width <= 0.0 || viewport.height <= 0.0 {
            return Self::default();
        }
        let zoom = (viewport.width / content.w).min(viewport.height / content.h);
        Self {
            pan_x: (viewport.width - content.w * zoom) / 2.0 - content.x * zoom,
            pan_y: (viewport.height - content.h * zoom) / 2.0 - content.y * zoom,
            zoom,
        }
    }
}

/// What the mouse wheel does on an unlocked camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WheelBehavior {
    None,
    Pan,
    Zoom,
}

/// User-facing camera constraints for one replica.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraOptions {
    pub locked: bool,
    pub wheel: WheelBehavior,
    pub pan_speed: f64,
    pub zoom_speed: f64,
    pub bounds: Bounds,
}

impl CameraOptions {
    /// Classroom defaults: locked, no wheel, no pan/zoom speed, bounded to
    /// the slide canvas.
    #[must_use]
    pub fn classroom(canvas: CanvasSize) -> Self {
        Self {
            locked: true,
            wheel: WheelBehavior::None,
            pan_speed: 0.0,
            zoom_speed: 0.0,
            bounds: Bounds::of_size(canvas),
        }
    }

    #[must_use]
    pub fn with_locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }
}

/// Parameters of a fit-to-content request.
///
/// `force` fits even when the camera is locked; `immediate` skips the
/// animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitRequest {
    pub force: bool,
    pub immediate: bool,
}

impl FitRequest {
    /// Forced, unanimated. Used after every forced navigation.
    pub const IMMEDIATE: Self = Self { force: true, immediate: true };
    /// Forced, animated. Used after removing content.
    pub const FORCED: Self = Self { force: true, immediate: false };
}
