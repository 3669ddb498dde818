//! Region mapping from on-screen guide box to raw frame pixels
//!
//! The operator aligns the barcode with a guide box drawn over the preview.
//! The preview may be scaled relative to the sensor, so the guide box is
//! expressed as fractions of the displayed video rectangle and those
//! fractions are applied to the frame's true pixel size.

use serde::{Deserialize, Serialize};

/// A rectangle in screen (layout) coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self { left, top, width, height }
    }

    /// Whether the rectangle has been laid out with a visible area
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// Sub-rectangle of a frame in raw pixel units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionOfInterest {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl RegionOfInterest {
    /// The zero-size region returned while layout or frames are not ready
    pub const NOT_READY: Self = Self { x: 0, y: 0, width: 0, height: 0 };

    /// A zero-size region means the cycle must be skipped
    pub fn is_ready(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// (x, y, width, height) tuple, the layout used by the image crate
    pub fn bounds(&self) -> (u32, u32, u32, u32) {
        (self.x, self.y, self.width, self.height)
    }
}

/// Source of the current on-screen layout
///
/// Queried every sampling cycle because the guide box can move when the
/// layout reflows.
pub trait GuideLayout: Send + Sync {
    /// Displayed rectangle of the video preview
    fn video_rect(&self) -> ScreenRect;
    /// Displayed rectangle of the guide box
    fn guide_rect(&self) -> ScreenRect;
}

/// Fixed layout taken from configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StaticLayout {
    pub video: ScreenRect,
    pub guide: ScreenRect,
}

impl GuideLayout for StaticLayout {
    fn video_rect(&self) -> ScreenRect {
        self.video
    }

    fn guide_rect(&self) -> ScreenRect {
        self.guide
    }
}

/// Map the guide box onto the frame's pixel grid.
///
/// Origin is clamped to `[0, dim - 1]` and size to `[1, dim - origin]`, so a
/// ready region never leaves the frame and never has zero area.
pub fn map_guide_box(
    video: ScreenRect,
    guide: ScreenRect,
    frame_width: u32,
    frame_height: u32,
) -> RegionOfInterest {
    if !video.has_area() || frame_width == 0 || frame_height == 0 {
        return RegionOfInterest::NOT_READY;
    }

    let rx = (guide.left - video.left) / video.width;
    let ry = (guide.top - video.top) / video.height;
    let rw = guide.width / video.width;
    let rh = guide.height / video.height;

    let (x, width) = clamp_axis(rx, rw, frame_width);
    let (y, height) = clamp_axis(ry, rh, frame_height);

    RegionOfInterest { x, y, width, height }
}

/// Scale one axis and clamp it into `[0, dim)`
fn clamp_axis(origin_frac: f64, size_frac: f64, dim: u32) -> (u32, u32) {
    let dim_f = dim as f64;
    // `as u32` maps NaN to 0
    let origin = (origin_frac * dim_f).floor().clamp(0.0, (dim - 1) as f64) as u32;
    let size = (size_frac * dim_f).floor().clamp(1.0, (dim - origin) as f64) as u32;
    (origin, size)
}
