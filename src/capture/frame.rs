//! Frame data structures for captured camera content

use image::RgbaImage;
use std::time::Instant;

/// A frame delivered by a capture source
#[derive(Debug)]
pub struct CapturedFrame {
    /// RGBA pixels in raw sensor orientation
    pub image: RgbaImage,
    /// Monotonic sequence number assigned by the source
    pub sequence: u64,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl CapturedFrame {
    /// Create a new captured frame
    pub fn new(image: RgbaImage, sequence: u64) -> Self {
        Self {
            image,
            sequence,
            timestamp: Instant::now(),
        }
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}
