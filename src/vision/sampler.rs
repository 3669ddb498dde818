//! Frame sampling and preprocessing for barcode decoding
//!
//! Crops the region of interest out of the current frame, upscales it with
//! smoothing, and produces the preprocessing variants the decoder walks
//! through. Variants are never composed: every transform starts from the
//! unmodified crop.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tracing::warn;

use super::region::RegionOfInterest;

/// Off-screen raster handed to decoder backends (RGBA)
pub type Raster = RgbaImage;

/// Allowed range for the enhance transform's contrast factor
pub const CONTRAST_RANGE: std::ops::RangeInclusive<f32> = 1.3..=1.4;

/// Largest accepted upscale factor
pub const MAX_SCALE: f32 = 4.0;

/// Longest side of any sampled raster, in pixels
pub const MAX_RASTER_DIM: u32 = 4096;

/// Preprocessing transform applied to a sampled raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// Identity
    Raw,
    /// Luminance with a contrast stretch around mid-grey
    Enhance,
    /// Per-channel inversion of the raw crop
    Invert,
}

impl Transform {
    /// Default order: cheapest first, recovery passes last
    pub const DEFAULT_ORDER: [Transform; 3] = [Transform::Raw, Transform::Enhance, Transform::Invert];

    pub fn label(&self) -> &'static str {
        match self {
            Transform::Raw => "raw",
            Transform::Enhance => "enhance",
            Transform::Invert => "invert",
        }
    }
}

/// Sampling configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    /// Upscale factors, tried in order
    pub scales: Vec<f32>,
    /// Preprocessing transforms, tried in order for each scale
    pub transforms: Vec<Transform>,
    /// Contrast factor used by [`Transform::Enhance`]
    pub enhance_contrast: f32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            scales: vec![1.5, 2.0],
            transforms: Transform::DEFAULT_ORDER.to_vec(),
            enhance_contrast: 1.35,
        }
    }
}

/// Crops and preprocesses the region of interest
#[derive(Debug, Clone)]
pub struct FrameSampler {
    config: SamplerConfig,
}

impl FrameSampler {
    /// Create a sampler, repairing configuration that would make sampling impossible
    pub fn new(mut config: SamplerConfig) -> Self {
        config.scales.retain(|s| s.is_finite() && *s > 0.0);
        for scale in config.scales.iter_mut().filter(|s| **s > MAX_SCALE) {
            warn!("ROI scale {} above {}, using {}", scale, MAX_SCALE, MAX_SCALE);
            *scale = MAX_SCALE;
        }
        if config.scales.is_empty() {
            warn!("No valid ROI scales configured, using 1.0");
            config.scales.push(1.0);
        }
        if config.transforms.is_empty() {
            config.transforms.push(Transform::Raw);
        }
        if !CONTRAST_RANGE.contains(&config.enhance_contrast) {
            let clamped = config
                .enhance_contrast
                .clamp(*CONTRAST_RANGE.start(), *CONTRAST_RANGE.end());
            warn!(
                "Enhance contrast {} outside {:?}, using {}",
                config.enhance_contrast, CONTRAST_RANGE, clamped
            );
            config.enhance_contrast = clamped;
        }
        Self { config }
    }

    pub fn scales(&self) -> &[f32] {
        &self.config.scales
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.config.transforms
    }

    /// Crop `roi` out of `frame` and resize it by `scale` with smoothing
    pub fn sample(&self, frame: &RgbaImage, roi: RegionOfInterest, scale: f32) -> Raster {
        let (x, y, w, h) = roi.bounds();
        let crop = imageops::crop_imm(frame, x, y, w, h).to_image();
        let (dw, dh) = scaled_size(w, h, scale);
        imageops::resize(&crop, dw, dh, FilterType::Triangle)
    }

    /// Produce the `transform` variant of an unmodified crop
    pub fn variant<'a>(&self, base: &'a Raster, transform: Transform) -> Cow<'a, Raster> {
        match transform {
            Transform::Raw => Cow::Borrowed(base),
            Transform::Enhance => {
                let mut raster = base.clone();
                apply_enhance(&mut raster, self.config.enhance_contrast);
                Cow::Owned(raster)
            }
            Transform::Invert => {
                let mut raster = base.clone();
                apply_invert(&mut raster);
                Cow::Owned(raster)
            }
        }
    }
}

/// Target raster size for a crop, never smaller than 1x1.
///
/// The scale is reduced so the longest side fits in [`MAX_RASTER_DIM`].
pub fn scaled_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
    let limit = MAX_RASTER_DIM as f64;
    let longest = width.max(height).max(1) as f64;
    let scale = (scale as f64).min(limit / longest);
    let dw = (width as f64 * scale).floor().clamp(1.0, limit) as u32;
    let dh = (height as f64 * scale).floor().clamp(1.0, limit) as u32;
    (dw, dh)
}

/// Grayscale then stretch contrast around 128, written to all three channels
pub fn apply_enhance(raster: &mut Raster, contrast: f32) {
    for pixel in raster.pixels_mut() {
        let [r, g, b, _] = pixel.0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        let stretched = ((luma - 128.0) * contrast + 128.0).clamp(0.0, 255.0) as u8;
        pixel.0[0] = stretched;
        pixel.0[1] = stretched;
        pixel.0[2] = stretched;
        // Alpha unchanged
    }
}

/// Invert RGB channels (light bars on a dark background)
pub fn apply_invert(raster: &mut Raster) {
    for pixel in raster.pixels_mut() {
        pixel.0[0] = 255 - pixel.0[0];
        pixel.0[1] = 255 - pixel.0[1];
        pixel.0[2] = 255 - pixel.0[2];
    }
}
