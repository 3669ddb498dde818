//! Capture Layer
//!
//! Owns the camera stream lifecycle and exposes the most recent frame.
//! The scan loop never waits for frame arrival; it samples whatever frame
//! is current, so a frame may be read zero or several times.

pub mod frame;
pub mod replay;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use self::frame::CapturedFrame;

pub use replay::ReplayCapture;

/// Which camera the source should prefer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    /// Rear camera, pointed away from the operator
    #[default]
    Environment,
    /// Front camera
    User,
}

/// Preferred capture resolution; sources treat it as a hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionHint {
    pub width: u32,
    pub height: u32,
}

impl ResolutionHint {
    pub const FULL_HD: Self = Self { width: 1920, height: 1080 };
    pub const HD: Self = Self { width: 1280, height: 720 };
}

/// Capture configuration handed to a source on start
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Camera facing preference
    pub facing: FacingMode,
    /// Requested resolution
    pub resolution: ResolutionHint,
    /// How long to wait for the first frame before scanning anyway
    pub first_frame_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            resolution: ResolutionHint::FULL_HD,
            first_frame_timeout: Duration::from_millis(3000),
        }
    }
}

/// Errors raised while acquiring a capture stream
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera access denied: {0}")]
    PermissionDenied(String),
    #[error("no usable camera: {0}")]
    Unavailable(String),
    #[error("failed to load frame {path}: {source}")]
    Frame {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A live frame feed
///
/// Implementations use interior mutability so a single source can be shared
/// between the scan loop and the stop path.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Acquire the underlying device. Starting an already started source is a no-op.
    async fn start(&self, config: &CaptureConfig) -> Result<(), CaptureError>;

    /// Release the underlying device. Must be safe to call in any state.
    fn stop(&self);

    /// Whether the device is currently held
    fn is_active(&self) -> bool;

    /// Most recent frame, if the stream has produced one
    fn latest_frame(&self) -> Option<Arc<CapturedFrame>>;

    /// Pixel dimensions of the stream once at least one frame arrived
    fn frame_dimensions(&self) -> Option<(u32, u32)> {
        self.latest_frame()
            .map(|frame| frame.dimensions())
            .filter(|(w, h)| *w > 0 && *h > 0)
    }
}

/// Poll until the source reports frame dimensions or the timeout elapses.
///
/// Returns `true` if a frame arrived. A timeout is not an error; the scan
/// loop skips cycles until frames show up.
pub async fn wait_for_first_frame(source: &dyn CaptureSource, timeout: Duration) -> bool {
    const POLL_INTERVAL: Duration = Duration::from_millis(16);

    let start = Instant::now();
    loop {
        if let Some((w, h)) = source.frame_dimensions() {
            debug!("First frame ready: {}x{}", w, h);
            return true;
        }
        if start.elapsed() >= timeout {
            warn!("No frame after {:?}, continuing without one", timeout);
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
