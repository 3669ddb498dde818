//! Directory replay capture source
//!
//! Plays a folder of still images back as a looping frame feed. Useful for
//! running the scanner without a camera and for reproducing field captures.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::frame::CapturedFrame;
use super::{CaptureConfig, CaptureError, CaptureSource};

const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

/// Capture source that cycles through image files in a directory
pub struct ReplayCapture {
    dir: PathBuf,
    frame_interval: Duration,
    latest: Arc<RwLock<Option<Arc<CapturedFrame>>>>,
    feeder: Mutex<Option<JoinHandle<()>>>,
}

impl ReplayCapture {
    /// Create a replay source over `dir`, advancing one image per `frame_interval`
    pub fn new(dir: impl Into<PathBuf>, frame_interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            frame_interval,
            latest: Arc::new(RwLock::new(None)),
            feeder: Mutex::new(None),
        }
    }

    /// Directory being replayed
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl CaptureSource for ReplayCapture {
    async fn start(&self, config: &CaptureConfig) -> Result<(), CaptureError> {
        if self.is_active() {
            debug!("Replay capture already running");
            return Ok(());
        }

        info!(
            "Starting replay capture from {:?} (facing {:?}, hint {}x{})",
            self.dir, config.facing, config.resolution.width, config.resolution.height
        );

        let dir = self.dir.clone();
        let frames = tokio::task::spawn_blocking(move || load_frames(&dir))
            .await
            .map_err(|e| CaptureError::Unavailable(format!("frame loader failed: {e}")))??;

        info!("Loaded {} replay frames", frames.len());

        let latest = self.latest.clone();
        let interval = self.frame_interval;
        let handle = tokio::spawn(async move {
            let mut sequence = 0u64;
            for image in frames.iter().cycle() {
                *latest.write() = Some(Arc::new(CapturedFrame::new(image.clone(), sequence)));
                sequence += 1;
                tokio::time::sleep(interval).await;
            }
        });

        *self.feeder.lock() = Some(handle);
        Ok(())
    }

    fn stop(&self) {
        if let Some(handle) = self.feeder.lock().take() {
            handle.abort();
            info!("Replay capture stopped");
        }
        *self.latest.write() = None;
    }

    fn is_active(&self) -> bool {
        self.feeder
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    fn latest_frame(&self) -> Option<Arc<CapturedFrame>> {
        self.latest.read().clone()
    }
}

impl Drop for ReplayCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Load every supported image in `dir`, sorted by file name
fn load_frames(dir: &Path) -> Result<Vec<image::RgbaImage>, CaptureError> {
    if !dir.is_dir() {
        return Err(CaptureError::Unavailable(format!(
            "frame directory {} does not exist",
            dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| access_error(dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_supported(path))
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(CaptureError::Unavailable(format!(
            "no image frames in {}",
            dir.display()
        )));
    }

    paths
        .iter()
        .map(|path| {
            image::open(path)
                .map(|img| img.to_rgba8())
                .map_err(|source| match source {
                    image::ImageError::IoError(e) => access_error(path, e),
                    source => CaptureError::Frame {
                        path: path.display().to_string(),
                        source,
                    },
                })
        })
        .collect()
}

/// Map permission failures to `PermissionDenied`
fn access_error(path: &Path, e: std::io::Error) -> CaptureError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => {
            CaptureError::PermissionDenied(format!("{}: {}", path.display(), e))
        }
        _ => CaptureError::Io(e),
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
