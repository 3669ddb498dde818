//! Decoder strategy
//!
//! Backends are tried in a fixed nested order: for each upscale factor, for
//! each preprocessing transform, for each backend. The first non-empty value
//! ends the cycle. Backend failures are logged and treated as a miss.

use async_trait::async_trait;
use image::RgbaImage;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::region::RegionOfInterest;
use super::sampler::{FrameSampler, Raster, Transform};
use super::{DecodedResult, Symbology, TARGET_SYMBOLOGIES};

/// Errors raised by decoder backends
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("decoder initialization failed: {0}")]
    Init(String),
    #[error("detection failed: {0}")]
    Detect(String),
}

/// A barcode decoding backend
#[async_trait]
pub trait BarcodeBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Look for a barcode in `raster`. `Ok(None)` means nothing was found.
    async fn detect(&self, raster: &Raster) -> Result<Option<DecodedResult>, BackendError>;
}

/// A platform-provided accelerated detector
#[async_trait]
pub trait NativeDetector: BarcodeBackend {
    /// Symbologies the platform can detect
    async fn supported_symbologies(&self) -> Result<Vec<Symbology>, BackendError>;
}

/// Supplies the backends for a scan session
pub trait DecoderFactory: Send + Sync {
    /// Native detector exposed by the host, if any
    fn native_detector(&self) -> Option<Arc<dyn NativeDetector>> {
        None
    }

    /// Build the software decoder; called once per session
    fn software_decoder(&self) -> Result<Arc<dyn BarcodeBackend>, BackendError>;
}

/// Backend selection, fixed for the lifetime of a session
#[derive(Clone)]
pub enum DecoderStrategy {
    /// Native detector first, software decoder as fallback
    NativeCapable {
        native: Arc<dyn NativeDetector>,
        software: Arc<dyn BarcodeBackend>,
    },
    /// Software decoder only
    SoftwareOnly { software: Arc<dyn BarcodeBackend> },
}

/// Result of one sampling cycle
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    /// First successful decode, if any
    pub result: Option<DecodedResult>,
    /// Number of backend calls made
    pub attempts: usize,
    /// Size of the last raster sampled; the hit raster when there is one
    pub raster_size: (u32, u32),
    /// Upscale factor of that raster
    pub scale: f32,
    /// Transform that produced the hit
    pub transform: Option<Transform>,
}

impl DecoderStrategy {
    /// Probe the host once and pick a strategy.
    ///
    /// The native detector is used only if it supports every target
    /// symbology; a failing probe falls back to software-only.
    pub async fn init(factory: &dyn DecoderFactory) -> Result<Self, BackendError> {
        let software = factory.software_decoder()?;

        let Some(native) = factory.native_detector() else {
            info!("No native detector, using {} only", software.name());
            return Ok(Self::SoftwareOnly { software });
        };

        match native.supported_symbologies().await {
            Ok(supported) if TARGET_SYMBOLOGIES.iter().all(|s| supported.contains(s)) => {
                info!("Using native detector {} with {} fallback", native.name(), software.name());
                Ok(Self::NativeCapable { native, software })
            }
            Ok(supported) => {
                info!(
                    "Native detector {} supports {:?}, missing targets; using {} only",
                    native.name(),
                    supported,
                    software.name()
                );
                Ok(Self::SoftwareOnly { software })
            }
            Err(e) => {
                warn!("Native detector probe failed: {}", e);
                Ok(Self::SoftwareOnly { software })
            }
        }
    }

    /// Whether the native detector is in use
    pub fn is_native_capable(&self) -> bool {
        matches!(self, Self::NativeCapable { .. })
    }

    /// Try each backend on one raster, in order
    pub async fn detect_once(&self, raster: &Raster, attempts: &mut usize) -> Option<DecodedResult> {
        if let Self::NativeCapable { native, .. } = self {
            *attempts += 1;
            if let Some(result) = swallow(native.name(), native.detect(raster).await) {
                return Some(result);
            }
        }

        let software = match self {
            Self::NativeCapable { software, .. } | Self::SoftwareOnly { software } => software,
        };
        *attempts += 1;
        swallow(software.name(), software.detect(raster).await)
    }

    /// Run the full factor x transform x backend search over one region
    pub async fn decode_region(
        &self,
        sampler: &FrameSampler,
        frame: &RgbaImage,
        roi: RegionOfInterest,
    ) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();

        for &scale in sampler.scales() {
            let base = sampler.sample(frame, roi, scale);
            outcome.raster_size = base.dimensions();
            outcome.scale = scale;

            for &transform in sampler.transforms() {
                let raster = sampler.variant(&base, transform);
                if let Some(result) = self.detect_once(&raster, &mut outcome.attempts).await {
                    debug!(
                        value = %result.value,
                        symbology = %result.symbology,
                        scale,
                        transform = transform.label(),
                        "Decoded barcode"
                    );
                    outcome.result = Some(result);
                    outcome.transform = Some(transform);
                    return outcome;
                }
            }
        }

        trace!(attempts = outcome.attempts, "No barcode this cycle");
        outcome
    }
}

/// Collapse backend errors into "no result"
fn swallow(
    backend: &str,
    result: Result<Option<DecodedResult>, BackendError>,
) -> Option<DecodedResult> {
    match result {
        Ok(found) => found,
        Err(e) => {
            trace!(backend, error = %e, "Backend miss");
            None
        }
    }
}

impl std::fmt::Debug for DecoderStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NativeCapable { native, software } => f
                .debug_struct("NativeCapable")
                .field("native", &native.name())
                .field("software", &software.name())
                .finish(),
            Self::SoftwareOnly { software } => f
                .debug_struct("SoftwareOnly")
                .field("software", &software.name())
                .finish(),
        }
    }
}

/// Backend calls made by a cycle that finds nothing
pub fn attempts_per_cycle(sampler: &FrameSampler, strategy: &DecoderStrategy) -> usize {
    let backends = if strategy.is_native_capable() { 2 } else { 1 };
    sampler.scales().len() * sampler.transforms().len() * backends
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted backends for strategy and controller tests

    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that records raster sizes and answers from a script
    pub struct ScriptedBackend {
        pub label: &'static str,
        answer: Mutex<Option<DecodedResult>>,
        fail: bool,
        pub calls: AtomicUsize,
        pub seen: Mutex<Vec<(u32, u32, [u8; 4])>>,
        supported: Vec<Symbology>,
        min_width: u32,
    }

    impl ScriptedBackend {
        pub fn missing(label: &'static str) -> Self {
            Self {
                label,
                answer: Mutex::new(None),
                fail: false,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                supported: TARGET_SYMBOLOGIES.to_vec(),
                min_width: 0,
            }
        }

        pub fn failing(label: &'static str) -> Self {
            Self { fail: true, ..Self::missing(label) }
        }

        pub fn answering(label: &'static str, value: &str, symbology: Symbology) -> Self {
            let backend = Self::missing(label);
            *backend.answer.lock() = DecodedResult::new(value, symbology);
            backend
        }

        pub fn supporting(mut self, supported: Vec<Symbology>) -> Self {
            self.supported = supported;
            self
        }

        /// Only answer for rasters at least `min_width` wide
        pub fn from_width(mut self, min_width: u32) -> Self {
            self.min_width = min_width;
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BarcodeBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            self.label
        }

        async fn detect(&self, raster: &Raster) -> Result<Option<DecodedResult>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (w, h) = raster.dimensions();
            self.seen.lock().push((w, h, raster.get_pixel(0, 0).0));
            if self.fail {
                return Err(BackendError::Detect("scripted failure".to_string()));
            }
            if w < self.min_width {
                return Ok(None);
            }
            Ok(self.answer.lock().clone())
        }
    }

    #[async_trait]
    impl NativeDetector for ScriptedBackend {
        async fn supported_symbologies(&self) -> Result<Vec<Symbology>, BackendError> {
            Ok(self.supported.clone())
        }
    }

    /// Factory handing out pre-built scripted backends
    pub struct ScriptedFactory {
        pub native: Option<Arc<ScriptedBackend>>,
        pub software: Arc<ScriptedBackend>,
        pub fail_init: bool,
    }

    impl DecoderFactory for ScriptedFactory {
        fn native_detector(&self) -> Option<Arc<dyn NativeDetector>> {
            self.native
                .clone()
                .map(|native| native as Arc<dyn NativeDetector>)
        }

        fn software_decoder(&self) -> Result<Arc<dyn BarcodeBackend>, BackendError> {
            if self.fail_init {
                return Err(BackendError::Init("scripted init failure".to_string()));
            }
            Ok(self.software.clone())
        }
    }
}
