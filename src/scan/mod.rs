//! Scan Controller
//!
//! Drives the capture → region → sampler → decoder loop and hands accepted
//! codes to the quantity prompt. While a prompt is open the loop is
//! suspended on it, which is what keeps one physical barcode from being
//! counted twice.
//!
//! Lifecycle: `Idle → Starting → Sampling ⇄ Handling → Idle`. Every exit
//! back to `Idle` releases the capture source.

pub mod session;
pub mod validation;

use parking_lot::Mutex;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::capture::{wait_for_first_frame, CaptureConfig, CaptureError, CaptureSource};
use crate::prompt::{PromptError, PromptOutcome, QuantityPrompt};
use crate::shared::{EventSink, ScanEvent};
use crate::storage::{StorageError, TallyStore};
use crate::vision::{
    decoder::attempts_per_cycle, map_guide_box, BackendError, DecoderFactory, DecoderStrategy,
    FrameSampler, GuideLayout, SamplerConfig,
};

pub use session::ScanSession;
pub use validation::{accept, EanPolicy};

/// Inter-cycle delay for cameras that keep up
pub const STANDARD_LOOP_DELAY: Duration = Duration::from_millis(140);
/// Inter-cycle delay for slower camera pipelines
pub const SLOW_CAMERA_LOOP_DELAY: Duration = Duration::from_millis(220);
/// Pause after a prompt resolves before sampling resumes
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Tuning for one scan session
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub capture: CaptureConfig,
    pub sampler: SamplerConfig,
    pub loop_delay: Duration,
    pub settle_delay: Duration,
    pub ean_policy: EanPolicy,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            sampler: SamplerConfig::default(),
            loop_delay: STANDARD_LOOP_DELAY,
            settle_delay: DEFAULT_SETTLE_DELAY,
            ean_policy: EanPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("camera acquisition failed: {0}")]
    Acquisition(#[from] CaptureError),
    #[error("decoder initialization failed: {0}")]
    DecoderInit(#[from] BackendError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ScanError {
    /// Guidance shown to the operator
    pub fn operator_message(&self) -> String {
        match self {
            Self::Acquisition(CaptureError::PermissionDenied(_)) => {
                "Camera access was denied. Allow camera access for this device and press start again."
                    .to_string()
            }
            Self::Acquisition(_) => {
                "Could not open the camera. Check that it is connected and not in use by another program."
                    .to_string()
            }
            Self::DecoderInit(_) => {
                "The barcode decoder could not start. Restart the application and try again.".to_string()
            }
            Self::Prompt(e) => format!("{e}. Finish the open prompt first."),
            Self::Storage(e) => format!("Could not save the tally: {e}"),
        }
    }
}

struct ControllerInner {
    settings: ScanSettings,
    sampler: FrameSampler,
    capture: Arc<dyn CaptureSource>,
    decoders: Arc<dyn DecoderFactory>,
    layout: Arc<dyn GuideLayout>,
    prompt: QuantityPrompt,
    tally: Arc<TallyStore>,
    events: EventSink,
    session: ScanSession,
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Owns the scan session and its loop task
pub struct ScanController {
    inner: Arc<ControllerInner>,
    running: Mutex<Option<RunningLoop>>,
}

impl ScanController {
    pub fn new(
        settings: ScanSettings,
        capture: Arc<dyn CaptureSource>,
        decoders: Arc<dyn DecoderFactory>,
        layout: Arc<dyn GuideLayout>,
        prompt: QuantityPrompt,
        tally: Arc<TallyStore>,
        events: EventSink,
    ) -> Self {
        let sampler = FrameSampler::new(settings.sampler.clone());
        Self {
            inner: Arc::new(ControllerInner {
                settings,
                sampler,
                capture,
                decoders,
                layout,
                prompt,
                tally,
                events,
                session: ScanSession::new(),
            }),
            running: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &ScanSession {
        &self.inner.session
    }

    pub fn prompt(&self) -> &QuantityPrompt {
        &self.inner.prompt
    }

    pub fn tally(&self) -> &Arc<TallyStore> {
        &self.inner.tally
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.session.is_scanning()
    }

    /// Acquire the camera, initialise the decoders and spawn the scan loop.
    ///
    /// Starting while a session is active is a no-op. On failure the camera
    /// is released and the controller is back to `Idle`.
    pub async fn start(&self) -> Result<(), ScanError> {
        if !self.inner.session.try_begin() {
            debug!("Start ignored, already scanning");
            return Ok(());
        }

        let cancel = CancellationToken::new();
        *self.running.lock() = Some(RunningLoop {
            cancel: cancel.clone(),
            handle: None,
        });
        self.inner.events.status("Starting camera...");

        let acquired = tokio::select! {
            _ = cancel.cancelled() => None,
            acquired = self.inner.acquire() => Some(acquired),
        };

        let strategy = match acquired {
            // stop() already released everything
            None => return Ok(()),
            Some(Err(e)) => {
                self.inner.capture.stop();
                self.inner.session.reset();
                self.running.lock().take();
                error!("Failed to start scanning: {}", e);
                self.inner.events.emit(ScanEvent::Alert(e.operator_message()));
                return Err(e);
            }
            Some(Ok(strategy)) => strategy,
        };

        if !self.inner.session.mark_sampling() {
            self.inner.capture.stop();
            return Ok(());
        }

        info!(?strategy, "Scanning started");
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(inner.run(strategy, cancel));

        match self.running.lock().as_mut() {
            Some(running) => running.handle = Some(handle),
            None => handle.abort(),
        }
        Ok(())
    }

    /// Stop scanning. Effective in every state.
    ///
    /// Cancels any open prompt, releases the camera and waits for the loop
    /// task to finish.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let was_scanning = self.inner.session.is_scanning();

        if let Some(running) = &running {
            running.cancel.cancel();
        }
        if let Some(ticket) = self.inner.prompt.cancel_pending() {
            info!(code = %ticket.code, "Abandoned quantity prompt");
        }

        self.inner.capture.stop();
        self.inner.session.reset();

        if let Some(RunningLoop {
            handle: Some(handle),
            ..
        }) = running
        {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!("Scan loop panicked");
                }
            }
        }

        if was_scanning {
            info!("Scanning stopped");
            self.inner.events.emit(ScanEvent::Stopped);
        }
    }

    /// Add a code by hand. Without a quantity, the operator is prompted.
    ///
    /// Returns the new total, or `None` if the code was empty or the prompt
    /// was cancelled.
    pub async fn add_manual(
        &self,
        code: &str,
        quantity: Option<NonZeroU32>,
    ) -> Result<Option<u64>, ScanError> {
        let code = code.trim();
        if code.is_empty() {
            warn!("Ignoring manual add with an empty code");
            return Ok(None);
        }

        let quantity = match quantity {
            Some(quantity) => quantity,
            None => match self.inner.prompt.ask(code).await? {
                PromptOutcome::Confirmed(quantity) => quantity,
                PromptOutcome::Cancelled => return Ok(None),
            },
        };

        Ok(Some(self.inner.commit(code, quantity)?))
    }
}

impl Drop for ScanController {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
            self.inner.capture.stop();
        }
    }
}

impl ControllerInner {
    async fn acquire(&self) -> Result<DecoderStrategy, ScanError> {
        let config = &self.settings.capture;
        self.capture.start(config).await?;
        wait_for_first_frame(self.capture.as_ref(), config.first_frame_timeout).await;
        Ok(DecoderStrategy::init(self.decoders.as_ref()).await?)
    }

    async fn run(self: Arc<Self>, strategy: DecoderStrategy, cancel: CancellationToken) {
        info!(
            native = strategy.is_native_capable(),
            max_attempts = attempts_per_cycle(&self.sampler, &strategy),
            "Scan loop running"
        );
        self.events.status("Scanning...");

        loop {
            if !pause(&cancel, self.settings.loop_delay).await {
                break;
            }
            // A manually requested prompt owns the operator
            if self.prompt.pending().is_some() {
                continue;
            }

            let found = tokio::select! {
                _ = cancel.cancelled() => break,
                found = self.sample_once(&strategy) => found,
            };
            let Some(code) = found else { continue };

            self.handle(code, &cancel).await;
            if cancel.is_cancelled() {
                break;
            }
        }

        debug!("Scan loop exited");
    }

    /// One sampling cycle; returns an accepted code
    async fn sample_once(&self, strategy: &DecoderStrategy) -> Option<String> {
        let frame = self.capture.latest_frame()?;
        let (frame_w, frame_h) = frame.dimensions();
        let roi = map_guide_box(
            self.layout.video_rect(),
            self.layout.guide_rect(),
            frame_w,
            frame_h,
        );
        if !roi.is_ready() {
            trace!("Layout not ready, skipping cycle");
            return None;
        }

        let outcome = strategy.decode_region(&self.sampler, &frame.image, roi).await;
        debug!(
            frame = frame.sequence,
            age_ms = frame.timestamp.elapsed().as_millis() as u64,
            "ROI: {}x{} -> {}x{} (x{})",
            roi.width,
            roi.height,
            outcome.raster_size.0,
            outcome.raster_size.1,
            outcome.scale
        );

        let result = outcome.result?;
        let value = result.value.clone();
        let symbology = result.symbology;
        let accepted = accept(result, self.settings.ean_policy);
        if accepted.is_none() {
            debug!(value = %value, %symbology, "Discarded misdetection");
        }
        accepted
    }

    async fn handle(&self, code: String, cancel: &CancellationToken) {
        let _handling = self.session.enter_handling();
        info!(code = %code, "Detected barcode");
        self.events.status(format!("Detected: {code}"));

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return,
            outcome = self.prompt.ask(&code) => outcome,
        };

        match outcome {
            Ok(PromptOutcome::Confirmed(quantity)) => {
                if let Err(e) = self.commit(&code, quantity) {
                    error!("Failed to record {}: {}", code, e);
                    self.events
                        .emit(ScanEvent::Alert(ScanError::from(e).operator_message()));
                }
            }
            Ok(PromptOutcome::Cancelled) => {
                info!(code = %code, "Quantity prompt cancelled");
                self.events.status("Cancelled, scanning...");
            }
            Err(e) => debug!("Skipping {}: {}", code, e),
        }

        pause(cancel, self.settings.settle_delay).await;
    }

    fn commit(&self, code: &str, quantity: NonZeroU32) -> Result<u64, StorageError> {
        let total = self.tally.add(code, quantity)?;
        info!(code, added = quantity.get(), total, "Quantity recorded");
        self.events.emit(ScanEvent::TallyChanged {
            code: code.to_string(),
            added: quantity.get(),
            total,
        });
        Ok(total)
    }
}

/// Sleep for `delay`; returns false if cancelled first
async fn pause(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::session::ScanPhase;
    use super::*;
    use crate::capture::testing::MockCapture;
    use crate::prompt::PromptTicket;
    use crate::vision::decoder::testing::{ScriptedBackend, ScriptedFactory};
    use crate::vision::software::testing::render_barcode;
    use crate::vision::{RxingFactory, ScreenRect, StaticLayout, Symbology};
    use crossbeam_channel::{unbounded, Receiver};
    use image::{imageops, Rgba, RgbaImage};
    use rxing::BarcodeFormat;
    use std::sync::atomic::Ordering;

    struct Harness {
        controller: Arc<ScanController>,
        capture: Arc<MockCapture>,
        native: Arc<ScriptedBackend>,
        software: Arc<ScriptedBackend>,
        events: Receiver<ScanEvent>,
    }

    impl Harness {
        fn new(native: Option<ScriptedBackend>, software: ScriptedBackend) -> Self {
            Self::build(native, software, false, EanPolicy::Strict, MockCapture::with_frame(640, 480))
        }

        fn build(
            native: Option<ScriptedBackend>,
            software: ScriptedBackend,
            fail_init: bool,
            ean_policy: EanPolicy,
            capture: MockCapture,
        ) -> Self {
            let (tx, events) = unbounded();
            let sink = EventSink::new(tx);
            let capture = Arc::new(capture);
            let native = native.map(Arc::new);
            let software = Arc::new(software);
            let factory = ScriptedFactory {
                native: native.clone(),
                software: software.clone(),
                fail_init,
            };
            let layout = StaticLayout {
                video: ScreenRect::new(0.0, 0.0, 640.0, 480.0),
                guide: ScreenRect::new(64.0, 192.0, 512.0, 96.0),
            };
            let settings = ScanSettings {
                sampler: SamplerConfig {
                    scales: vec![1.0],
                    ..SamplerConfig::default()
                },
                ean_policy,
                ..ScanSettings::default()
            };
            let controller = ScanController::new(
                settings,
                capture.clone(),
                Arc::new(factory),
                Arc::new(layout),
                QuantityPrompt::new(Vec::new(), sink.clone()),
                Arc::new(TallyStore::open_in_memory().unwrap()),
                sink,
            );

            Self {
                controller: Arc::new(controller),
                capture,
                native: native.unwrap_or_else(|| Arc::new(ScriptedBackend::missing("unused"))),
                software,
                events,
            }
        }

        async fn wait_for_prompt(&self) -> PromptTicket {
            for _ in 0..1000 {
                if let Some(ticket) = self.controller.prompt().pending() {
                    return ticket;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("no prompt opened");
        }

        fn drain(&self) -> Vec<ScanEvent> {
            self.events.try_iter().collect()
        }
    }

    fn qty(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquisition_failure_returns_to_idle() {
        let h = Harness::build(
            None,
            ScriptedBackend::missing("software"),
            false,
            EanPolicy::Strict,
            MockCapture::denying("blocked by user"),
        );

        let result = h.controller.start().await;

        let err = result.unwrap_err();
        assert!(matches!(err, ScanError::Acquisition(CaptureError::PermissionDenied(_))));
        assert!(err.operator_message().contains("Allow camera access"));
        assert_eq!(h.controller.session().phase(), ScanPhase::Idle);
        assert_eq!(h.capture.stops.load(Ordering::SeqCst), 1);
        assert!(h.drain().iter().any(|e| matches!(e, ScanEvent::Alert(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_decoder_init_failure_releases_capture() {
        let h = Harness::build(
            None,
            ScriptedBackend::missing("software"),
            true,
            EanPolicy::Strict,
            MockCapture::with_frame(640, 480),
        );

        let result = h.controller.start().await;

        assert!(matches!(result, Err(ScanError::DecoderInit(_))));
        assert!(!h.capture.is_active());
        assert!(!h.controller.is_scanning());

        // A later start is allowed once the cause is fixed
        assert_eq!(h.capture.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_prompt_per_code_until_resolved() {
        let h = Harness::new(
            Some(ScriptedBackend::answering("native", "4006381333931", Symbology::Ean13)),
            ScriptedBackend::missing("software"),
        );
        h.controller.start().await.unwrap();

        let first = h.wait_for_prompt().await;
        assert_eq!(first.code, "4006381333931");
        assert_eq!(h.controller.session().phase(), ScanPhase::Handling);

        // The barcode stays in view, but the loop is suspended on the prompt
        let calls = h.native.call_count();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.native.call_count(), calls);
        assert_eq!(h.controller.prompt().pending(), Some(first.clone()));

        assert!(h.controller.prompt().confirm_quick(first.id, 1));

        // After the settle delay the still-visible code is prompted again
        let second = loop {
            let ticket = h.wait_for_prompt().await;
            if ticket.id != first.id {
                break ticket;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        };
        assert_eq!(second.code, first.code);
        assert_eq!(h.controller.tally().quantity("4006381333931").unwrap(), Some(3));

        h.controller.stop().await;

        let opened = h
            .drain()
            .into_iter()
            .filter(|e| matches!(e, ScanEvent::PromptOpened { .. }))
            .count();
        assert_eq!(opened, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_ean_never_prompts_under_strict_policy() {
        let h = Harness::new(
            None,
            ScriptedBackend::answering("software", "12345678901", Symbology::Ean13),
        );
        h.controller.start().await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(h.controller.prompt().pending().is_none());
        assert!(h.software.call_count() > 1);
        assert_eq!(h.controller.session().phase(), ScanPhase::Sampling);
        h.controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_lenient_policy_prompts_for_malformed_ean() {
        let h = Harness::build(
            None,
            ScriptedBackend::answering("software", "12345678901X3", Symbology::Ean13),
            false,
            EanPolicy::Lenient,
            MockCapture::with_frame(640, 480),
        );
        h.controller.start().await.unwrap();

        let ticket = h.wait_for_prompt().await;
        assert_eq!(ticket.code, "12345678901X3");
        h.controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_code128_accepted_from_software_fallback() {
        let h = Harness::new(
            Some(ScriptedBackend::missing("native")),
            ScriptedBackend::answering("software", " SKU-00417 ", Symbology::Code128),
        );
        h.controller.start().await.unwrap();

        let ticket = h.wait_for_prompt().await;
        assert_eq!(ticket.code, "SKU-00417");
        assert!(h.native.call_count() >= 1);

        assert_eq!(h.controller.prompt().submit_text(ticket.id, "12"), Ok(true));
        loop {
            if h.controller.tally().quantity("SKU-00417").unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.controller.tally().quantity("SKU-00417").unwrap(), Some(12));
        h.controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_handling_releases_everything() {
        let h = Harness::new(
            None,
            ScriptedBackend::answering("software", "4006381333931", Symbology::Ean13),
        );
        h.controller.start().await.unwrap();
        let ticket = h.wait_for_prompt().await;
        assert!(h.capture.is_active());

        h.controller.stop().await;

        assert!(!h.capture.is_active());
        assert!(h.controller.prompt().pending().is_none());
        assert_eq!(h.controller.session().phase(), ScanPhase::Idle);
        assert!(h.controller.tally().is_empty().unwrap());

        let events = h.drain();
        assert!(events.contains(&ScanEvent::PromptClosed {
            ticket,
            outcome: PromptOutcome::Cancelled,
        }));
        assert_eq!(events.last(), Some(&ScanEvent::Stopped));

        // No further sampling once stopped
        let calls = h.software.call_count();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.software.call_count(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_noop_and_stop_is_idempotent() {
        let h = Harness::new(None, ScriptedBackend::missing("software"));

        h.controller.start().await.unwrap();
        h.controller.start().await.unwrap();
        assert_eq!(h.capture.starts.load(Ordering::SeqCst), 1);
        assert_eq!(h.controller.session().phase(), ScanPhase::Sampling);

        h.controller.stop().await;
        h.controller.stop().await;
        assert!(!h.controller.is_scanning());

        let stopped = h.drain().into_iter().filter(|e| *e == ScanEvent::Stopped).count();
        assert_eq!(stopped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sampling_without_layout() {
        let h = Harness::new(None, ScriptedBackend::answering("software", "X", Symbology::Code128));
        let (tx, _rx) = unbounded();
        let controller = ScanController::new(
            ScanSettings::default(),
            h.capture.clone(),
            Arc::new(ScriptedFactory {
                native: None,
                software: h.software.clone(),
                fail_init: false,
            }),
            Arc::new(StaticLayout {
                video: ScreenRect::new(0.0, 0.0, 0.0, 0.0),
                guide: ScreenRect::new(0.0, 0.0, 10.0, 10.0),
            }),
            QuantityPrompt::default(),
            Arc::new(TallyStore::open_in_memory().unwrap()),
            EventSink::new(tx),
        );

        controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(h.software.call_count(), 0);
        assert!(controller.prompt().pending().is_none());
        controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_add() {
        let h = Harness::new(None, ScriptedBackend::missing("software"));

        assert_eq!(h.controller.add_manual("  ABC-1 ", Some(qty(2))).await.unwrap(), Some(2));
        assert_eq!(h.controller.add_manual("   ", Some(qty(2))).await.unwrap(), None);

        let controller = h.controller.clone();
        let task = tokio::spawn(async move { controller.add_manual("ABC-1", None).await });
        let ticket = h.wait_for_prompt().await;
        assert_eq!(ticket.code, "ABC-1");
        assert_eq!(h.controller.prompt().submit_text(ticket.id, "5"), Ok(true));

        assert_eq!(task.await.unwrap().unwrap(), Some(7));
        assert!(h
            .drain()
            .contains(&ScanEvent::TallyChanged { code: "ABC-1".to_string(), added: 5, total: 7 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_manual_prompt_while_idle() {
        let h = Harness::new(None, ScriptedBackend::missing("software"));
        let controller = h.controller.clone();
        let task = tokio::spawn(async move { controller.add_manual("ABC-1", None).await });
        h.wait_for_prompt().await;

        h.controller.stop().await;

        assert_eq!(task.await.unwrap().unwrap(), None);
        assert!(h.controller.prompt().pending().is_none());
        assert!(h.controller.tally().is_empty().unwrap());
    }

    // Real time: the rxing worker thread does not follow a paused clock
    #[tokio::test]
    async fn test_rendered_barcode_in_guide_box_opens_prompt() {
        let (tx, events) = unbounded();
        let sink = EventSink::new(tx);

        // Guide box maps to x 64..576, y 192..288 of the frame
        let mut frame = RgbaImage::from_pixel(640, 480, Rgba([230, 230, 230, 255]));
        let barcode = render_barcode("5901234123457", BarcodeFormat::EAN_13, 440, 60);
        let (bw, bh) = barcode.dimensions();
        assert!(bw <= 512 && bh <= 96);
        let x = 64 + (512 - bw) / 2;
        let y = 192 + (96 - bh) / 2;
        imageops::replace(&mut frame, &barcode, i64::from(x), i64::from(y));
        let capture = Arc::new(MockCapture::with_frame(640, 480));
        capture.set_frame(frame);

        let controller = ScanController::new(
            ScanSettings {
                sampler: SamplerConfig {
                    scales: vec![1.0],
                    ..SamplerConfig::default()
                },
                ..ScanSettings::default()
            },
            capture.clone(),
            Arc::new(RxingFactory),
            Arc::new(StaticLayout {
                video: ScreenRect::new(0.0, 0.0, 640.0, 480.0),
                guide: ScreenRect::new(64.0, 192.0, 512.0, 96.0),
            }),
            QuantityPrompt::new(Vec::new(), sink.clone()),
            Arc::new(TallyStore::open_in_memory().unwrap()),
            sink,
        );
        controller.start().await.unwrap();

        let mut ticket = None;
        for _ in 0..500 {
            ticket = controller.prompt().pending();
            if ticket.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let ticket = ticket.expect("barcode in the guide box was not decoded");
        assert_eq!(ticket.code, "5901234123457");

        assert_eq!(controller.prompt().submit_text(ticket.id, "4"), Ok(true));
        for _ in 0..100 {
            if controller.tally().quantity("5901234123457").unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(controller.tally().quantity("5901234123457").unwrap(), Some(4));
        controller.stop().await;

        assert!(!capture.is_active());
        assert!(events
            .try_iter()
            .any(|e| matches!(e, ScanEvent::PromptOpened { ref ticket, .. } if ticket.code == "5901234123457")));
    }

    #[test]
    fn test_operator_messages() {
        let err = ScanError::from(CaptureError::Unavailable("no device".to_string()));
        assert!(err.operator_message().contains("Could not open the camera"));

        let err = ScanError::from(BackendError::Init("boom".to_string()));
        assert!(err.operator_message().contains("decoder"));
    }
}
