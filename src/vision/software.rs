//! Software barcode decoder backed by rxing
//!
//! The multi-format reader is built once per session and lives on a
//! dedicated worker thread; rasters are sent to it as luminance buffers.
//! Decoding is restricted to the target symbologies.

use async_trait::async_trait;
use crossbeam_channel::{unbounded, Sender};
use image::imageops;
use rxing::common::HybridBinarizer;
use rxing::{
    BarcodeFormat, BinaryBitmap, DecodeHintType, DecodeHintValue, DecodingHintDictionary,
    Luma8LuminanceSource, MultiUseMultiFormatReader, Reader,
};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::decoder::{BackendError, BarcodeBackend, DecoderFactory};
use super::sampler::Raster;
use super::{DecodedResult, Symbology, TARGET_SYMBOLOGIES};

type DecodeReply = Result<Option<DecodedResult>, BackendError>;

struct DecodeRequest {
    luma: Vec<u8>,
    width: u32,
    height: u32,
    reply: oneshot::Sender<DecodeReply>,
}

/// rxing-based decoder restricted to a set of symbologies
pub struct RxingDecoder {
    requests: Sender<DecodeRequest>,
}

impl RxingDecoder {
    /// Spawn the decoder worker for `symbologies`
    pub fn new(symbologies: &[Symbology]) -> Result<Self, BackendError> {
        let formats: HashSet<BarcodeFormat> = symbologies
            .iter()
            .map(|s| to_barcode_format(*s))
            .collect::<Result<_, _>>()?;
        if formats.is_empty() {
            return Err(BackendError::Init("no symbologies requested".to_string()));
        }

        let (requests, inbox) = unbounded::<DecodeRequest>();

        std::thread::Builder::new()
            .name("rxing-decoder".to_string())
            .spawn(move || {
                let mut reader = MultiUseMultiFormatReader::default();
                let mut hints = DecodingHintDictionary::new();
                hints.insert(
                    DecodeHintType::POSSIBLE_FORMATS,
                    DecodeHintValue::PossibleFormats(formats),
                );
                hints.insert(DecodeHintType::TRY_HARDER, DecodeHintValue::TryHarder(true));

                debug!("rxing decoder worker started");
                for request in inbox.iter() {
                    let DecodeRequest { luma, width, height, reply } = request;
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        decode_luma(&mut reader, &hints, luma, width, height)
                    }))
                    .unwrap_or_else(|_| {
                        warn!("rxing panicked on a {}x{} raster", width, height);
                        // A panic can leave the reader mid-decode; start clean
                        reader = MultiUseMultiFormatReader::default();
                        Err(BackendError::Detect("decoder panicked".to_string()))
                    });
                    // The caller may have been cancelled
                    let _ = reply.send(outcome);
                }
                debug!("rxing decoder worker exiting");
            })
            .map_err(|e| BackendError::Init(format!("failed to spawn decoder worker: {e}")))?;

        info!("rxing decoder ready for {:?}", symbologies);
        Ok(Self { requests })
    }
}

#[async_trait]
impl BarcodeBackend for RxingDecoder {
    fn name(&self) -> &'static str {
        "rxing"
    }

    async fn detect(&self, raster: &Raster) -> Result<Option<DecodedResult>, BackendError> {
        let (width, height) = raster.dimensions();
        let luma = imageops::grayscale(raster).into_raw();

        let (reply, response) = oneshot::channel();
        self.requests
            .send(DecodeRequest { luma, width, height, reply })
            .map_err(|_| BackendError::Detect("decoder worker stopped".to_string()))?;

        response
            .await
            .map_err(|_| BackendError::Detect("decoder worker dropped request".to_string()))?
    }
}

/// Default factory: software decoding only
#[derive(Debug, Clone, Copy, Default)]
pub struct RxingFactory;

impl DecoderFactory for RxingFactory {
    fn software_decoder(&self) -> Result<Arc<dyn BarcodeBackend>, BackendError> {
        Ok(Arc::new(RxingDecoder::new(&TARGET_SYMBOLOGIES)?))
    }
}

fn decode_luma(
    reader: &mut MultiUseMultiFormatReader,
    hints: &DecodingHintDictionary,
    luma: Vec<u8>,
    width: u32,
    height: u32,
) -> DecodeReply {
    if width == 0 || height == 0 || luma.len() != (width * height) as usize {
        return Err(BackendError::Detect(format!("malformed {width}x{height} raster")));
    }

    let source = Luma8LuminanceSource::new(luma, width, height);
    let mut bitmap = BinaryBitmap::new(HybridBinarizer::new(source));

    match reader.decode_with_hints(&mut bitmap, hints) {
        Ok(result) => Ok(DecodedResult::new(
            result.getText(),
            from_barcode_format(result.getBarcodeFormat()),
        )),
        Err(e) => Err(BackendError::Detect(e.to_string())),
    }
}

fn to_barcode_format(symbology: Symbology) -> Result<BarcodeFormat, BackendError> {
    match symbology {
        Symbology::Ean13 => Ok(BarcodeFormat::EAN_13),
        Symbology::Code128 => Ok(BarcodeFormat::CODE_128),
        Symbology::Unknown => Err(BackendError::Init(
            "cannot restrict decoding to an unknown symbology".to_string(),
        )),
    }
}

fn from_barcode_format(format: &BarcodeFormat) -> Symbology {
    match format {
        BarcodeFormat::EAN_13 => Symbology::Ean13,
        BarcodeFormat::CODE_128 => Symbology::Code128,
        _ => Symbology::Unknown,
    }
}
