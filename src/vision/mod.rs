//! Vision Layer
//!
//! Maps the guide box onto frame pixels, samples and preprocesses the
//! region, and decodes barcodes with an ordered set of backends:
//! - a native accelerated detector, when the host provides one
//! - the rxing software decoder (portable fallback)

pub mod decoder;
pub mod region;
pub mod sampler;
pub mod software;

use std::fmt;

pub use decoder::{BackendError, DecoderFactory, DecoderStrategy};
pub use region::{map_guide_box, GuideLayout, ScreenRect, StaticLayout};
pub use sampler::{FrameSampler, SamplerConfig, Transform};
pub use software::RxingFactory;

/// Symbologies the scanner is restricted to
pub const TARGET_SYMBOLOGIES: [Symbology; 2] = [Symbology::Ean13, Symbology::Code128];

/// Barcode encoding standard of a decoded value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbology {
    Ean13,
    Code128,
    Unknown,
}

impl Symbology {
    /// Whether values of this symbology are digits only
    pub fn is_numeric(&self) -> bool {
        matches!(self, Symbology::Ean13)
    }
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbology::Ean13 => write!(f, "EAN-13"),
            Symbology::Code128 => write!(f, "Code 128"),
            Symbology::Unknown => write!(f, "unknown"),
        }
    }
}

/// A barcode value read from a raster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedResult {
    /// Trimmed payload
    pub value: String,
    /// Symbology reported by the backend
    pub symbology: Symbology,
}

impl DecodedResult {
    /// Build a result, trimming the payload; empty payloads yield `None`
    pub fn new(value: &str, symbology: Symbology) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        Some(Self {
            value: value.to_string(),
            symbology,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoded_result_trims() {
        let result = DecodedResult::new("  4006381333931\n", Symbology::Ean13).unwrap();
        assert_eq!(result.value, "4006381333931");
        assert!(DecodedResult::new("   ", Symbology::Code128).is_none());
    }

    #[test]
    fn test_only_ean_is_numeric() {
        assert!(Symbology::Ean13.is_numeric());
        assert!(!Symbology::Code128.is_numeric());
        assert!(!Symbology::Unknown.is_numeric());
    }
}
