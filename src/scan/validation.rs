//! Format validation of decoded values
//!
//! Misdetections are discarded silently here, before the controller ever
//! enters the handling state.

use serde::{Deserialize, Serialize};

use crate::vision::DecodedResult;

/// How to treat values reported as EAN-13 that are not 13 digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EanPolicy {
    /// Reject them as misdetections
    #[default]
    Strict,
    /// Accept any non-empty value
    Lenient,
}

/// Exactly 13 ASCII digits
pub fn is_ean13(value: &str) -> bool {
    value.len() == 13 && value.bytes().all(|b| b.is_ascii_digit())
}

/// Return the code to prompt for, or `None` if the result must be discarded
pub fn accept(result: DecodedResult, policy: EanPolicy) -> Option<String> {
    let code = result.value.trim();
    if code.is_empty() {
        return None;
    }
    if result.symbology.is_numeric() && policy == EanPolicy::Strict && !is_ean13(code) {
        return None;
    }
    Some(code.to_string())
}
