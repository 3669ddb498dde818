//! Message types sent from the scan pipeline to the operator console

use crate::prompt::{PromptOutcome, PromptTicket};

/// Events emitted by the scan controller and quantity prompt
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// Status line update
    Status(String),
    /// A quantity prompt opened and awaits the operator
    PromptOpened {
        ticket: PromptTicket,
        quick_values: Vec<u32>,
    },
    /// Free-text input was rejected; the prompt stays open
    PromptRejected { ticket: PromptTicket, message: String },
    /// A prompt resolved
    PromptClosed {
        ticket: PromptTicket,
        outcome: PromptOutcome,
    },
    /// A confirmed quantity was committed
    TallyChanged { code: String, added: u32, total: u64 },
    /// Failure the operator must act on
    Alert(String),
    /// Scanning stopped and the camera was released
    Stopped,
}
