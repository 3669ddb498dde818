//! Quantity prompt
//!
//! A single-slot request/response between the scan loop and the operator.
//! `ask` suspends the caller until the operator confirms a quantity or
//! cancels. Only one prompt may be outstanding; every resolution carries the
//! ticket of the prompt it answers, so a stale interaction has no effect.

use parking_lot::Mutex;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::shared::{EventSink, ScanEvent};

/// Identifies one prompt instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTicket {
    pub id: u64,
    pub code: String,
}

/// How a prompt was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptOutcome {
    Confirmed(NonZeroU32),
    Cancelled,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("a quantity prompt is already open for {0}")]
    AlreadyPending(String),
}

/// Rejected free-text quantity; the prompt stays open
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum QuantityInputError {
    #[error("Enter a whole number greater than 0")]
    Empty,
    #[error("Enter a whole number greater than 0")]
    NotANumber,
    #[error("Enter a whole number greater than 0")]
    NotPositive,
    #[error("Quantity is too large")]
    TooLarge,
}

/// Default quick-confirm values
pub const DEFAULT_QUICK_VALUES: [u32; 3] = [1, 3, 5];

/// Most quick values a prompt offers; extras are dropped
pub const MAX_QUICK_VALUES: usize = 8;

/// Parse operator text as a positive whole number.
///
/// Surrounding whitespace is ignored; signs, decimals and trailing text are
/// rejected.
pub fn parse_quantity(text: &str) -> Result<NonZeroU32, QuantityInputError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(QuantityInputError::Empty);
    }
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(QuantityInputError::NotANumber);
    }
    let value: u32 = text.parse().map_err(|_| QuantityInputError::TooLarge)?;
    NonZeroU32::new(value).ok_or(QuantityInputError::NotPositive)
}

struct Pending {
    ticket: PromptTicket,
    responder: oneshot::Sender<PromptOutcome>,
}

struct PromptInner {
    slot: Mutex<Option<Pending>>,
    next_id: AtomicU64,
    quick_values: Vec<NonZeroU32>,
    events: EventSink,
}

impl PromptInner {
    /// Take the pending responder if it belongs to `id`
    fn take(&self, id: u64) -> Option<Pending> {
        let mut slot = self.slot.lock();
        match slot.as_ref() {
            Some(pending) if pending.ticket.id == id => slot.take(),
            _ => None,
        }
    }

    fn finish(&self, pending: Pending, outcome: PromptOutcome) {
        let Pending { ticket, responder } = pending;
        // The asker may already be gone; the slot is cleared either way
        let _ = responder.send(outcome);
        debug!(id = ticket.id, code = %ticket.code, ?outcome, "Prompt resolved");
        self.events.emit(ScanEvent::PromptClosed { ticket, outcome });
    }
}

/// Clears the slot if `ask` is dropped before resolution
struct SlotGuard<'a> {
    inner: &'a PromptInner,
    id: u64,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if let Some(pending) = self.inner.take(self.id) {
            self.inner.finish(pending, PromptOutcome::Cancelled);
        }
    }
}

/// Handle to the operator's quantity prompt
#[derive(Clone)]
pub struct QuantityPrompt {
    inner: Arc<PromptInner>,
}

impl QuantityPrompt {
    pub fn new(mut quick_values: Vec<NonZeroU32>, events: EventSink) -> Self {
        if quick_values.is_empty() {
            quick_values = DEFAULT_QUICK_VALUES.iter().filter_map(|&v| NonZeroU32::new(v)).collect();
        }
        if quick_values.len() > MAX_QUICK_VALUES {
            warn!(
                "{} quick values configured, keeping the first {}",
                quick_values.len(),
                MAX_QUICK_VALUES
            );
            quick_values.truncate(MAX_QUICK_VALUES);
        }
        Self {
            inner: Arc::new(PromptInner {
                slot: Mutex::new(None),
                next_id: AtomicU64::new(1),
                quick_values,
                events,
            }),
        }
    }

    pub fn quick_values(&self) -> &[NonZeroU32] {
        &self.inner.quick_values
    }

    /// Currently open prompt, if any
    pub fn pending(&self) -> Option<PromptTicket> {
        self.inner.slot.lock().as_ref().map(|p| p.ticket.clone())
    }

    /// Open a prompt for `code` and wait for the operator.
    ///
    /// Dropping the returned future resolves the prompt as cancelled.
    pub async fn ask(&self, code: &str) -> Result<PromptOutcome, PromptError> {
        let (ticket, response) = {
            let mut slot = self.inner.slot.lock();
            if let Some(pending) = slot.as_ref() {
                return Err(PromptError::AlreadyPending(pending.ticket.code.clone()));
            }
            let ticket = PromptTicket {
                id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
                code: code.to_string(),
            };
            let (responder, response) = oneshot::channel();
            *slot = Some(Pending {
                ticket: ticket.clone(),
                responder,
            });
            (ticket, response)
        };

        info!(id = ticket.id, code = %ticket.code, "Prompting for quantity");
        self.inner.events.emit(ScanEvent::PromptOpened {
            ticket: ticket.clone(),
            quick_values: self.inner.quick_values.iter().map(|v| v.get()).collect(),
        });

        let _guard = SlotGuard {
            inner: &self.inner,
            id: ticket.id,
        };
        Ok(response.await.unwrap_or(PromptOutcome::Cancelled))
    }

    /// Resolve prompt `id`; returns false if it is no longer open
    pub fn resolve(&self, id: u64, outcome: PromptOutcome) -> bool {
        match self.inner.take(id) {
            Some(pending) => {
                self.inner.finish(pending, outcome);
                true
            }
            None => false,
        }
    }

    /// Confirm with the quick value at `index`
    pub fn confirm_quick(&self, id: u64, index: usize) -> bool {
        match self.inner.quick_values.get(index) {
            Some(&quantity) => self.resolve(id, PromptOutcome::Confirmed(quantity)),
            None => false,
        }
    }

    /// Confirm with free text.
    ///
    /// Invalid text leaves the prompt open and returns the inline message.
    /// `Ok(false)` means the ticket was stale.
    pub fn submit_text(&self, id: u64, text: &str) -> Result<bool, QuantityInputError> {
        let Some(ticket) = self.pending().filter(|t| t.id == id) else {
            return Ok(false);
        };
        match parse_quantity(text) {
            Ok(quantity) => Ok(self.resolve(id, PromptOutcome::Confirmed(quantity))),
            Err(e) => {
                debug!(id, input = text, "Rejected quantity input");
                self.inner.events.emit(ScanEvent::PromptRejected {
                    ticket,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    pub fn cancel(&self, id: u64) -> bool {
        self.resolve(id, PromptOutcome::Cancelled)
    }

    /// Cancel whatever prompt is open
    pub fn cancel_pending(&self) -> Option<PromptTicket> {
        let pending = self.inner.slot.lock().take()?;
        let ticket = pending.ticket.clone();
        self.inner.finish(pending, PromptOutcome::Cancelled);
        Some(ticket)
    }
}

impl Default for QuantityPrompt {
    fn default() -> Self {
        Self::new(Vec::new(), EventSink::discard())
    }
}
