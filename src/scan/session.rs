//! Scan session run-state

use parking_lot::Mutex;
use std::sync::Arc;

/// Controller lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanPhase {
    #[default]
    Idle,
    /// Acquiring the camera and initialising decoders
    Starting,
    /// Steady-state sampling loop
    Sampling,
    /// Waiting on the operator to confirm a quantity
    Handling,
}

/// Run-state shared between the controller and its loop task
#[derive(Debug, Clone, Default)]
pub struct ScanSession {
    phase: Arc<Mutex<ScanPhase>>,
}

impl ScanSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ScanPhase {
        *self.phase.lock()
    }

    /// True from start until stop
    pub fn is_scanning(&self) -> bool {
        self.phase() != ScanPhase::Idle
    }

    /// Move `Idle -> Starting`; returns false if a session is already active
    pub(crate) fn try_begin(&self) -> bool {
        let mut phase = self.phase.lock();
        if *phase != ScanPhase::Idle {
            return false;
        }
        *phase = ScanPhase::Starting;
        true
    }

    /// Move `Starting -> Sampling`; returns false if the start was abandoned
    pub(crate) fn mark_sampling(&self) -> bool {
        let mut phase = self.phase.lock();
        if *phase != ScanPhase::Starting {
            return false;
        }
        *phase = ScanPhase::Sampling;
        true
    }

    pub(crate) fn reset(&self) {
        *self.phase.lock() = ScanPhase::Idle;
    }

    /// Enter `Handling` for the lifetime of the returned guard
    pub(crate) fn enter_handling(&self) -> HandlingGuard {
        {
            let mut phase = self.phase.lock();
            if *phase == ScanPhase::Sampling {
                *phase = ScanPhase::Handling;
            }
        }
        HandlingGuard { session: self.clone() }
    }
}

/// Returns the session to `Sampling` when dropped, on every exit path
#[derive(Debug)]
pub struct HandlingGuard {
    session: ScanSession,
}

impl Drop for HandlingGuard {
    fn drop(&mut self) {
        let mut phase = self.session.phase.lock();
        // A stop in the meantime already moved us to Idle
        if *phase == ScanPhase::Handling {
            *phase = ScanPhase::Sampling;
        }
    }
}
