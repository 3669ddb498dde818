//! Messaging between the scan pipeline and the operator console
//!
//! Events travel over a crossbeam channel so that producers never block,
//! whether they run on the async scan loop or on a blocking thread.

pub mod messages;

pub use messages::ScanEvent;

use crossbeam_channel::Sender;

/// Sending half of the event channel; a disconnected receiver is ignored
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<Sender<ScanEvent>>,
}

impl EventSink {
    pub fn new(tx: Sender<ScanEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops every event
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: ScanEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn status(&self, message: impl Into<String>) {
        self.emit(ScanEvent::Status(message.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_sink_delivers_and_tolerates_disconnect() {
        let (tx, rx) = unbounded();
        let sink = EventSink::new(tx);
        sink.status("ready");
        assert_eq!(rx.try_recv().unwrap(), ScanEvent::Status("ready".to_string()));

        drop(rx);
        sink.status("nobody listening");
        EventSink::discard().emit(ScanEvent::Stopped);
    }
}
