use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

/// Everything the boundary controller reacts to, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Record duration of the open segment elapsed.
    StopSignal,
    /// Priming or gap delay elapsed, recording may resume.
    StartSignal,
    /// The recording branch finished flushing its end-of-stream.
    ForwardedEos { source: String },
    /// The gate let the first keyframe of a segment through.
    KeyframeAdmitted {
        pts: Option<gst::ClockTime>,
        dropped: u32,
    },
    /// The graph reported an unrecoverable error.
    GraphError { source: String, message: String },
    /// The whole pipeline reached end-of-stream, nothing more will flow.
    StreamEnded,
    /// The caller asked for a clean stop.
    ShutdownRequested,
    /// The final segment did not finish flushing in time.
    DrainTimeout,
    /// Periodic status report.
    StatusTick,
}

/// Sending side of the session event queue.
///
/// Cloned into timers, probe callbacks, the bus handler and the EOS
/// worker. Once the session has ended every clone turns inert.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    tx: mpsc::UnboundedSender<SessionEvent>,
    live: Arc<AtomicBool>,
}

impl SessionEvents {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                live: Arc::new(AtomicBool::new(true)),
            },
            rx,
        )
    }

    /// Queue an event. Returns false once the session is over.
    pub fn send(&self, event: SessionEvent) -> bool {
        if !self.is_live() {
            return false;
        }
        self.tx.send(event).is_ok()
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn close(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}
