//! Segment-boundary control for chunked recording.
//!
//! A [`Session`] owns a [`BoundaryController`] and feeds it
//! [`SessionEvent`]s from timers, the graph bus and the recording gate.
//! The controller closes the gate at the end of each record period, drains
//! the recording branch with a branch-local end-of-stream, points the writer
//! at the next `{prefix}-{NNN}.{ext}` file and reopens the gate on the next
//! keyframe once the gap period is over.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::time::Instant;

use crate::graph::MediaGraph;

mod controller;
mod event;
mod finalizer;
mod gate;
mod naming;
mod session;
mod timer;

pub use controller::{BoundaryController, ControllerState};
pub use event::{SessionEvent, SessionEvents};
pub use finalizer::SegmentFinalizer;
pub use gate::{GateError, GateState, RecordingGate};
pub use naming::OutputNaming;
pub use session::{Session, SessionConfig, SessionHandle, SessionOutcome, SessionReport};
pub use timer::{Deferred, SegmentTimer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// Writer points at the file, the gate has not reopened yet.
    Pending,
    Open,
    Finalizing,
    Closed,
}

/// One output file and what happened to it.
#[derive(Debug, Clone)]
pub struct SegmentRecord {
    pub index: u32,
    pub location: PathBuf,
    pub state: SegmentState,
    pub opened_at: Option<Instant>,
    pub stop_at: Option<Instant>,
    pub closed_at: Option<Instant>,
    pub started: Option<DateTime<Local>>,
    pub first_pts: Option<gst::ClockTime>,
    pub dropped_before_keyframe: u32,
}

impl SegmentRecord {
    pub(crate) fn pending(index: u32, location: PathBuf) -> Self {
        Self {
            index,
            location,
            state: SegmentState::Pending,
            opened_at: None,
            stop_at: None,
            closed_at: None,
            started: None,
            first_pts: None,
            dropped_before_keyframe: 0,
        }
    }

    /// Time from opening to the stop signal.
    pub fn recorded_for(&self) -> Option<Duration> {
        Some(self.stop_at?.duration_since(self.opened_at?))
    }
}

/// Record `{prefix}-{NNN}.mp4` chunks of `record` length, `gap` apart,
/// until the graph fails.
pub async fn start<G: MediaGraph>(
    graph: Arc<G>,
    prefix: &str,
    record: Duration,
    gap: Duration,
) -> crate::Result<SessionReport> {
    Session::new(graph, SessionConfig::new(prefix, record, gap))
        .run()
        .await
}
