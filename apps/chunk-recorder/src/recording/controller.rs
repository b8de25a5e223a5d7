use std::ops::ControlFlow;
use std::sync::Arc;

use chrono::Local;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn};

use super::{
    GateState, OutputNaming, RecordingGate, SegmentFinalizer, SegmentRecord, SegmentState,
    SegmentTimer, SessionConfig, SessionEvent, SessionEvents, SessionOutcome,
};
use crate::graph::{MediaGraph, Node, NodeState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Gate closed from the start, waiting for the first start signal.
    Priming,
    Recording,
    /// Gate closing for the stop signal.
    Stopping,
    /// End-of-stream sent, waiting for it to come back forwarded.
    Finalizing,
    /// Writer repointed, gate closed until the gap elapses.
    Swapped,
    /// Finalizing the last segment before a requested shutdown.
    Draining,
    Closed,
    Terminated,
}

/// State machine tying the gate, finalizer, timer and naming together.
///
/// Only ever driven from the session loop, so it needs no locking.
pub struct BoundaryController<G: MediaGraph> {
    config: SessionConfig,
    graph: Arc<G>,
    naming: OutputNaming,
    gate: RecordingGate<G>,
    finalizer: SegmentFinalizer<G>,
    timer: SegmentTimer,
    state: ControllerState,
    segments: Vec<SegmentRecord>,
    span: tracing::Span,
}

impl<G: MediaGraph> BoundaryController<G> {
    pub fn new(graph: Arc<G>, config: SessionConfig, events: SessionEvents) -> Self {
        let mut naming =
            OutputNaming::new(config.location_prefix.clone(), config.extension.clone());
        let (index, location) = naming.next();

        Self {
            naming,
            gate: RecordingGate::new(graph.clone(), events.clone()),
            finalizer: SegmentFinalizer::new(graph.clone(), events.clone()),
            timer: SegmentTimer::new(events),
            state: ControllerState::Priming,
            segments: vec![SegmentRecord::pending(index, location)],
            span: info_span!("segment", index),
            config,
            graph,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    pub fn segments(&self) -> &[SegmentRecord] {
        &self.segments
    }

    pub fn into_segments(self) -> Vec<SegmentRecord> {
        self.segments
    }

    /// Close the gate, target segment 0 and start the pipeline.
    pub fn prime(&mut self) -> crate::Result<()> {
        self.gate.close()?;

        let location = self.current_mut().location.clone();
        info!("Setting writer location to {}", location.display());
        self.graph.set_location(&location)?;

        self.graph.set_state(Node::Pipeline, NodeState::Running)?;

        self.state = ControllerState::Priming;
        self.timer.after_priming(self.config.priming_delay);
        if let Some(period) = self.config.status_interval {
            self.timer.status_every(period);
        }
        Ok(())
    }

    pub fn handle(&mut self, event: SessionEvent) -> ControlFlow<SessionOutcome> {
        let span = self.span.clone();
        let _enter = span.enter();

        if matches!(self.state, ControllerState::Closed | ControllerState::Terminated) {
            debug!("Session over, ignoring {:?}", event);
            return ControlFlow::Continue(());
        }

        match event {
            SessionEvent::StartSignal => self.on_start(),
            SessionEvent::StopSignal => self.on_stop(),
            SessionEvent::ForwardedEos { source } => self.on_forwarded_eos(&source),
            SessionEvent::KeyframeAdmitted { pts, dropped } => {
                self.on_keyframe(pts, dropped);
                ControlFlow::Continue(())
            }
            SessionEvent::GraphError { source, message } => {
                self.terminate(format!("{}: {}", source, message))
            }
            SessionEvent::StreamEnded => self.on_stream_ended(),
            SessionEvent::ShutdownRequested => self.on_shutdown(),
            SessionEvent::DrainTimeout => self.on_drain_timeout(),
            SessionEvent::StatusTick => {
                self.log_status();
                ControlFlow::Continue(())
            }
        }
    }

    fn on_start(&mut self) -> ControlFlow<SessionOutcome> {
        if !matches!(self.state, ControllerState::Priming | ControllerState::Swapped) {
            warn!("Ignoring start signal in state {:?}", self.state);
            return ControlFlow::Continue(());
        }

        if let Err(err) = self.gate.open_at_next_keyframe() {
            return self.terminate(format!("failed to reopen recording gate: {}", err));
        }

        let now = Instant::now();
        let segment = self.current_mut();
        segment.state = SegmentState::Open;
        segment.opened_at = Some(now);
        segment.started = Some(Local::now());
        info!(
            "Recording segment {} to {}",
            segment.index,
            segment.location.display()
        );

        self.timer.after_record_duration(self.config.record_duration);
        self.state = ControllerState::Recording;
        ControlFlow::Continue(())
    }

    fn on_stop(&mut self) -> ControlFlow<SessionOutcome> {
        if self.state != ControllerState::Recording {
            warn!("Ignoring stop signal in state {:?}", self.state);
            return ControlFlow::Continue(());
        }

        if let Err(outcome) = self.close_segment() {
            return ControlFlow::Break(outcome);
        }
        self.state = ControllerState::Finalizing;
        ControlFlow::Continue(())
    }

    fn on_forwarded_eos(&mut self, source: &str) -> ControlFlow<SessionOutcome> {
        info!("Forwarded EOS from {}", source);
        match self.state {
            ControllerState::Finalizing => {
                let closed_at = Instant::now();
                let swapped = self.finalizer.swap(&mut self.naming);
                match swapped {
                    Ok((index, location)) => {
                        let segment = self.current_mut();
                        segment.state = SegmentState::Closed;
                        segment.closed_at = Some(closed_at);
                        info!("Segment {} closed", segment.index);

                        self.push_segment(index, location);
                        self.state = ControllerState::Swapped;
                        self.timer.after_gap_duration(self.config.gap_duration);
                        ControlFlow::Continue(())
                    }
                    Err(err) => self.terminate(format!("failed to swap writer: {}", err)),
                }
            }
            ControllerState::Draining => {
                let segment = self.current_mut();
                segment.state = SegmentState::Closed;
                segment.closed_at = Some(Instant::now());
                info!("Final segment {} closed", segment.index);
                self.finish()
            }
            other => {
                warn!("Unexpected forwarded EOS in state {:?}", other);
                ControlFlow::Continue(())
            }
        }
    }

    fn on_stream_ended(&mut self) -> ControlFlow<SessionOutcome> {
        // Once we pushed EOS into the branch, a writer-only pipeline goes EOS
        // as a whole too. That one is ours.
        if !matches!(self.state, ControllerState::Priming | ControllerState::Recording) {
            debug!("Ignoring pipeline EOS in state {:?}", self.state);
            return ControlFlow::Continue(());
        }
        info!("Stream ended");
        self.finish()
    }

    fn on_keyframe(&mut self, pts: Option<gst::ClockTime>, dropped: u32) {
        let segment = self.current_mut();
        let recording = matches!(segment.state, SegmentState::Open | SegmentState::Finalizing);
        if !recording || segment.first_pts.is_some() {
            debug!("Ignoring keyframe admission for segment {}", segment.index);
            return;
        }

        segment.first_pts = pts;
        segment.dropped_before_keyframe = dropped;
        info!(
            "Segment {} starts at keyframe {:?} ({} buffers dropped)",
            segment.index,
            pts,
            dropped
        );
    }

    fn on_shutdown(&mut self) -> ControlFlow<SessionOutcome> {
        info!("Shutdown requested in state {:?}", self.state);
        match self.state {
            ControllerState::Priming | ControllerState::Swapped => self.finish(),
            ControllerState::Recording => {
                if let Err(outcome) = self.close_segment() {
                    return ControlFlow::Break(outcome);
                }
                self.drain()
            }
            ControllerState::Finalizing => self.drain(),
            _ => ControlFlow::Continue(()),
        }
    }

    fn on_drain_timeout(&mut self) -> ControlFlow<SessionOutcome> {
        if self.state != ControllerState::Draining {
            return ControlFlow::Continue(());
        }
        let index = self.current_mut().index;
        warn!(
            "Segment {} did not finish within {:?}, stopping anyway",
            index, self.config.drain_timeout
        );
        self.finish()
    }

    /// Close the gate and push end-of-stream into the open segment.
    fn close_segment(&mut self) -> Result<(), SessionOutcome> {
        self.state = ControllerState::Stopping;
        if let Err(err) = self.gate.close() {
            return Err(self.fail(format!("failed to close recording gate: {}", err)));
        }

        let segment = self.current_mut();
        segment.state = SegmentState::Finalizing;
        segment.stop_at = Some(Instant::now());
        info!("Stopping segment {}", segment.index);

        self.finalizer.begin();
        Ok(())
    }

    fn drain(&mut self) -> ControlFlow<SessionOutcome> {
        self.state = ControllerState::Draining;
        self.timer.after_drain_timeout(self.config.drain_timeout);
        ControlFlow::Continue(())
    }

    fn finish(&mut self) -> ControlFlow<SessionOutcome> {
        self.state = ControllerState::Closed;
        ControlFlow::Break(SessionOutcome::Completed)
    }

    fn terminate(&mut self, reason: String) -> ControlFlow<SessionOutcome> {
        ControlFlow::Break(self.fail(reason))
    }

    fn fail(&mut self, reason: String) -> SessionOutcome {
        error!("Terminating session: {}", reason);
        self.state = ControllerState::Terminated;
        SessionOutcome::Failed(reason)
    }

    fn push_segment(&mut self, index: u32, location: std::path::PathBuf) {
        self.span = info_span!("segment", index);
        self.segments.push(SegmentRecord::pending(index, location));
    }

    // Never empty: segment 0 exists from construction.
    fn current_mut(&mut self) -> &mut SegmentRecord {
        let last = self.segments.len() - 1;
        &mut self.segments[last]
    }

    fn log_status(&self) {
        if let Some(segment) = self.segments.last() {
            info!(
                "Status: {:?}, gate {:?}, segment {} ({:?}) at {}",
                self.state,
                self.gate.state(),
                segment.index,
                segment.state,
                segment.location.display()
            );
        }
    }
}
