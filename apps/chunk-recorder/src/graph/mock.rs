//! In-memory [`MediaGraph`] used by the tests.
//!
//! Buffers pushed with [`MockGraph::push_buffer`] run through the installed
//! probes the way they would on the recording queue's output pad: a
//! blocking probe holds the first buffer (later ones leak out of the
//! queue), and removing it replays the held buffer through the remaining
//! probes. Buffers that get through are recorded against the writer's
//! current location.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{
    BufferMeta, GraphError, MediaGraph, Node, NodeState, ProbeCallback, ProbeKind, ProbeVerdict,
};
use crate::recording::{SessionEvent, SessionEvents};

#[derive(Debug)]
pub struct MockProbeId(u64);

/// Fate of one pushed buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Written(PathBuf),
    Dropped,
    Held,
    Leaked,
}

struct InstalledProbe {
    id: u64,
    kind: ProbeKind,
    callback: Arc<ProbeCallback>,
}

#[derive(Default)]
struct MockState {
    next_probe: u64,
    probes: Vec<InstalledProbe>,
    held: Option<BufferMeta>,
    location: Option<PathBuf>,
    locations: Vec<PathBuf>,
    written: Vec<(PathBuf, BufferMeta)>,
    transitions: Vec<(Node, NodeState)>,
    failure: Option<(Node, NodeState, usize)>,
    forwarding: bool,
    hold_eos: bool,
    sole_sink: bool,
    eos_failure: Option<usize>,
    eos_sent: usize,
    double_removals: usize,
    events: Option<SessionEvents>,
}

#[derive(Default)]
pub struct MockGraph {
    state: Mutex<MockState>,
}

impl MockGraph {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the `occurrence`-th (1-based) request to move `node` to `state`.
    pub fn fail_transition(&self, node: Node, state: NodeState, occurrence: usize) {
        self.state.lock().failure = Some((node, state, occurrence));
    }

    /// Swallow end-of-stream instead of forwarding it, like a muxer stuck flushing.
    pub fn hold_eos(&self, hold: bool) {
        self.state.lock().hold_eos = hold;
    }

    /// Refuse the `occurrence`-th (1-based) end-of-stream push.
    pub fn fail_eos(&self, occurrence: usize) {
        self.state.lock().eos_failure = Some(occurrence);
    }

    /// Treat the writer as the only sink: its EOS also ends the whole
    /// pipeline, right after the forwarded one.
    pub fn sole_sink(&self, sole: bool) {
        self.state.lock().sole_sink = sole;
    }

    /// Post an error message on the bus.
    pub fn post_error(&self, source: &str, message: &str) {
        self.post(SessionEvent::GraphError {
            source: source.to_string(),
            message: message.to_string(),
        });
    }

    /// Post a pipeline-wide end-of-stream on the bus.
    pub fn post_stream_end(&self) {
        self.post(SessionEvent::StreamEnded);
    }

    fn post(&self, event: SessionEvent) {
        let events = self.state.lock().events.clone();
        if let Some(events) = events {
            events.send(event);
        }
    }

    pub fn push_buffer(&self, meta: BufferMeta) -> Delivery {
        let blocker = {
            let state = self.state.lock();
            state
                .probes
                .iter()
                .find(|p| p.kind == ProbeKind::Block)
                .map(|p| p.callback.clone())
        };

        if let Some(callback) = blocker {
            callback(&meta);
            let mut state = self.state.lock();
            if state.held.is_none() {
                state.held = Some(meta);
                return Delivery::Held;
            }
            return Delivery::Leaked;
        }

        self.deliver(meta)
    }

    fn deliver(&self, meta: BufferMeta) -> Delivery {
        let probes: Vec<(u64, Arc<ProbeCallback>)> = {
            let state = self.state.lock();
            state
                .probes
                .iter()
                .filter(|p| p.kind == ProbeKind::Inspect)
                .map(|p| (p.id, p.callback.clone()))
                .collect()
        };

        for (id, callback) in probes {
            match callback(&meta) {
                ProbeVerdict::Keep => {}
                ProbeVerdict::Drop => return Delivery::Dropped,
                ProbeVerdict::Release => {
                    self.state.lock().probes.retain(|p| p.id != id);
                }
            }
        }

        let mut state = self.state.lock();
        let location = state
            .location
            .clone()
            .unwrap_or_else(|| PathBuf::from("<unset>"));
        state.written.push((location.clone(), meta));
        Delivery::Written(location)
    }

    pub fn probe_count(&self) -> usize {
        self.state.lock().probes.len()
    }

    pub fn locations(&self) -> Vec<PathBuf> {
        self.state.lock().locations.clone()
    }

    pub fn written(&self) -> Vec<(PathBuf, BufferMeta)> {
        self.state.lock().written.clone()
    }

    pub fn written_to(&self, location: &Path) -> Vec<BufferMeta> {
        self.state
            .lock()
            .written
            .iter()
            .filter(|(path, _)| path == location)
            .map(|(_, meta)| *meta)
            .collect()
    }

    pub fn transitions(&self) -> Vec<(Node, NodeState)> {
        self.state.lock().transitions.clone()
    }

    pub fn eos_sent(&self) -> usize {
        self.state.lock().eos_sent
    }

    /// Removals of a probe that was no longer installed.
    pub fn double_removals(&self) -> usize {
        self.state.lock().double_removals
    }

    pub fn is_forwarding(&self) -> bool {
        self.state.lock().forwarding
    }
}

impl MediaGraph for MockGraph {
    type ProbeId = MockProbeId;

    fn set_state(&self, node: Node, target: NodeState) -> Result<(), GraphError> {
        let mut state = self.state.lock();
        state.transitions.push((node, target));

        if let Some((fail_node, fail_state, occurrence)) = state.failure {
            if fail_node == node && fail_state == target {
                let seen = state
                    .transitions
                    .iter()
                    .filter(|t| **t == (node, target))
                    .count();
                if seen == occurrence {
                    return Err(GraphError::StateChange {
                        node,
                        state: target,
                        reason: "injected failure".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn set_location(&self, location: &Path) -> Result<(), GraphError> {
        let mut state = self.state.lock();
        state.location = Some(location.to_path_buf());
        state.locations.push(location.to_path_buf());
        Ok(())
    }

    fn add_probe(
        &self,
        kind: ProbeKind,
        callback: ProbeCallback,
    ) -> Result<Self::ProbeId, GraphError> {
        let mut state = self.state.lock();
        state.next_probe += 1;
        let id = state.next_probe;
        state.probes.push(InstalledProbe {
            id,
            kind,
            callback: Arc::new(callback),
        });
        debug!("Mock probe {} installed ({:?})", id, kind);
        Ok(MockProbeId(id))
    }

    fn remove_probe(&self, id: Self::ProbeId) {
        let replay = {
            let mut state = self.state.lock();
            let before = state.probes.len();
            state.probes.retain(|p| p.id != id.0);
            if before == state.probes.len() {
                warn!("Mock probe {} removed twice", id.0);
                state.double_removals += 1;
                return;
            }

            let still_blocked = state.probes.iter().any(|p| p.kind == ProbeKind::Block);
            if still_blocked {
                None
            } else {
                state.held.take()
            }
        };

        if let Some(meta) = replay {
            self.deliver(meta);
        }
    }

    fn send_end_of_stream(&self) -> Result<(), GraphError> {
        let (events, forward, sole_sink) = {
            let mut state = self.state.lock();
            state.eos_sent += 1;
            if state.eos_failure == Some(state.eos_sent) {
                return Err(GraphError::EndOfStream(
                    "mock-mux:sink refused EOS".to_string(),
                ));
            }
            (
                state.events.clone(),
                state.forwarding && !state.hold_eos,
                state.sole_sink,
            )
        };

        if forward {
            if let Some(events) = events {
                events.send(SessionEvent::ForwardedEos {
                    source: "mock-filesink".to_string(),
                });
                if sole_sink {
                    events.send(SessionEvent::StreamEnded);
                }
            }
        }
        Ok(())
    }

    fn forward_branch_eos(&self, enabled: bool) {
        self.state.lock().forwarding = enabled;
    }

    fn subscribe(&self, events: SessionEvents) -> Result<(), GraphError> {
        self.state.lock().events = Some(events);
        Ok(())
    }
}
