//! Capability set the segment controller needs from the media graph.
//!
//! The controller never builds or owns the processing topology. It steers
//! four named nodes (the recording queue, its output pad, the muxer and the
//! file writer) through [`MediaGraph`], which is implemented on top of a
//! GStreamer pipeline by [`pipeline::GstGraph`] and in memory by
//! [`mock::MockGraph`].

use std::fmt;
use std::path::Path;

use crate::recording::SessionEvents;

pub mod pipeline;
pub mod mock;

/// Graph layer error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphError {
    #[error("Element not found: {0}")]
    NotFound(String),
    #[error("Pad not available: {0}")]
    MissingPad(String),
    #[error("Element {0} is no longer part of the pipeline")]
    Gone(String),
    #[error("Failed to set {node} to {state}: {reason}")]
    StateChange {
        node: Node,
        state: NodeState,
        reason: String,
    },
    #[error("Writer location {0} is not valid UTF-8")]
    InvalidLocation(String),
    #[error("Failed to install probe: {0}")]
    Probe(String),
    #[error("Failed to send end-of-stream: {0}")]
    EndOfStream(String),
    #[error("Bus error: {0}")]
    Bus(String),
    #[error("Invalid pipeline description: {0}")]
    Parse(String),
}

/// Nodes whose state the controller drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    Pipeline,
    Muxer,
    Writer,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Pipeline => f.write_str("pipeline"),
            Node::Muxer => f.write_str("muxer"),
            Node::Writer => f.write_str("writer"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    Stopped,
    Running,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Stopped => f.write_str("stopped"),
            NodeState::Running => f.write_str("running"),
        }
    }
}

/// How a probe on the recording link treats the buffers it sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    /// Holds the streaming thread on the first buffer until the probe is removed.
    Block,
    /// Sees every buffer and decides per buffer.
    Inspect,
}

/// Decision returned by a probe callback for one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// Leave the buffer alone. On a blocking probe this keeps it held.
    Keep,
    /// Discard the buffer.
    Drop,
    /// Let the buffer through and uninstall the probe.
    Release,
}

/// What a probe is allowed to know about a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferMeta {
    pub keyframe: bool,
    pub pts: Option<gst::ClockTime>,
}

impl BufferMeta {
    pub fn new(keyframe: bool, pts: Option<gst::ClockTime>) -> Self {
        Self { keyframe, pts }
    }
}

/// Probe callbacks run on streaming threads and must return promptly.
pub type ProbeCallback = Box<dyn Fn(&BufferMeta) -> ProbeVerdict + Send + Sync + 'static>;

pub trait MediaGraph: Send + Sync + 'static {
    /// Handle of an installed probe. Removing consumes it, so a handle can
    /// only ever be removed once.
    type ProbeId: Send + 'static;

    fn set_state(&self, node: Node, state: NodeState) -> Result<(), GraphError>;

    /// Repoint the file writer. Only valid while the writer is stopped.
    fn set_location(&self, location: &Path) -> Result<(), GraphError>;

    /// Install a probe on the recording queue's output pad.
    fn add_probe(&self, kind: ProbeKind, callback: ProbeCallback)
        -> Result<Self::ProbeId, GraphError>;

    fn remove_probe(&self, id: Self::ProbeId);

    /// Push end-of-stream into the recording branch only. May block while
    /// the muxer flushes, so it is never called on the controller loop.
    fn send_end_of_stream(&self) -> Result<(), GraphError>;

    /// Surface branch-local EOS immediately instead of holding it until
    /// every sink in the graph is EOS.
    fn forward_branch_eos(&self, enabled: bool);

    /// Forward bus traffic that matters to the session as [`SessionEvent`]s.
    ///
    /// [`SessionEvent`]: crate::recording::SessionEvent
    fn subscribe(&self, events: SessionEvents) -> Result<(), GraphError>;
}
