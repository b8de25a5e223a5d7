use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::naming::OutputNaming;
use super::{SessionEvent, SessionEvents};
use crate::graph::{GraphError, MediaGraph, Node, NodeState};

/// Ends the current output file without stalling the rest of the graph.
pub struct SegmentFinalizer<G: MediaGraph> {
    graph: Arc<G>,
    events: SessionEvents,
}

impl<G: MediaGraph> SegmentFinalizer<G> {
    pub fn new(graph: Arc<G>, events: SessionEvents) -> Self {
        Self { graph, events }
    }

    /// Push end-of-stream into the recording branch.
    ///
    /// The gate must already be closed. Completion shows up later as a
    /// [`SessionEvent::ForwardedEos`]; a failed push as a
    /// [`SessionEvent::GraphError`].
    pub fn begin(&self) -> JoinHandle<()> {
        // Preview branch never goes EOS, so the bin would hold the message forever.
        self.graph.forward_branch_eos(true);

        let graph = self.graph.clone();
        let events = self.events.clone();
        tokio::task::spawn_blocking(move || {
            debug!("Pushing end-of-stream into recording branch");
            if let Err(err) = graph.send_end_of_stream() {
                error!("Failed to finalize segment: {}", err);
                events.send(SessionEvent::GraphError {
                    source: "recording-branch".to_string(),
                    message: err.to_string(),
                });
            }
        })
    }

    /// Repoint the writer at the next output file.
    ///
    /// Must complete before the gate reopens. A failed transition leaves the
    /// writer half closed and is returned as is, without retrying.
    pub fn swap(&self, naming: &mut OutputNaming) -> Result<(u32, PathBuf), GraphError> {
        self.graph.set_state(Node::Writer, NodeState::Stopped)?;
        self.graph.set_state(Node::Muxer, NodeState::Stopped)?;

        let (index, location) = naming.next();
        info!("Setting writer location to {}", location.display());
        self.graph.set_location(&location)?;

        self.graph.set_state(Node::Writer, NodeState::Running)?;
        self.graph.set_state(Node::Muxer, NodeState::Running)?;

        Ok((index, location))
    }
}
