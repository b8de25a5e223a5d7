use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, trace};

use super::{SessionEvent, SessionEvents};
use crate::graph::{BufferMeta, GraphError, MediaGraph, ProbeKind, ProbeVerdict};

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Recording gate is already closed")]
    AlreadyClosed,
    #[error("Recording gate is not closed")]
    NotClosed,
    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Open,
    Blocked,
    DropUntilKeyframe,
}

enum KeyframeProbe<Id> {
    Idle,
    Installing,
    Installed(Id),
}

/// Keyframe probe bookkeeping shared with the streaming thread.
///
/// `generation` identifies the probe a callback belongs to, so a callback
/// racing with `close()` can never retire a newer probe.
struct KeyframeSlot<Id> {
    generation: u64,
    probe: KeyframeProbe<Id>,
}

/// Buffer-level valve on the recording queue's output pad.
pub struct RecordingGate<G: MediaGraph> {
    graph: Arc<G>,
    events: SessionEvents,
    block_probe: Option<G::ProbeId>,
    keyframe: Arc<Mutex<KeyframeSlot<G::ProbeId>>>,
}

impl<G: MediaGraph> RecordingGate<G> {
    pub fn new(graph: Arc<G>, events: SessionEvents) -> Self {
        Self {
            graph,
            events,
            block_probe: None,
            keyframe: Arc::new(Mutex::new(KeyframeSlot {
                generation: 0,
                probe: KeyframeProbe::Idle,
            })),
        }
    }

    pub fn state(&self) -> GateState {
        if self.block_probe.is_some() {
            return GateState::Blocked;
        }
        match self.keyframe.lock().probe {
            KeyframeProbe::Idle => GateState::Open,
            KeyframeProbe::Installing | KeyframeProbe::Installed(_) => GateState::DropUntilKeyframe,
        }
    }

    /// Stop every buffer at the recording link.
    ///
    /// A keyframe probe still waiting from the last `open_at_next_keyframe`
    /// is removed once the block is in place.
    pub fn close(&mut self) -> Result<(), GateError> {
        if self.block_probe.is_some() {
            return Err(GateError::AlreadyClosed);
        }

        let id = self.graph.add_probe(
            ProbeKind::Block,
            Box::new(|meta: &BufferMeta| {
                trace!("Recording link blocked at pts {:?}", meta.pts);
                ProbeVerdict::Keep
            }),
        )?;
        self.block_probe = Some(id);

        let pending = {
            let mut slot = self.keyframe.lock();
            slot.generation += 1;
            std::mem::replace(&mut slot.probe, KeyframeProbe::Idle)
        };
        if let KeyframeProbe::Installed(id) = pending {
            debug!("Keyframe never arrived, removing pending keyframe probe");
            self.graph.remove_probe(id);
        }

        debug!("Recording gate closed");
        Ok(())
    }

    /// Reopen the link so the next recorded buffer is a keyframe.
    ///
    /// The first buffer seen is the one that was held by the block and is
    /// always dropped. Later buffers are dropped until a keyframe arrives,
    /// which passes and retires the probe.
    pub fn open_at_next_keyframe(&mut self) -> Result<(), GateError> {
        let Some(block_probe) = self.block_probe.take() else {
            return Err(GateError::NotClosed);
        };

        let generation = {
            let mut slot = self.keyframe.lock();
            slot.generation += 1;
            slot.probe = KeyframeProbe::Installing;
            slot.generation
        };

        let seen = AtomicU32::new(0);
        let slot = self.keyframe.clone();
        let events = self.events.clone();
        let callback = move |meta: &BufferMeta| {
            let count = seen.fetch_add(1, Ordering::SeqCst);
            if count == 0 {
                debug!("Dropping buffer held by the gate (pts {:?})", meta.pts);
                return ProbeVerdict::Drop;
            }
            if !meta.keyframe {
                trace!("Dropping delta buffer at pts {:?}, waiting for a keyframe", meta.pts);
                return ProbeVerdict::Drop;
            }

            let mut slot = slot.lock();
            if slot.generation != generation {
                // Gate closed again while this buffer was in flight.
                return ProbeVerdict::Drop;
            }
            slot.probe = KeyframeProbe::Idle;
            drop(slot);

            debug!("Keyframe at pts {:?} admitted after dropping {} buffers", meta.pts, count);
            events.send(SessionEvent::KeyframeAdmitted {
                pts: meta.pts,
                dropped: count,
            });
            ProbeVerdict::Release
        };

        let id = match self.graph.add_probe(ProbeKind::Inspect, Box::new(callback)) {
            Ok(id) => id,
            Err(err) => {
                self.keyframe.lock().probe = KeyframeProbe::Idle;
                self.block_probe = Some(block_probe);
                return Err(err.into());
            }
        };

        {
            let mut slot = self.keyframe.lock();
            if slot.generation == generation && matches!(slot.probe, KeyframeProbe::Installing) {
                slot.probe = KeyframeProbe::Installed(id);
            }
            // Otherwise the probe already released itself.
        }

        self.graph.remove_probe(block_probe);
        info!("Recording gate reopening at next keyframe");
        Ok(())
    }
}
