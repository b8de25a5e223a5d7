use std::path::Path;

use gst::glib;
use gst::prelude::*;
use gst::MessageView;
use tracing::{debug, error, info, warn};

use super::{
    BufferMeta, GraphError, MediaGraph, Node, NodeState, ProbeCallback, ProbeKind, ProbeVerdict,
};
use crate::config::{PipelineConfig, QueueConfig};
use crate::recording::{SessionEvent, SessionEvents};

/// [`MediaGraph`] over a parsed `gst::Pipeline`.
///
/// The pipeline is owned; the queue, its output pad, the muxer and the
/// writer are held weakly and resolved on every use.
pub struct GstGraph {
    pipeline: gst::Pipeline,
    queue_name: String,
    queue_src: glib::WeakRef<gst::Pad>,
    muxer: glib::WeakRef<gst::Element>,
    writer: glib::WeakRef<gst::Element>,
    writer_name: String,
    muxer_name: String,
}

impl GstGraph {
    /// Parse the configured description and resolve the named nodes.
    pub fn build(config: &PipelineConfig, queue: &QueueConfig) -> Result<Self, GraphError> {
        let description = config.launch_description();
        debug!("Launching pipeline: {}", description);

        let element =
            gst::parse::launch(&description).map_err(|e| GraphError::Parse(e.to_string()))?;
        let pipeline = element
            .downcast::<gst::Pipeline>()
            .map_err(|_| GraphError::Parse("description did not produce a pipeline".to_string()))?;

        Self::from_pipeline(pipeline, config, queue)
    }

    /// Wrap an existing pipeline, failing if a named node is missing.
    pub fn from_pipeline(
        pipeline: gst::Pipeline,
        config: &PipelineConfig,
        queue_config: &QueueConfig,
    ) -> Result<Self, GraphError> {
        let lookup = |name: &str| {
            pipeline
                .by_name(name)
                .ok_or_else(|| GraphError::NotFound(name.to_string()))
        };

        let queue_name = config.queue_name();
        let muxer_name = config.muxer_name();
        let writer_name = config.writer_name();

        let queue = lookup(&queue_name)?;
        let muxer = lookup(&muxer_name)?;
        let writer = lookup(&writer_name)?;

        let queue_src = queue
            .static_pad("src")
            .ok_or_else(|| GraphError::MissingPad(format!("{}:src", queue_name)))?;

        apply_queue_tuning(&queue, queue_config)?;

        info!(
            "Recording branch: {} -> {} -> {}",
            queue_name, muxer_name, writer_name
        );

        Ok(Self {
            pipeline,
            queue_name,
            queue_src: queue_src.downgrade(),
            muxer: muxer.downgrade(),
            writer: writer.downgrade(),
            writer_name,
            muxer_name,
        })
    }

    pub fn pipeline(&self) -> &gst::Pipeline {
        &self.pipeline
    }

    fn queue_src(&self) -> Result<gst::Pad, GraphError> {
        self.queue_src
            .upgrade()
            .ok_or_else(|| GraphError::Gone(format!("{}:src", self.queue_name)))
    }

    fn writer(&self) -> Result<gst::Element, GraphError> {
        self.writer
            .upgrade()
            .ok_or_else(|| GraphError::Gone(self.writer_name.clone()))
    }

    fn node(&self, node: Node) -> Result<gst::Element, GraphError> {
        match node {
            Node::Pipeline => Ok(self.pipeline.clone().upcast()),
            Node::Muxer => self
                .muxer
                .upgrade()
                .ok_or_else(|| GraphError::Gone(self.muxer_name.clone())),
            Node::Writer => self.writer(),
        }
    }
}

fn apply_queue_tuning(queue: &gst::Element, config: &QueueConfig) -> Result<(), GraphError> {
    for property in ["max-size-time", "max-size-bytes", "max-size-buffers", "leaky"] {
        if queue.find_property(property).is_none() {
            return Err(GraphError::NotFound(format!(
                "property {} on {}",
                property,
                queue.name()
            )));
        }
    }

    queue.set_property(
        "max-size-time",
        gst::ClockTime::from_seconds(config.max_size_time_seconds).nseconds(),
    );
    queue.set_property("max-size-bytes", config.max_size_bytes);
    queue.set_property("max-size-buffers", config.max_size_buffers);
    queue.set_property_from_str("leaky", &config.leaky);

    debug!(
        "Recording queue holds {}s, leaky={}",
        config.max_size_time_seconds, config.leaky
    );
    Ok(())
}

fn target_state(state: NodeState) -> gst::State {
    match state {
        NodeState::Stopped => gst::State::Null,
        NodeState::Running => gst::State::Playing,
    }
}

fn buffer_meta(buffer: &gst::BufferRef) -> BufferMeta {
    BufferMeta::new(
        !buffer.flags().contains(gst::BufferFlags::DELTA_UNIT),
        buffer.pts(),
    )
}

impl MediaGraph for GstGraph {
    type ProbeId = gst::PadProbeId;

    fn set_state(&self, node: Node, state: NodeState) -> Result<(), GraphError> {
        let element = self.node(node)?;
        debug!("Setting {} to {}", node, state);
        element
            .set_state(target_state(state))
            .map(|_| ())
            .map_err(|err| GraphError::StateChange {
                node,
                state,
                reason: format!("{:?}", err),
            })
    }

    fn set_location(&self, location: &Path) -> Result<(), GraphError> {
        let location = location
            .to_str()
            .ok_or_else(|| GraphError::InvalidLocation(location.display().to_string()))?;
        self.writer()?.set_property("location", location);
        Ok(())
    }

    fn add_probe(
        &self,
        kind: ProbeKind,
        callback: ProbeCallback,
    ) -> Result<Self::ProbeId, GraphError> {
        let mask = match kind {
            ProbeKind::Block => gst::PadProbeType::BLOCK | gst::PadProbeType::BUFFER,
            ProbeKind::Inspect => gst::PadProbeType::BUFFER,
        };

        self.queue_src()?
            .add_probe(mask, move |_pad, info| {
                let Some(gst::PadProbeData::Buffer(ref buffer)) = info.data else {
                    return gst::PadProbeReturn::Ok;
                };
                match callback(&buffer_meta(buffer)) {
                    ProbeVerdict::Keep => gst::PadProbeReturn::Ok,
                    ProbeVerdict::Drop => gst::PadProbeReturn::Drop,
                    ProbeVerdict::Release => gst::PadProbeReturn::Remove,
                }
            })
            .ok_or_else(|| {
                GraphError::Probe(format!("{}:src refused {:?} probe", self.queue_name, kind))
            })
    }

    fn remove_probe(&self, id: Self::ProbeId) {
        match self.queue_src() {
            Ok(pad) => pad.remove_probe(id),
            Err(err) => warn!("Cannot remove probe: {}", err),
        }
    }

    fn send_end_of_stream(&self) -> Result<(), GraphError> {
        let pad = self.queue_src()?;
        let peer = pad
            .peer()
            .ok_or_else(|| GraphError::MissingPad(format!("peer of {}:src", self.queue_name)))?;

        info!("Pushing EOS event on pad {}", peer.path_string());
        if peer.send_event(gst::event::Eos::new()) {
            Ok(())
        } else {
            Err(GraphError::EndOfStream(format!(
                "{} refused EOS",
                peer.path_string()
            )))
        }
    }

    fn forward_branch_eos(&self, enabled: bool) {
        self.pipeline.set_property("message-forward", enabled);
    }

    fn subscribe(&self, events: SessionEvents) -> Result<(), GraphError> {
        let bus = self
            .pipeline
            .bus()
            .ok_or_else(|| GraphError::Bus("Failed to get pipeline bus".to_string()))?;

        let writer_name = self.writer_name.clone();
        bus.set_sync_handler(move |_bus, msg| {
            handle_message(msg, &writer_name, &events);
            gst::BusSyncReply::Drop
        });
        Ok(())
    }
}

/// Translate a bus message into a session event.
///
/// Only the writer's forwarded EOS ends a segment; other sinks going EOS
/// is logged and dropped.
fn handle_message(msg: &gst::Message, writer_name: &str, events: &SessionEvents) {
    let source = || {
        msg.src()
            .map(|s| s.path_string().to_string())
            .unwrap_or_default()
    };

    match msg.view() {
        MessageView::Error(err) => {
            error!(
                "Error from {}: {} ({:?})",
                source(),
                err.error(),
                err.debug()
            );
            events.send(SessionEvent::GraphError {
                source: source(),
                message: err.error().to_string(),
            });
        }
        MessageView::Warning(warning) => {
            warn!("Warning from {}: {}", source(), warning.error());
        }
        MessageView::Element(element) => {
            let Some(structure) = element.structure() else {
                return;
            };
            if !structure.has_name("GstBinForwarded") {
                return;
            }
            let Ok(forwarded) = structure.get::<gst::Message>("message") else {
                return;
            };
            if let MessageView::Eos(_) = forwarded.view() {
                let origin = forwarded
                    .src()
                    .map(|s| s.name().to_string())
                    .unwrap_or_default();
                if origin != writer_name {
                    debug!("Ignoring forwarded EOS from {}", origin);
                    return;
                }
                debug!("EOS from element {}", origin);
                events.send(SessionEvent::ForwardedEos { source: origin });
            }
        }
        MessageView::Eos(_) => {
            info!("Pipeline received EOS");
            events.send(SessionEvent::StreamEnded);
        }
        MessageView::StateChanged(state_changed) => {
            if msg.src().is_some_and(|s| s.is::<gst::Pipeline>()) {
                debug!(
                    "Pipeline state changed from {:?} to {:?}",
                    state_changed.old(),
                    state_changed.current()
                );
            }
        }
        _ => {}
    }
}

impl Drop for GstGraph {
    fn drop(&mut self) {
        if let Some(bus) = self.pipeline.bus() {
            bus.unset_sync_handler();
        }
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!("Error stopping pipeline during drop: {:?}", e);
        }
    }
}
