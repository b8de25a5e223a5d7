use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{BoundaryController, SegmentRecord, SessionEvent, SessionEvents};
use crate::config::RecordingConfig;
use crate::graph::{MediaGraph, Node, NodeState};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub location_prefix: String,
    pub extension: String,
    pub record_duration: Duration,
    pub gap_duration: Duration,
    pub priming_delay: Duration,
    pub drain_timeout: Duration,
    pub status_interval: Option<Duration>,
}

impl SessionConfig {
    pub fn new(prefix: &str, record_duration: Duration, gap_duration: Duration) -> Self {
        Self {
            location_prefix: prefix.to_string(),
            extension: "mp4".to_string(),
            record_duration,
            gap_duration,
            priming_delay: Duration::ZERO,
            drain_timeout: Duration::from_secs(5),
            status_interval: None,
        }
    }
}

impl From<&RecordingConfig> for SessionConfig {
    fn from(config: &RecordingConfig) -> Self {
        Self {
            location_prefix: config.location_prefix.clone(),
            extension: config.extension.clone(),
            record_duration: Duration::from_secs(config.record_duration_seconds),
            gap_duration: Duration::from_secs(config.gap_duration_seconds),
            priming_delay: Duration::from_secs(config.priming_seconds),
            drain_timeout: Duration::from_secs(config.drain_timeout_seconds),
            status_interval: match config.status_interval_seconds {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Stopped on request or because the stream ended.
    Completed,
    /// The graph failed; the reason is the first error seen.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub segments: Vec<SegmentRecord>,
}

impl SessionReport {
    pub fn is_success(&self) -> bool {
        self.outcome == SessionOutcome::Completed
    }
}

/// Lets the caller stop a running session cleanly.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    events: SessionEvents,
}

impl SessionHandle {
    /// Returns false if the session already ended.
    pub fn request_shutdown(&self) -> bool {
        self.events.send(SessionEvent::ShutdownRequested)
    }
}

/// One recording session over a media graph.
pub struct Session<G: MediaGraph> {
    graph: Arc<G>,
    config: SessionConfig,
    events: SessionEvents,
    receiver: mpsc::UnboundedReceiver<SessionEvent>,
}

impl<G: MediaGraph> Session<G> {
    pub fn new(graph: Arc<G>, config: SessionConfig) -> Self {
        let (events, receiver) = SessionEvents::channel();
        Self {
            graph,
            config,
            events,
            receiver,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            events: self.events.clone(),
        }
    }

    /// Run until the graph fails or a shutdown completes.
    ///
    /// Startup failures are returned as errors. Everything after the first
    /// event ends up in the report's outcome, and the pipeline is always
    /// stopped before returning.
    pub async fn run(mut self) -> crate::Result<SessionReport> {
        info!(
            "Starting recording session: prefix {}, record {:?}, gap {:?}",
            self.config.location_prefix, self.config.record_duration, self.config.gap_duration
        );

        let mut controller =
            BoundaryController::new(self.graph.clone(), self.config.clone(), self.events.clone());

        let primed = self
            .graph
            .subscribe(self.events.clone())
            .map_err(crate::ChunkRecorderError::from)
            .and_then(|_| controller.prime());
        if let Err(err) = primed {
            self.events.close();
            self.unwind();
            return Err(err);
        }

        let outcome = loop {
            let Some(event) = self.receiver.recv().await else {
                break SessionOutcome::Failed("event queue closed".to_string());
            };
            if let ControlFlow::Break(outcome) = controller.handle(event) {
                break outcome;
            }
        };

        self.events.close();
        self.unwind();

        match &outcome {
            SessionOutcome::Completed => info!("Recording session completed"),
            SessionOutcome::Failed(reason) => warn!("Recording session failed: {}", reason),
        }

        Ok(SessionReport {
            outcome,
            segments: controller.into_segments(),
        })
    }

    fn unwind(&self) {
        if let Err(err) = self.graph.set_state(Node::Pipeline, NodeState::Stopped) {
            warn!("Failed to stop pipeline: {}", err);
        }
    }
}
