use super::common::*;
use chunk_recorder::graph::mock::MockGraph;
use chunk_recorder::graph::{GraphError, Node, NodeState};
use chunk_recorder::recording::{self, SegmentState, Session};
use chunk_recorder::{ChunkRecorderError, SessionOutcome};
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// A failed writer stop while swapping segment 2 ends the session, and
/// segment 3 is never named.
#[tokio::test(start_paused = true)]
async fn test_swap_failure_terminates() {
    super::init_test_environment();
    let graph = MockGraph::new();
    graph.fail_transition(Node::Writer, NodeState::Stopped, 3);
    let feeder = Feeder::spawn(graph.clone());

    let origin = Instant::now();
    let report = recording::start(
        graph.clone(),
        "/tmp/rec",
        Duration::from_secs(10),
        Duration::from_secs(10),
    )
    .await
    .unwrap();
    feeder.stop();

    info!("Session failed after {:?}", origin.elapsed());
    assert!(matches!(
        report.outcome,
        SessionOutcome::Failed(ref reason) if reason.contains("writer")
    ));
    assert_near(origin.elapsed(), Duration::from_secs(50));

    assert_eq!(graph.locations(), vec![rec(0), rec(1), rec(2)]);
    assert!(report.segments.iter().all(|s| s.location != rec(3)));
    assert_eq!(report.segments[0].state, SegmentState::Closed);
    assert_eq!(report.segments[1].state, SegmentState::Closed);
    assert_eq!(report.segments[2].state, SegmentState::Finalizing);

    assert_eq!(
        graph.transitions().last(),
        Some(&(Node::Pipeline, NodeState::Stopped))
    );
}

/// End-of-stream refused while finalizing segment 1 ends the session
/// without swapping.
#[tokio::test(start_paused = true)]
async fn test_refused_eos_terminates() {
    super::init_test_environment();
    let graph = MockGraph::new();
    graph.fail_eos(2);
    let feeder = Feeder::spawn(graph.clone());

    let origin = Instant::now();
    let session = Session::new(graph.clone(), super::create_test_config(10, 10));
    let report = session.run().await.unwrap();
    feeder.stop();

    assert!(matches!(
        report.outcome,
        SessionOutcome::Failed(ref reason) if reason.starts_with("recording-branch")
    ));
    assert_near(origin.elapsed(), Duration::from_secs(30));

    assert_eq!(graph.eos_sent(), 2);
    assert_eq!(graph.locations(), vec![rec(0), rec(1)]);
    assert_eq!(report.segments.len(), 2);
    assert_eq!(report.segments[0].state, SegmentState::Closed);
    assert_eq!(report.segments[1].state, SegmentState::Finalizing);
    // One swap for segment 0, none for segment 1, then the unwind.
    assert_eq!(
        graph.transitions(),
        vec![
            (Node::Pipeline, NodeState::Running),
            (Node::Writer, NodeState::Stopped),
            (Node::Muxer, NodeState::Stopped),
            (Node::Writer, NodeState::Running),
            (Node::Muxer, NodeState::Running),
            (Node::Pipeline, NodeState::Stopped),
        ]
    );
}

/// An error on the bus ends the session without finalizing the open segment.
#[tokio::test(start_paused = true)]
async fn test_bus_error_terminates() {
    super::init_test_environment();
    let graph = MockGraph::new();
    let feeder = Feeder::spawn(graph.clone());

    let session = Session::new(graph.clone(), super::create_test_config(10, 10));
    let failing = graph.clone();
    after(Duration::from_secs(7), move || {
        failing.post_error("mp4mux", "Internal data stream error");
    });

    let report = session.run().await.unwrap();
    feeder.stop();

    assert_eq!(
        report.outcome,
        SessionOutcome::Failed("mp4mux: Internal data stream error".to_string())
    );
    assert_eq!(report.segments.len(), 1);
    assert_eq!(report.segments[0].state, SegmentState::Open);
    assert_eq!(graph.eos_sent(), 0);
}

/// Errors after the session ended are not delivered anywhere.
#[tokio::test(start_paused = true)]
async fn test_late_events_are_inert() {
    super::init_test_environment();
    let graph = MockGraph::new();
    let feeder = Feeder::spawn(graph.clone());

    let session = Session::new(graph.clone(), super::create_test_config(2, 2));
    let failing = graph.clone();
    after(Duration::from_secs(3), move || {
        failing.post_error("filesink", "Could not write");
    });

    let report = session.run().await.unwrap();
    assert!(!report.is_success());

    // Timers and probes armed before the failure now fire into a dead session.
    let locations = graph.locations();
    tokio::time::sleep(Duration::from_secs(30)).await;
    feeder.stop();
    graph.post_error("filesink", "Could not write");

    assert_eq!(graph.locations(), locations);
}

/// The pipeline refusing to start is a startup error, not an outcome.
#[tokio::test(start_paused = true)]
async fn test_startup_failure() {
    super::init_test_environment();
    let graph = MockGraph::new();
    graph.fail_transition(Node::Pipeline, NodeState::Running, 1);

    let session = Session::new(graph.clone(), super::create_test_config(10, 10));
    let err = session.run().await.unwrap_err();

    assert!(matches!(
        err,
        ChunkRecorderError::Graph(GraphError::StateChange {
            node: Node::Pipeline,
            ..
        })
    ));
    assert_eq!(
        graph.transitions(),
        vec![
            (Node::Pipeline, NodeState::Running),
            (Node::Pipeline, NodeState::Stopped)
        ]
    );
}
