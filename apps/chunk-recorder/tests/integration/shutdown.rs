use super::common::*;
use chunk_recorder::graph::mock::MockGraph;
use chunk_recorder::recording::{SegmentState, Session};
use chunk_recorder::SessionOutcome;
use std::time::Duration;
use tokio::time::Instant;

/// Shutdown while recording finalizes the open file and swaps nothing.
#[tokio::test(start_paused = true)]
async fn test_shutdown_finalizes_open_segment() {
    super::init_test_environment();
    let graph = MockGraph::new();
    let feeder = Feeder::spawn(graph.clone());

    let session = Session::new(graph.clone(), super::create_test_config(10, 10));
    let handle = session.handle();
    after(Duration::from_secs(4), move || {
        assert!(handle.request_shutdown());
    });

    let origin = Instant::now();
    let report = session.run().await.unwrap();
    feeder.stop();

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.segments.len(), 1);

    let segment = &report.segments[0];
    assert_eq!(segment.state, SegmentState::Closed);
    assert_eq!(since(origin, segment.stop_at), Duration::from_secs(4));
    assert_starts_with_keyframe(&graph, segment);

    assert_eq!(graph.eos_sent(), 1);
    assert_eq!(graph.locations(), vec![rec(0)]);
}

/// Shutdown during the gap ends at once; the pending file was never written.
#[tokio::test(start_paused = true)]
async fn test_shutdown_during_gap() {
    super::init_test_environment();
    let graph = MockGraph::new();
    let feeder = Feeder::spawn(graph.clone());

    let session = Session::new(graph.clone(), super::create_test_config(5, 10));
    let handle = session.handle();
    after(Duration::from_secs(8), move || {
        handle.request_shutdown();
    });

    let origin = Instant::now();
    let report = session.run().await.unwrap();
    feeder.stop();

    assert!(report.is_success());
    assert_eq!(origin.elapsed(), Duration::from_secs(8));
    assert_eq!(report.segments.len(), 2);
    assert_eq!(report.segments[0].state, SegmentState::Closed);
    assert_eq!(report.segments[1].state, SegmentState::Pending);
    assert!(graph.written_to(&rec(1)).is_empty());
    assert_eq!(graph.eos_sent(), 1);
}

/// A last segment that never finishes flushing is abandoned after the drain timeout.
#[tokio::test(start_paused = true)]
async fn test_drain_timeout() {
    super::init_test_environment();
    let graph = MockGraph::new();
    let feeder = Feeder::spawn(graph.clone());

    let mut config = super::create_test_config(60, 10);
    config.drain_timeout = Duration::from_secs(3);
    let session = Session::new(graph.clone(), config);
    let handle = session.handle();
    let stuck = graph.clone();
    after(Duration::from_secs(5), move || {
        stuck.hold_eos(true);
        handle.request_shutdown();
    });

    let origin = Instant::now();
    let report = session.run().await.unwrap();
    feeder.stop();

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(origin.elapsed(), Duration::from_secs(8));
    assert_eq!(report.segments[0].state, SegmentState::Finalizing);
    assert_eq!(graph.eos_sent(), 1);
}

/// The stream running out ends the session cleanly.
#[tokio::test(start_paused = true)]
async fn test_stream_end_completes() {
    super::init_test_environment();
    let graph = MockGraph::new();
    let feeder = Feeder::spawn(graph.clone());

    let session = Session::new(graph.clone(), super::create_test_config(10, 10));
    let ending = graph.clone();
    after(Duration::from_secs(3), move || ending.post_stream_end());

    let report = session.run().await.unwrap();
    feeder.stop();

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.segments.len(), 1);
}

/// A second shutdown request while draining changes nothing.
#[tokio::test(start_paused = true)]
async fn test_repeated_shutdown() {
    super::init_test_environment();
    let graph = MockGraph::new();
    graph.hold_eos(true);
    let feeder = Feeder::spawn(graph.clone());

    let session = Session::new(graph.clone(), super::create_test_config(10, 10));
    let first = session.handle();
    let second = session.handle();
    after(Duration::from_secs(2), move || {
        first.request_shutdown();
    });
    after(Duration::from_secs(3), move || {
        second.request_shutdown();
    });

    let origin = Instant::now();
    let report = session.run().await.unwrap();
    feeder.stop();

    assert!(report.is_success());
    assert_eq!(origin.elapsed(), Duration::from_secs(7));
    assert_eq!(graph.eos_sent(), 1);
}
