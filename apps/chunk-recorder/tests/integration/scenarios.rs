use super::common::*;
use chunk_recorder::graph::mock::MockGraph;
use chunk_recorder::recording::{SegmentState, Session};
use chunk_recorder::SessionOutcome;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Record 10s, skip 10s, stop during the second segment.
#[tokio::test(start_paused = true)]
async fn test_ten_on_ten_off() {
    super::init_test_environment();
    let graph = MockGraph::new();
    let feeder = Feeder::spawn(graph.clone());

    let session = Session::new(graph.clone(), super::create_test_config(10, 10));
    let handle = session.handle();
    after(Duration::from_secs(25), move || {
        handle.request_shutdown();
    });

    let origin = Instant::now();
    let report = session.run().await.unwrap();
    feeder.stop();

    info!("Session ended after {:?}", origin.elapsed());
    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(report.segments.len(), 2);

    let first = &report.segments[0];
    assert_eq!(first.location, rec(0));
    assert_eq!(first.state, SegmentState::Closed);
    assert_eq!(since(origin, first.opened_at), Duration::ZERO);
    assert_eq!(since(origin, first.stop_at), Duration::from_secs(10));
    assert_near(since(origin, first.closed_at), Duration::from_secs(10));

    let second = &report.segments[1];
    assert_eq!(second.location, rec(1));
    assert_eq!(second.state, SegmentState::Closed);
    assert_near(since(origin, second.opened_at), Duration::from_secs(20));
    assert_near(since(origin, second.stop_at), Duration::from_secs(25));

    assert_eq!(graph.locations(), vec![rec(0), rec(1)]);
}

/// Stop fires exactly `d` after opening, start exactly `g` after the swap.
#[tokio::test(start_paused = true)]
async fn test_exact_timer_fidelity() {
    super::init_test_environment();
    let graph = MockGraph::new();
    let feeder = Feeder::spawn(graph.clone());

    let session = Session::new(graph.clone(), super::create_test_config(3, 7));
    let handle = session.handle();
    // Lands in the gap after the fourth segment.
    after(Duration::from_secs(35), move || {
        handle.request_shutdown();
    });

    let report = session.run().await.unwrap();
    feeder.stop();
    assert!(report.is_success());

    let segments = &report.segments;
    assert!(segments.len() >= 4, "got {} segments", segments.len());

    for segment in segments.iter().filter(|s| s.state == SegmentState::Closed) {
        assert_eq!(segment.recorded_for(), Some(Duration::from_secs(3)));
    }
    for pair in segments.windows(2) {
        let (Some(closed), Some(opened)) = (pair[0].closed_at, pair[1].opened_at) else {
            continue;
        };
        assert_eq!(opened.duration_since(closed), Duration::from_secs(7));
    }
}

/// Each segment starts on a keyframe and no frame reaches two segments.
#[tokio::test(start_paused = true)]
async fn test_segments_partition_the_stream() {
    super::init_test_environment();
    let graph = MockGraph::new();
    let feeder = Feeder::spawn(graph.clone());

    let session = Session::new(graph.clone(), super::create_test_config(4, 2));
    let handle = session.handle();
    after(Duration::from_secs(27), move || {
        handle.request_shutdown();
    });

    let report = session.run().await.unwrap();
    feeder.stop();
    assert!(report.is_success());

    let closed: Vec<_> = report
        .segments
        .iter()
        .filter(|s| s.state == SegmentState::Closed)
        .collect();
    assert!(closed.len() >= 4);

    for segment in &closed {
        assert_starts_with_keyframe(&graph, segment);
        assert!(segment.dropped_before_keyframe >= 1);
    }

    // Written order is stream order, and every segment's frames are
    // contiguous in it.
    let written = graph.written();
    for pair in written.windows(2) {
        assert!(pair[0].1.pts < pair[1].1.pts, "frame written twice or out of order");
    }
    let mut order: Vec<_> = written.iter().map(|(path, _)| path.clone()).collect();
    order.dedup();
    let expected: Vec<_> = closed.iter().map(|s| s.location.clone()).collect();
    assert_eq!(order, expected);

    // A segment never contains frames captured before it opened.
    for segment in &closed {
        let first_pts = segment.first_pts.unwrap();
        let written = graph.written_to(&segment.location);
        assert!(written.iter().all(|meta| meta.pts.unwrap() >= first_pts));
    }
}

/// With the writer as the only sink, every branch EOS also ends the
/// pipeline as a whole; recording carries on regardless.
#[tokio::test(start_paused = true)]
async fn test_writer_only_pipeline_keeps_recording() {
    super::init_test_environment();
    let graph = MockGraph::new();
    graph.sole_sink(true);
    let feeder = Feeder::spawn(graph.clone());

    let session = Session::new(graph.clone(), super::create_test_config(2, 2));
    let handle = session.handle();
    after(Duration::from_secs(13), move || {
        handle.request_shutdown();
    });

    let origin = Instant::now();
    let report = session.run().await.unwrap();
    feeder.stop();

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_near(origin.elapsed(), Duration::from_secs(13));
    assert_eq!(
        graph.locations(),
        vec![rec(0), rec(1), rec(2), rec(3)]
    );
    assert!(report.segments[..3]
        .iter()
        .all(|s| s.state == SegmentState::Closed));
}

/// `{prefix}-{NNN}.mp4`, numbered from 000 in opening order.
#[tokio::test(start_paused = true)]
async fn test_locations_are_sequential() {
    super::init_test_environment();
    let graph = MockGraph::new();
    let feeder = Feeder::spawn(graph.clone());

    let session = Session::new(graph.clone(), super::create_test_config(1, 1));
    let handle = session.handle();
    after(Duration::from_secs(30), move || {
        handle.request_shutdown();
    });

    let report = session.run().await.unwrap();
    feeder.stop();

    let locations = graph.locations();
    assert!(locations.len() >= 10);
    for (index, location) in locations.iter().enumerate() {
        assert_eq!(*location, rec(index as u32));
    }
    let indices: Vec<_> = report.segments.iter().map(|s| s.index).collect();
    assert_eq!(indices, (0..locations.len() as u32).collect::<Vec<_>>());
}

/// The gate never has more than one probe on the link.
#[tokio::test(start_paused = true)]
async fn test_single_gate_probe() {
    super::init_test_environment();
    let graph = MockGraph::new();
    let feeder = Feeder::spawn(graph.clone());

    let session = Session::new(graph.clone(), super::create_test_config(2, 1));
    let handle = session.handle();
    after(Duration::from_secs(20), move || {
        handle.request_shutdown();
    });

    let report = session.run().await.unwrap();
    feeder.stop();

    assert!(report.is_success());
    assert_eq!(feeder.max_probes(), 1);
    assert!(graph.probe_count() <= 1);
    assert_eq!(graph.double_removals(), 0);
}

/// The first segment waits for the priming delay.
#[tokio::test(start_paused = true)]
async fn test_priming_delay() {
    super::init_test_environment();
    let graph = MockGraph::new();
    let feeder = Feeder::spawn(graph.clone());

    let mut config = super::create_test_config(5, 10);
    config.priming_delay = Duration::from_secs(10);
    let session = Session::new(graph.clone(), config);
    let handle = session.handle();
    after(Duration::from_secs(12), move || {
        handle.request_shutdown();
    });

    let origin = Instant::now();
    let report = session.run().await.unwrap();
    feeder.stop();

    let first = &report.segments[0];
    assert_eq!(since(origin, first.opened_at), Duration::from_secs(10));
    assert_starts_with_keyframe(&graph, first);
    assert!(first.first_pts.unwrap() >= gst::ClockTime::from_seconds(10));
}
