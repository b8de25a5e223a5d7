use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use super::{SessionEvent, SessionEvents};

/// When a deferred event is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferred {
    /// Once, after the delay.
    Once(Duration),
    /// Every period until the session ends.
    Every(Duration),
}

/// Schedules stop/start signals for the boundary controller.
///
/// Timers never re-arm themselves; the controller arms the next one when it
/// reaches the matching state.
#[derive(Debug, Clone)]
pub struct SegmentTimer {
    events: SessionEvents,
}

impl SegmentTimer {
    pub fn new(events: SessionEvents) -> Self {
        Self { events }
    }

    pub fn schedule(&self, when: Deferred, event: SessionEvent) -> JoinHandle<()> {
        let events = self.events.clone();
        match when {
            Deferred::Once(delay) => tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if !events.send(event.clone()) {
                    debug!("Session ended before {:?} fired", event);
                }
            }),
            Deferred::Every(period) => tokio::spawn(async move {
                let start = tokio::time::Instant::now() + period;
                let mut ticks = tokio::time::interval_at(start, period);
                loop {
                    ticks.tick().await;
                    if !events.send(event.clone()) {
                        break;
                    }
                }
            }),
        }
    }

    /// Stop signal `duration` after a segment opened.
    pub fn after_record_duration(&self, duration: Duration) -> JoinHandle<()> {
        self.schedule(Deferred::Once(duration), SessionEvent::StopSignal)
    }

    /// Start signal `duration` after a segment finished closing.
    pub fn after_gap_duration(&self, duration: Duration) -> JoinHandle<()> {
        self.schedule(Deferred::Once(duration), SessionEvent::StartSignal)
    }

    /// First start signal of the session.
    pub fn after_priming(&self, duration: Duration) -> JoinHandle<()> {
        self.schedule(Deferred::Once(duration), SessionEvent::StartSignal)
    }

    pub fn after_drain_timeout(&self, duration: Duration) -> JoinHandle<()> {
        self.schedule(Deferred::Once(duration), SessionEvent::DrainTimeout)
    }

    pub fn status_every(&self, period: Duration) -> JoinHandle<()> {
        self.schedule(Deferred::Every(period), SessionEvent::StatusTick)
    }
}
