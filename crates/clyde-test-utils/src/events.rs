//! Event stream recording.

use clyde_events::{BuildEvent, HookBus, HookPoint};
use parking_lot::Mutex;
use std::sync::Arc;

/// Records every event a bus emits, for assertions on stream contents and
/// ordering.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<BuildEvent>>>,
}

impl EventLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe this log to a bus.
    pub fn attach(&self, bus: &mut HookBus) {
        let sink = Arc::clone(&self.events);
        bus.subscribe("event-log", move |event: &BuildEvent| {
            sink.lock().push(event.clone());
        });
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<BuildEvent> {
        self.events.lock().clone()
    }

    /// The hook points in emission order.
    #[must_use]
    pub fn points(&self) -> Vec<HookPoint> {
        self.events.lock().iter().map(BuildEvent::point).collect()
    }

    /// Events at one point.
    #[must_use]
    pub fn at(&self, point: HookPoint) -> Vec<BuildEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.point() == point)
            .cloned()
            .collect()
    }
}
