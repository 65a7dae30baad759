//! The subscriber bus.
//!
//! Subscribers are pure observers registered before execution begins. A
//! panic escaping a subscriber is caught and logged; it aborts the build only
//! when the subscriber was registered as `critical`. Emission is serialized,
//! so every subscriber sees the same linearized stream.

use crate::event::BuildEvent;
use crate::points::HookPoint;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use thiserror::Error;
use tracing::warn;

/// Error produced when a critical subscriber fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    /// A subscriber registered as critical panicked.
    #[error("critical hook '{name}' failed at {point}")]
    CriticalHookFailed {
        /// Subscriber name.
        name: String,
        /// Point at which it failed.
        point: HookPoint,
    },
}

type Callback = Box<dyn Fn(&BuildEvent) + Send + Sync>;

struct Subscriber {
    name: String,
    critical: bool,
    callback: Callback,
}

/// Typed pub-sub bus for build events.
#[derive(Default)]
pub struct HookBus {
    subscribers: Vec<Subscriber>,
    emit_lock: Mutex<()>,
}

impl fmt::Debug for HookBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl HookBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Panics escaping it are logged and swallowed.
    pub fn subscribe(
        &mut self,
        name: impl Into<String>,
        callback: impl Fn(&BuildEvent) + Send + Sync + 'static,
    ) {
        self.subscribers.push(Subscriber {
            name: name.into(),
            critical: false,
            callback: Box::new(callback),
        });
    }

    /// Register a critical observer. A panic escaping it aborts the build.
    pub fn subscribe_critical(
        &mut self,
        name: impl Into<String>,
        callback: impl Fn(&BuildEvent) + Send + Sync + 'static,
    ) {
        self.subscribers.push(Subscriber {
            name: name.into(),
            critical: true,
            callback: Box::new(callback),
        });
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Is the bus empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Emit one event to every subscriber, in registration order.
    ///
    /// # Errors
    /// Returns [`HookError::CriticalHookFailed`] when a critical subscriber
    /// panics; remaining subscribers still observe the event first.
    pub fn emit(&self, event: &BuildEvent) -> Result<(), HookError> {
        let _serialized = self.emit_lock.lock();
        let mut failure = None;
        for subscriber in &self.subscribers {
            let outcome = catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(event)));
            if outcome.is_err() {
                warn!(
                    hook = %subscriber.name,
                    point = %event.point(),
                    critical = subscriber.critical,
                    "hook panicked"
                );
                if subscriber.critical && failure.is_none() {
                    failure = Some(HookError::CriticalHookFailed {
                        name: subscriber.name.clone(),
                        point: event.point(),
                    });
                }
            }
        }
        failure.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::StepId;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event() -> BuildEvent {
        BuildEvent::PreCompile {
            step: StepId(1),
            package: "hello".to_string(),
            source: PathBuf::from("src/main.c"),
        }
    }

    #[test]
    fn subscribers_observe_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut bus = HookBus::new();
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            bus.subscribe(tag, move |_| order.lock().push(tag));
        }
        bus.emit(&event()).unwrap();
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn non_critical_panic_is_swallowed() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut bus = HookBus::new();
        bus.subscribe("explosive", |_| panic!("boom"));
        let counter = Arc::clone(&seen);
        bus.subscribe("counter", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(&event()).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn critical_panic_fails_emission() {
        let mut bus = HookBus::new();
        bus.subscribe_critical("gatekeeper", |_| panic!("boom"));
        let err = bus.emit(&event()).unwrap_err();
        assert_eq!(
            err,
            HookError::CriticalHookFailed {
                name: "gatekeeper".to_string(),
                point: HookPoint::PreCompile,
            }
        );
    }

    #[test]
    fn later_subscribers_still_run_after_critical_panic() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut bus = HookBus::new();
        bus.subscribe_critical("gatekeeper", |_| panic!("boom"));
        let counter = Arc::clone(&seen);
        bus.subscribe("counter", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(bus.emit(&event()).is_err());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
