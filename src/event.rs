//! Event bus (§4.7): lifecycle events delivered synchronously to observers.
//! A slow or panicking observer must never stall the scheduler — dispatch
//! catches panics and downgrades them to a logged warning.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use crate::graph::NodeId;

/// One lifecycle notification. Carries enough detail for an observer to
/// build a trace without querying the engine back (node id, superstep,
/// timing, and the error taxonomy fields from §7's last paragraph).
#[derive(Debug, Clone)]
pub enum Event {
    WorkflowStart,
    WorkflowEnd,
    SuperstepStart { superstep: u64, active: Vec<NodeId> },
    SuperstepEnd { superstep: u64 },
    NodeStart { superstep: u64, node: NodeId },
    NodeEnd { superstep: u64, node: NodeId, duration: Duration },
    NodeError { superstep: u64, node: NodeId, attempt: u32, cause: String, duration: Duration },
    EdgeEvaluationError { superstep: u64, source: NodeId, target: NodeId, cause: String },
}

/// A subscriber to engine lifecycle events. Implementations must be
/// non-blocking; the bus does not enforce this, but a panic is caught so it
/// cannot take the scheduler down with it.
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// An observer that does nothing, used as `EngineConfig`'s default so
/// call sites never need to special-case "no observer configured".
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_event(&self, _event: &Event) {}
}

/// Dispatches one event to `observer`, catching panics per §4.7.
pub fn dispatch(observer: &dyn Observer, event: Event) {
    let result = catch_unwind(AssertUnwindSafe(|| observer.on_event(&event)));
    if let Err(payload) = result {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "observer panicked".to_string());
        crate::logging::log_observer_panic(&msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingObserver(Arc<AtomicUsize>);

    impl Observer for CountingObserver {
        fn on_event(&self, _event: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PanickingObserver;

    impl Observer for PanickingObserver {
        fn on_event(&self, _event: &Event) {
            panic!("observer exploded");
        }
    }

    #[test]
    fn dispatch_delivers_to_observer() {
        let count = Arc::new(AtomicUsize::new(0));
        let observer = CountingObserver(Arc::clone(&count));
        dispatch(&observer, Event::WorkflowStart);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_survives_panicking_observer() {
        dispatch(&PanickingObserver, Event::WorkflowStart);
        // no panic propagated past dispatch: reaching this line is the assertion
    }

    #[test]
    fn noop_observer_does_nothing() {
        dispatch(&NoopObserver, Event::WorkflowEnd);
    }
}
