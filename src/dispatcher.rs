//! Name-keyed callback registry.
//!
//! [`EventDispatcher`] maps event names to ordered handler lists. Emission is
//! synchronous and in registration order; a panicking handler is isolated and
//! logged so the remaining handlers still run.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::error;

use crate::event::ChatEvent;

/// A registered event callback.
///
/// Handlers are compared by identity (`Arc::ptr_eq`), so keep a clone of the
/// `Arc` around to [`off`](EventDispatcher::off) it later.
pub type Handler = Arc<dyn Fn(&ChatEvent) + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&ChatEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Pub/sub registry from event names to ordered handler lists.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    bindings: Arc<Mutex<HashMap<String, Vec<Handler>>>>,
}

impl EventDispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    fn bindings(&self) -> MutexGuard<'_, HashMap<String, Vec<Handler>>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `handler` to the list for `event`. Registering the same handler
    /// twice makes it run twice.
    pub fn on(&self, event: impl Into<String>, handler: Handler) {
        self.bindings().entry(event.into()).or_default().push(handler);
    }

    /// Remove the first registration of `handler` for `event`.
    ///
    /// Removing a handler that is not registered is a no-op.
    pub fn off(&self, event: &str, handler: &Handler) {
        let mut bindings = self.bindings();
        if let Some(handlers) = bindings.get_mut(event) {
            if let Some(index) = handlers.iter().position(|h| Arc::ptr_eq(h, handler)) {
                handlers.remove(index);
            }
            if handlers.is_empty() {
                bindings.remove(event);
            }
        }
    }

    /// Invoke every handler registered for the event's name.
    ///
    /// The handler list is snapshotted first, so handlers may register or
    /// remove handlers without deadlocking; such changes apply from the next
    /// emission on.
    pub fn emit(&self, event: &ChatEvent) {
        let name = event.name();
        let handlers: Vec<Handler> = match self.bindings().get(name) {
            Some(handlers) => handlers.clone(),
            None => return,
        };

        for handler in handlers {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(event = name, "event handler panicked: {reason}");
            }
        }
    }

    /// Number of handlers currently registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.bindings().get(event).map_or(0, Vec::len)
    }

    /// Remove every binding.
    pub fn clear(&self) {
        self.bindings().clear();
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bindings = self.bindings();
        let mut names: Vec<&String> = bindings.keys().collect();
        names.sort();
        f.debug_struct("EventDispatcher")
            .field("events", &names)
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn heartbeat_ack() -> ChatEvent {
        ChatEvent::HeartbeatAck { timestamp: 1 }
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> Handler {
        let log = Arc::clone(log);
        handler(move |_| log.lock().unwrap().push(tag))
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.on("heartbeat_ack", recorder(&log, "a"));
        dispatcher.on("heartbeat_ack", recorder(&log, "b"));
        dispatcher.on("heartbeat_ack", recorder(&log, "c"));

        dispatcher.emit(&heartbeat_ack());

        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn duplicate_registration_runs_twice() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let h = handler(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        dispatcher.on("heartbeat_ack", Arc::clone(&h));
        dispatcher.on("heartbeat_ack", Arc::clone(&h));

        dispatcher.emit(&heartbeat_ack());
        assert_eq!(count.load(Ordering::SeqCst), 2);

        // `off` removes only the first registration.
        dispatcher.off("heartbeat_ack", &h);
        dispatcher.emit(&heartbeat_ack());
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(dispatcher.handler_count("heartbeat_ack"), 1);
    }

    #[test]
    fn off_unknown_handler_is_noop() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.on("heartbeat_ack", recorder(&log, "kept"));

        let stranger = handler(|_| {});
        dispatcher.off("heartbeat_ack", &stranger);
        dispatcher.off("never_registered", &stranger);

        dispatcher.emit(&heartbeat_ack());
        assert_eq!(*log.lock().unwrap(), vec!["kept"]);
    }

    #[test]
    fn panicking_handler_does_not_stop_others() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.on("heartbeat_ack", recorder(&log, "before"));
        dispatcher.on("heartbeat_ack", handler(|_| panic!("handler failure")));
        dispatcher.on("heartbeat_ack", recorder(&log, "after"));

        dispatcher.emit(&heartbeat_ack());

        assert_eq!(*log.lock().unwrap(), vec!["before", "after"]);
    }

    #[test]
    fn emit_only_reaches_matching_name() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.on("connected", recorder(&log, "connected"));

        dispatcher.emit(&heartbeat_ack());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn handler_may_register_during_emit() {
        let dispatcher = EventDispatcher::new();
        let inner = dispatcher.clone();
        dispatcher.on(
            "heartbeat_ack",
            handler(move |_| inner.on("heartbeat_ack", handler(|_| {}))),
        );

        dispatcher.emit(&heartbeat_ack());
        assert_eq!(dispatcher.handler_count("heartbeat_ack"), 2);
    }

    #[test]
    fn clear_removes_all_bindings() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.on("heartbeat_ack", recorder(&log, "x"));
        dispatcher.on("connected", recorder(&log, "y"));

        dispatcher.clear();
        dispatcher.emit(&heartbeat_ack());

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(dispatcher.handler_count("connected"), 0);
    }
}
