use crate::base::error::CoreError;
use std::time::Duration;

/// One Server-Sent Event: everything accumulated between blank lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Sticky event id, if the server has sent one.
    pub id: Option<String>,
    /// Event type; defaults to `message`.
    pub event_type: String,
    /// `data:` lines joined with LF.
    pub data: String,
}

/// Receives parser output. Implemented by the engine; tests implement it
/// directly to observe the parser.
pub trait EventSink {
    fn on_event(&mut self, event: SseEvent);
    /// A `retry:` field with a valid millisecond value.
    fn on_retry(&mut self, retry: Duration);
}

/// Receives engine lifecycle callbacks and events.
///
/// Callbacks arrive in arrival order; `on_open` always precedes
/// `on_event` within a connection attempt, and `on_closed` fires exactly
/// once per engine lifetime. Panics inside a listener are caught and
/// logged; they never propagate into the engine.
pub trait EventListener: Send + Sync {
    fn on_open(&self) {}
    fn on_event(&self, event: SseEvent);
    /// A failure was observed. `terminal` is true when the engine will
    /// not reconnect.
    fn on_failure(&self, error: &CoreError, terminal: bool) {
        let _ = (error, terminal);
    }
    fn on_closed(&self) {}
}

/// A queued listener invocation.
pub type ListenerTask = Box<dyn FnOnce() + Send>;

/// Runs listener callbacks. The default runs them inline on the engine
/// task; returning the task signals dispatch failure and the engine
/// invokes it directly.
pub trait EventDispatcher: Send + Sync {
    fn dispatch(&self, task: ListenerTask) -> Result<(), ListenerTask>;
}

/// Inline dispatcher: callbacks run on the engine's own task.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl EventDispatcher for InlineDispatcher {
    fn dispatch(&self, task: ListenerTask) -> Result<(), ListenerTask> {
        task();
        Ok(())
    }
}
