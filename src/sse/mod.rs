//! Server-Sent Events client.
//!
//! - [`parser`]: incremental `text/event-stream` parsing
//! - [`event`]: event values, listener and dispatcher traits
//! - [`backoff`]: reconnect pacing policies
//! - [`engine`]: the event source lifecycle and reconnect loop

pub mod backoff;
pub mod engine;
pub mod event;
pub mod parser;

pub use backoff::{BackoffPolicy, ExponentialBackoff, FixedBackoff, NeverReconnect};
pub use engine::{EventSource, EventSourceBuilder, ReadyState};
pub use event::{EventDispatcher, EventListener, EventSink, InlineDispatcher, SseEvent};
pub use parser::SseParser;
