//! The event source engine: opens the stream, dispatches events, and
//! reconnects under a backoff policy that honors server hints.
//!
//! Lifecycle: `IDLE → CONNECTING → OPEN → CLOSING → CLOSED`, re-entering
//! `CONNECTING` from `CLOSING` while reconnects remain. Cancellation is
//! idempotent and `on_closed` fires exactly once per engine lifetime.

use crate::base::error::CoreError;
use crate::http::body::ByteStream;
use crate::http::date::{parse_delta_seconds, parse_http_date};
use crate::http::headers::HeaderBag;
use crate::http::message::{HttpRequest, Origin};
use crate::http::transport::{HttpExchange, StreamingResponse};
use crate::sse::backoff::{BackoffPolicy, FixedBackoff};
use crate::sse::event::{
    EventDispatcher, EventListener, EventSink, InlineDispatcher, ListenerTask, SseEvent,
};
use crate::sse::parser::SseParser;
use futures::StreamExt;
use http::{StatusCode, Uri};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ReadyState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Connecting => 1,
            Self::Open => 2,
            Self::Closing => 3,
            Self::Closed => 4,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Connecting,
            2 => Self::Open,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Configures and builds an [`EventSource`].
pub struct EventSourceBuilder {
    origin: Origin,
    uri: Uri,
    exchange: Arc<dyn HttpExchange>,
    listener: Arc<dyn EventListener>,
    headers: HeaderBag,
    last_event_id: Option<String>,
    max_reconnects: i64,
    connect_timeout: Option<Duration>,
    policy: Arc<dyn BackoffPolicy>,
    dispatcher: Arc<dyn EventDispatcher>,
}

impl EventSourceBuilder {
    pub fn new(
        origin: Origin,
        uri: Uri,
        exchange: Arc<dyn HttpExchange>,
        listener: Arc<dyn EventListener>,
    ) -> Self {
        Self {
            origin,
            uri,
            exchange,
            listener,
            headers: HeaderBag::new(),
            last_event_id: None,
            max_reconnects: -1,
            connect_timeout: None,
            policy: Arc::new(FixedBackoff::default()),
            dispatcher: Arc::new(InlineDispatcher),
        }
    }

    /// Add a custom header to every stream request. Invalid pairs are
    /// logged and skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.headers.append(name, value).is_err() {
            tracing::debug!(name, "skipping invalid event source header");
        }
        self
    }

    /// Resume from a known last event id.
    pub fn last_event_id(mut self, id: impl Into<String>) -> Self {
        self.last_event_id = Some(id.into());
        self
    }

    /// Reconnect attempt cap; `-1` for unlimited.
    pub fn max_reconnects(mut self, max: i64) -> Self {
        self.max_reconnects = max;
        self
    }

    /// Bound the time spent opening the stream (headers included).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn backoff(mut self, policy: Arc<dyn BackoffPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn build(self) -> EventSource {
        let (cancel_tx, _) = watch::channel(false);
        EventSource {
            shared: Arc::new(EngineShared {
                origin: self.origin,
                uri: self.uri,
                headers: self.headers,
                exchange: self.exchange,
                listener: self.listener,
                dispatcher: self.dispatcher,
                policy: self.policy,
                max_reconnects: self.max_reconnects,
                connect_timeout: self.connect_timeout,
                state: AtomicU8::new(ReadyState::Idle.as_u8()),
                cancel_tx,
                closed_fired: AtomicBool::new(false),
                last_event_id: Mutex::new(self.last_event_id),
                sticky_retry: Mutex::new(None),
            }),
            task: Mutex::new(None),
        }
    }
}

/// A running (or startable) SSE client.
pub struct EventSource {
    shared: Arc<EngineShared>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl EventSource {
    pub fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    /// The sticky last-event-id, as configured or as last seen on the
    /// stream.
    pub fn last_event_id(&self) -> Option<String> {
        self.shared.last_event_id_lock().clone()
    }

    /// Start the engine task. Idempotent; a cancelled engine will not
    /// restart.
    pub fn start(&self) {
        let mut task = lock(&self.task);
        if task.is_some() || self.shared.cancelled() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        *task = Some(tokio::spawn(run_loop(shared)));
    }

    /// Cancel the engine: stops any in-flight exchange and any scheduled
    /// reconnect. Idempotent; `on_closed` is delivered exactly once.
    pub fn close(&self) {
        self.shared.cancel();
        let started = lock(&self.task).is_some();
        if !started {
            self.shared.set_state(ReadyState::Closed);
            self.shared.fire_closed();
        }
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        self.shared.cancel();
    }
}

struct EngineShared {
    origin: Origin,
    uri: Uri,
    headers: HeaderBag,
    exchange: Arc<dyn HttpExchange>,
    listener: Arc<dyn EventListener>,
    dispatcher: Arc<dyn EventDispatcher>,
    policy: Arc<dyn BackoffPolicy>,
    max_reconnects: i64,
    connect_timeout: Option<Duration>,
    state: AtomicU8,
    cancel_tx: watch::Sender<bool>,
    closed_fired: AtomicBool,
    last_event_id: Mutex<Option<String>>,
    /// Hint from the SSE `retry:` field; sticky until overridden.
    sticky_retry: Mutex<Option<Duration>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EngineShared {
    fn cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    fn set_state(&self, state: ReadyState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    fn last_event_id_lock(&self) -> MutexGuard<'_, Option<String>> {
        lock(&self.last_event_id)
    }

    fn sticky_retry_lock(&self) -> MutexGuard<'_, Option<Duration>> {
        lock(&self.sticky_retry)
    }

    fn build_request(&self) -> HttpRequest {
        let mut request = HttpRequest::get(self.uri.clone());
        let _ = request.headers_mut().append("Accept", "text/event-stream");
        let _ = request.headers_mut().append("Cache-Control", "no-cache");
        for (name, value) in self.headers.iter() {
            request.headers_mut().append_pair(name.clone(), value.clone());
        }
        if let Some(id) = self.last_event_id_lock().clone() {
            if request.headers_mut().set("Last-Event-ID", &id).is_err() {
                tracing::debug!("last event id not usable as a header value");
            }
        }
        request
    }

    /// Run a listener callback through the configured executor, falling
    /// back to direct invocation; panics are contained.
    fn deliver(&self, task: ListenerTask) {
        if let Err(task) = self.dispatcher.dispatch(task) {
            tracing::debug!("listener executor failed; invoking inline");
            task();
        }
    }

    fn notify_open(&self) {
        let listener = self.listener.clone();
        self.deliver(guarded(move || listener.on_open()));
    }

    fn notify_event(&self, event: SseEvent) {
        let listener = self.listener.clone();
        self.deliver(guarded(move || listener.on_event(event)));
    }

    fn notify_failure(&self, error: &CoreError, terminal: bool) {
        let listener = self.listener.clone();
        let error = error.clone();
        self.deliver(guarded(move || listener.on_failure(&error, terminal)));
    }

    fn fire_closed(&self) {
        if !self.closed_fired.swap(true, Ordering::SeqCst) {
            let listener = self.listener.clone();
            self.deliver(guarded(move || listener.on_closed()));
        }
    }
}

fn guarded(f: impl FnOnce() + Send + 'static) -> ListenerTask {
    Box::new(move || {
        if catch_unwind(AssertUnwindSafe(f)).is_err() {
            tracing::warn!("event listener panicked");
        }
    })
}

fn is_event_stream(response: &StreamingResponse) -> bool {
    response.status == StatusCode::OK
        && response
            .content_type()
            .and_then(|ct| ct.split(';').next())
            .map(|media| media.trim().eq_ignore_ascii_case("text/event-stream"))
            .unwrap_or(false)
}

/// One-shot reconnect hint from a `Retry-After` header: integer seconds
/// or an RFC 1123 date (converted to a delay from now).
fn retry_after_hint(headers: &HeaderBag) -> Option<Duration> {
    let value = headers.get_str("retry-after")?.trim();
    if let Some(secs) = parse_delta_seconds(value) {
        return Some(Duration::from_secs(secs as u64));
    }
    let when = parse_http_date(value)?;
    Some(when.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO))
}

enum StreamEnd {
    Eof,
    Cancelled,
    Failed(CoreError),
}

struct EngineSink<'a> {
    shared: &'a EngineShared,
}

impl EventSink for EngineSink<'_> {
    fn on_event(&mut self, event: SseEvent) {
        if let Some(id) = &event.id {
            *self.shared.last_event_id_lock() = Some(id.clone());
        }
        self.shared.notify_event(event);
    }

    fn on_retry(&mut self, retry: Duration) {
        *self.shared.sticky_retry_lock() = Some(retry);
    }
}

async fn stream_events(
    shared: &Arc<EngineShared>,
    cancel: &mut watch::Receiver<bool>,
    mut body: ByteStream,
) -> StreamEnd {
    let mut parser = SseParser::new();
    loop {
        if shared.cancelled() {
            return StreamEnd::Cancelled;
        }
        let chunk = tokio::select! {
            _ = cancel.changed() => return StreamEnd::Cancelled,
            chunk = body.next() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => {
                let mut sink = EngineSink { shared };
                parser.feed(&bytes, &mut sink);
            }
            Some(Err(e)) => {
                sync_last_id(shared, &parser);
                return StreamEnd::Failed(e);
            }
            None => {
                let mut sink = EngineSink { shared };
                parser.end_of_stream(&mut sink);
                sync_last_id(shared, &parser);
                return StreamEnd::Eof;
            }
        }
    }
}

fn sync_last_id(shared: &EngineShared, parser: &SseParser) {
    if let Some(id) = parser.last_event_id() {
        *shared.last_event_id_lock() = Some(id.to_string());
    }
}

async fn open_stream(
    shared: &Arc<EngineShared>,
    request: HttpRequest,
) -> Result<StreamingResponse, CoreError> {
    let exchange = shared.exchange.execute_stream(&shared.origin, request);
    match shared.connect_timeout {
        Some(limit) => match tokio::time::timeout(limit, exchange).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::transport("timed out opening event stream")),
        },
        None => exchange.await,
    }
}

async fn run_loop(shared: Arc<EngineShared>) {
    let mut cancel = shared.subscribe();
    let mut attempt: u32 = 0;
    let mut previous_delay = Duration::ZERO;

    'outer: loop {
        if shared.cancelled() {
            break;
        }
        shared.set_state(ReadyState::Connecting);
        let request = shared.build_request();

        let connect = open_stream(&shared, request);
        let result = tokio::select! {
            _ = cancel.changed() => break 'outer,
            result = connect => result,
        };

        let mut one_shot_hint = None;
        let error = match result {
            Err(e) => {
                if e.is_benign_cancel() || shared.cancelled() {
                    break 'outer;
                }
                e
            }
            Ok(response) if response.status == StatusCode::NO_CONTENT => {
                // The server asked for a terminal close.
                shared.notify_failure(&CoreError::ServerClose, true);
                break 'outer;
            }
            Ok(response) if is_event_stream(&response) => {
                shared.set_state(ReadyState::Open);
                attempt = 0;
                shared.notify_open();
                match stream_events(&shared, &mut cancel, response.body).await {
                    StreamEnd::Cancelled => break 'outer,
                    StreamEnd::Eof => CoreError::transport("event stream ended"),
                    StreamEnd::Failed(e) => {
                        if e.is_benign_cancel() || shared.cancelled() {
                            break 'outer;
                        }
                        e
                    }
                }
            }
            Ok(response) => {
                one_shot_hint = retry_after_hint(&response.headers);
                CoreError::Protocol(format!(
                    "unexpected event stream response: status {}",
                    response.status
                ))
            }
        };

        attempt += 1;
        let hint = one_shot_hint.or_else(|| *shared.sticky_retry_lock());
        let within_limit =
            shared.max_reconnects < 0 || i64::from(attempt) <= shared.max_reconnects;
        let policy = shared.policy.clone();
        let reconnect = within_limit
            && catch_unwind(AssertUnwindSafe(|| {
                policy.should_reconnect(attempt, previous_delay, hint)
            }))
            .unwrap_or_else(|_| {
                tracing::warn!("backoff policy panicked; stopping reconnects");
                false
            });
        if !reconnect {
            shared.notify_failure(&error, true);
            break;
        }
        shared.notify_failure(&error, false);

        let delay = match catch_unwind(AssertUnwindSafe(|| {
            policy.next_delay(attempt, previous_delay, hint)
        })) {
            Ok(delay) => delay,
            Err(_) => {
                tracing::warn!("backoff policy panicked; stopping reconnects");
                break;
            }
        };
        previous_delay = delay;
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");

        shared.set_state(ReadyState::Closing);
        tokio::select! {
            _ = cancel.changed() => break 'outer,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    shared.set_state(ReadyState::Closed);
    shared.fire_closed();
}
