//! Incremental `text/event-stream` parser.
//!
//! Consumes byte chunks as they arrive and emits events through an
//! [`EventSink`]. Handles the optional UTF-8 BOM (possibly split across
//! chunks), LF / CRLF / CR line terminators (a trailing CR is carried
//! across chunk boundaries until the next byte disambiguates CRLF), and
//! the `data` / `event` / `id` / `retry` fields. Unknown fields and
//! `:`-prefixed comment lines are ignored.

use crate::sse::event::{EventSink, SseEvent};
use std::time::Duration;

const BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Default event type when the server sends no `event:` field.
pub const DEFAULT_EVENT_TYPE: &str = "message";

#[derive(Default)]
pub struct SseParser {
    line_buf: Vec<u8>,
    data_accum: String,
    event_type: String,
    last_id: Option<String>,
    bom_consumed: bool,
    bom_matched: usize,
    carry_cr: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// The sticky last-event-id observed so far.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_id.as_deref()
    }

    /// Feed one chunk of bytes.
    pub fn feed(&mut self, chunk: &[u8], sink: &mut dyn EventSink) {
        let mut rest = chunk;

        if !self.bom_consumed {
            while !rest.is_empty() && self.bom_matched < BOM.len() && rest[0] == BOM[self.bom_matched]
            {
                self.bom_matched += 1;
                rest = &rest[1..];
            }
            if self.bom_matched == BOM.len() {
                self.bom_consumed = true;
                self.bom_matched = 0;
            } else if rest.is_empty() {
                // Chunk ended inside a possible BOM; wait for more bytes.
                return;
            } else {
                // Not a BOM after all: the matched prefix is content.
                self.bom_consumed = true;
                let replay = self.bom_matched;
                self.bom_matched = 0;
                for i in 0..replay {
                    self.consume_byte(BOM[i], sink);
                }
            }
        }

        for &b in rest {
            self.consume_byte(b, sink);
        }
    }

    /// Signal the end of the stream: a partial final line is flushed and
    /// a non-empty data accumulator is dispatched.
    pub fn end_of_stream(&mut self, sink: &mut dyn EventSink) {
        self.carry_cr = false;
        if !self.line_buf.is_empty() {
            self.complete_line(sink);
        }
        if !self.data_accum.is_empty() {
            self.dispatch(sink);
        }
    }

    fn consume_byte(&mut self, b: u8, sink: &mut dyn EventSink) {
        if self.carry_cr {
            self.carry_cr = false;
            if b == b'\n' {
                // CRLF: the CR already terminated the line.
                return;
            }
        }
        match b {
            b'\n' => self.complete_line(sink),
            b'\r' => {
                self.complete_line(sink);
                self.carry_cr = true;
            }
            _ => self.line_buf.push(b),
        }
    }

    fn complete_line(&mut self, sink: &mut dyn EventSink) {
        let raw = std::mem::take(&mut self.line_buf);
        let line = String::from_utf8_lossy(&raw);
        self.process_line(&line, sink);
    }

    fn process_line(&mut self, line: &str, sink: &mut dyn EventSink) {
        if line.is_empty() {
            self.dispatch(sink);
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.find(':') {
            Some(idx) => {
                let value = &line[idx + 1..];
                (&line[..idx], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };

        match field {
            "data" => {
                self.data_accum.push_str(value);
                self.data_accum.push('\n');
            }
            "event" => {
                self.event_type = value.to_string();
            }
            "id" => {
                if !value.contains('\0') {
                    self.last_id = Some(value.to_string());
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(ms) = value.parse::<i64>() {
                        sink.on_retry(Duration::from_millis(ms as u64));
                    }
                }
            }
            _ => {
                tracing::debug!(field, "ignoring unknown SSE field");
            }
        }
    }

    fn dispatch(&mut self, sink: &mut dyn EventSink) {
        if self.data_accum.is_empty() {
            self.event_type.clear();
            return;
        }
        let mut data = std::mem::take(&mut self.data_accum);
        if data.ends_with('\n') {
            data.pop();
        }
        let event_type = if self.event_type.is_empty() {
            DEFAULT_EVENT_TYPE.to_string()
        } else {
            std::mem::take(&mut self.event_type)
        };
        self.event_type.clear();
        sink.on_event(SseEvent { id: self.last_id.clone(), event_type, data });
    }
}
