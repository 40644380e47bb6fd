//! RFC 1123 date handling for cache headers.
//!
//! All HTTP date headers (`Date`, `Expires`, `Last-Modified`,
//! `If-Modified-Since`, `Retry-After`) use the
//! `"EEE, dd MMM yyyy HH:mm:ss GMT"` form. Malformed values never fail a
//! request: callers receive `None` and substitute the documented sentinel.

use std::time::{Duration, SystemTime};

/// Parse an RFC 1123 date. Malformed input returns `None` and is logged
/// at debug.
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    match httpdate::parse_http_date(value) {
        Ok(t) => Some(t),
        Err(_) => {
            tracing::debug!(value, "unparseable HTTP date");
            None
        }
    }
}

/// Format a timestamp as an RFC 1123 date.
pub fn format_http_date(t: SystemTime) -> String {
    httpdate::fmt_http_date(t)
}

/// Whole seconds from `earlier` to `later`; negative when `later`
/// precedes `earlier`.
pub fn secs_between(earlier: SystemTime, later: SystemTime) -> i64 {
    match later.duration_since(earlier) {
        Ok(d) => clamp_secs(d),
        Err(e) => -clamp_secs(e.duration()),
    }
}

fn clamp_secs(d: Duration) -> i64 {
    d.as_secs().min(i64::MAX as u64) as i64
}

/// Strict non-negative integer parse for delta-seconds directives.
/// Rejects signs, fractions, and empty input.
pub fn parse_delta_seconds(value: &str) -> Option<i64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse::<i64>().ok()
}
