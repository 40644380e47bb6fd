//! Immutable cached response entries and their freshness arithmetic.

use crate::cache::control::CacheControl;
use crate::http::body::EntityBody;
use crate::http::date::{parse_http_date, secs_between};
use crate::http::headers::HeaderBag;
use http::{Method, StatusCode, Version};
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Sentinel for a malformed `Age` header.
pub const MAX_AGE: i64 = 2_147_483_648;

/// Sentinel apparent age when the response carries no `Date` header.
const NO_DATE_APPARENT_AGE: i64 = i32::MAX as i64;

/// One cached response. Immutable after creation: revalidation and
/// variant-map changes produce a new entry.
///
/// An entry is either a *leaf* (it has a body and no variant map) or an
/// *index* (a non-empty variant map and a placeholder body), never both.
#[derive(Debug)]
pub struct CacheEntry {
    request_date: SystemTime,
    response_date: SystemTime,
    version: Version,
    status: StatusCode,
    reason: Option<String>,
    headers: HeaderBag,
    body: EntityBody,
    request_method: Method,
    variant_map: BTreeMap<String, String>,
}

impl CacheEntry {
    /// Build a leaf entry. `request_date`/`response_date` bracket the
    /// origin exchange; the body must be repeatable.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        request_date: SystemTime,
        response_date: SystemTime,
        version: Version,
        status: StatusCode,
        reason: Option<String>,
        headers: HeaderBag,
        body: EntityBody,
        request_method: Method,
    ) -> Self {
        debug_assert!(response_date >= request_date);
        debug_assert!(body.is_repeatable());
        Self {
            request_date,
            response_date,
            version,
            status,
            reason,
            headers,
            body,
            request_method,
            variant_map: BTreeMap::new(),
        }
    }

    /// Derive an index entry: same metadata, placeholder body, the given
    /// variant map.
    pub fn with_variant_map(&self, variant_map: BTreeMap<String, String>) -> Self {
        Self {
            request_date: self.request_date,
            response_date: self.response_date,
            version: self.version,
            status: self.status,
            reason: self.reason.clone(),
            headers: self.headers.clone(),
            body: EntityBody::empty(),
            request_method: self.request_method.clone(),
            variant_map,
        }
    }

    pub fn request_date(&self) -> SystemTime {
        self.request_date
    }

    pub fn response_date(&self) -> SystemTime {
        self.response_date
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn headers(&self) -> &HeaderBag {
        &self.headers
    }

    pub fn body(&self) -> &EntityBody {
        &self.body
    }

    pub fn request_method(&self) -> &Method {
        &self.request_method
    }

    pub fn variant_map(&self) -> &BTreeMap<String, String> {
        &self.variant_map
    }

    pub fn has_variants(&self) -> bool {
        !self.variant_map.is_empty()
    }

    /// Actual stored body length in bytes.
    pub fn body_len(&self) -> u64 {
        self.body.content_length().unwrap_or(0)
    }

    /// `Date` header, `None` when absent or malformed.
    pub fn date_header(&self) -> Option<SystemTime> {
        self.headers.get_str("date").and_then(parse_http_date)
    }

    /// `Content-Length` header: `None` when absent, `-1` when malformed.
    pub fn content_length(&self) -> Option<i64> {
        self.headers.get_str("content-length").map(|v| v.trim().parse::<i64>().unwrap_or(-1))
    }

    /// Whether a present `Content-Length` matches the stored body.
    pub fn content_length_matches_actual(&self) -> bool {
        match self.content_length() {
            Some(declared) => declared == self.body_len() as i64,
            None => true,
        }
    }

    pub fn etag(&self) -> Option<&str> {
        self.headers.get_str("etag")
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.headers.get_str("last-modified")
    }

    /// Whether the entry can be revalidated with a conditional request.
    pub fn is_revalidatable(&self) -> bool {
        self.etag().is_some() || self.last_modified().is_some()
    }

    /// Compare the entry's `Last-Modified` against a request's
    /// `If-Modified-Since`. `None` when either side is absent or
    /// malformed.
    pub fn modified_since(&self, request_headers: &HeaderBag) -> Option<bool> {
        let since = request_headers.get_str("if-modified-since").and_then(parse_http_date)?;
        let last_modified = self.last_modified().and_then(parse_http_date)?;
        Some(last_modified > since)
    }

    /// `Age` header value; absent reads as 0, malformed as [`MAX_AGE`].
    fn age_header(&self) -> i64 {
        match self.headers.get_str("age") {
            None => 0,
            Some(v) => match v.trim().parse::<i64>() {
                Ok(n) if n >= 0 => n,
                _ => MAX_AGE,
            },
        }
    }

    /// `max(0, response_date − Date)`; sentinel when `Date` is missing.
    pub fn apparent_age(&self) -> i64 {
        match self.date_header() {
            Some(date) => secs_between(date, self.response_date).max(0),
            None => NO_DATE_APPARENT_AGE,
        }
    }

    pub fn corrected_received_age(&self) -> i64 {
        self.apparent_age().max(self.age_header())
    }

    pub fn response_delay(&self) -> i64 {
        secs_between(self.request_date, self.response_date).max(0)
    }

    pub fn corrected_initial_age(&self) -> i64 {
        self.corrected_received_age().saturating_add(self.response_delay())
    }

    pub fn resident_time(&self, now: SystemTime) -> i64 {
        secs_between(self.response_date, now).max(0)
    }

    /// Seconds the response has been alive, as seen at `now`.
    pub fn current_age(&self, now: SystemTime) -> i64 {
        self.corrected_initial_age().saturating_add(self.resident_time(now))
    }

    /// Seconds during which the response may be served without
    /// revalidation. `s-maxage` applies to shared caches only; when both
    /// `s-maxage` and `max-age` are present a shared cache takes the more
    /// restrictive of the two. Falls back to `Expires − Date`, then 0.
    pub fn freshness_lifetime(&self, shared: bool) -> i64 {
        let cc = CacheControl::from_headers(&self.headers);
        let max_age = cc.max_age.lenient();
        let s_maxage = if shared { cc.s_maxage.lenient() } else { None };

        match (s_maxage, max_age) {
            (Some(s), Some(m)) => s.min(m),
            (Some(s), None) => s,
            (None, Some(m)) => m,
            (None, None) => self.expires_lifetime(),
        }
    }

    fn expires_lifetime(&self) -> i64 {
        let expires = match self.headers.get_str("expires").and_then(parse_http_date) {
            Some(e) => e,
            None => return 0,
        };
        match self.date_header() {
            Some(date) => secs_between(date, expires).max(0),
            None => 0,
        }
    }

    pub fn is_fresh(&self, now: SystemTime, shared: bool) -> bool {
        self.freshness_lifetime(shared) > self.current_age(now)
    }
}

impl Clone for CacheEntry {
    fn clone(&self) -> Self {
        Self {
            request_date: self.request_date,
            response_date: self.response_date,
            version: self.version,
            status: self.status,
            reason: self.reason.clone(),
            headers: self.headers.clone(),
            // Entries only hold repeatable bodies.
            body: self.body.try_clone().unwrap_or_else(EntityBody::empty),
            request_method: self.request_method.clone(),
            variant_map: self.variant_map.clone(),
        }
    }
}
