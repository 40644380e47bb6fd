//! Conditional revalidation: building `If-None-Match`/`If-Modified-Since`
//! requests and folding `304 Not Modified` responses back into stored
//! entries.

use crate::cache::entry::CacheEntry;
use crate::http::headers::HeaderBag;
use crate::http::message::{HttpRequest, HttpResponse};
use http::header::HeaderName;
use std::time::SystemTime;

/// Builds the conditional form of a request against a stored entry.
#[derive(Debug, Clone, Default)]
pub struct ConditionalRequestBuilder;

impl ConditionalRequestBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Clone the request, keeping its headers in order, and append
    /// exactly one conditional: `If-None-Match` when the entry has an
    /// ETag, else `If-Modified-Since` when it has `Last-Modified`.
    pub fn build(&self, request: &HttpRequest, entry: &CacheEntry) -> HttpRequest {
        let mut conditional = request.clone_for_retry();
        if let Some(etag) = entry.etag() {
            if conditional.headers_mut().append("If-None-Match", etag).is_err() {
                tracing::debug!("entry ETag not usable as a header value");
            }
        } else if let Some(last_modified) = entry.last_modified() {
            if conditional.headers_mut().append("If-Modified-Since", last_modified).is_err() {
                tracing::debug!("entry Last-Modified not usable as a header value");
            }
        }
        conditional
    }
}

/// Merges a `304 Not Modified` response into the entry it revalidated.
#[derive(Debug, Clone, Default)]
pub struct CacheEntryUpdater;

impl CacheEntryUpdater {
    pub fn new() -> Self {
        Self
    }

    /// Produce the revalidated entry: the stored entry's headers with
    /// every header present in the `304` replacing all same-named
    /// occurrences (new names appended), fresh exchange timestamps, and
    /// the body, status line, and variant map carried over unchanged.
    pub fn update(
        &self,
        entry: &CacheEntry,
        request_date: SystemTime,
        response_date: SystemTime,
        not_modified: &HttpResponse,
    ) -> CacheEntry {
        let headers = merge_headers(entry.headers(), not_modified.headers());

        let merged = CacheEntry::new(
            request_date,
            response_date,
            entry.version(),
            entry.status(),
            entry.reason().map(str::to_string),
            headers,
            entry.body().try_clone().unwrap_or_else(crate::http::body::EntityBody::empty),
            entry.request_method().clone(),
        );
        if entry.has_variants() {
            merged.with_variant_map(entry.variant_map().clone())
        } else {
            merged
        }
    }
}

/// Header merge: `updates` wins by name (all occurrences replaced as a
/// set, in place of the first old occurrence); names only in `base` are
/// kept; names only in `updates` are appended in their order.
fn merge_headers(base: &HeaderBag, updates: &HeaderBag) -> HeaderBag {
    let updated_names: Vec<&HeaderName> = {
        let mut names: Vec<&HeaderName> = Vec::new();
        for (name, _) in updates.iter() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    };

    let mut merged = HeaderBag::new();
    let mut spliced: Vec<&HeaderName> = Vec::new();
    for (name, value) in base.iter() {
        if updated_names.contains(&name) {
            if !spliced.contains(&name) {
                spliced.push(name);
                for (n, v) in updates.iter().filter(|(n, _)| *n == name) {
                    merged.append_pair(n.clone(), v.clone());
                }
            }
            // Remaining old occurrences of a replaced name are dropped.
        } else {
            merged.append_pair(name.clone(), value.clone());
        }
    }
    for (name, value) in updates.iter() {
        if !spliced.contains(&name) {
            merged.append_pair(name.clone(), value.clone());
        }
    }
    merged
}
