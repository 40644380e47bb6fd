//! Response cacheability: may this response be stored at all?

use crate::cache::control::CacheControl;
use crate::http::message::{HttpRequest, HttpResponse};
use http::Method;

/// Status codes cacheable without explicit caching directives.
const CACHEABLE_BY_DEFAULT: &[u16] = &[200, 203, 300, 301, 410];

/// Status codes cacheable only when the response carries explicit
/// freshness.
const CACHEABLE_WITH_FRESHNESS: &[u16] = &[302, 307];

/// Decides whether a response may enter the cache.
#[derive(Debug, Clone)]
pub struct ResponseCachePolicy {
    shared: bool,
    max_object_size: u64,
}

impl ResponseCachePolicy {
    pub fn new(shared: bool, max_object_size: u64) -> Self {
        Self { shared, max_object_size }
    }

    pub fn shared(&self) -> bool {
        self.shared
    }

    /// Admission decision for a fetched response. `request` supplies the
    /// originating URI when available (query-string restriction).
    pub fn is_response_cacheable(
        &self,
        method: &Method,
        response: &HttpResponse,
        request: Option<&HttpRequest>,
    ) -> bool {
        if method.as_str() != "GET" {
            tracing::debug!(method = %method, "not cacheable: method");
            return false;
        }

        let headers = response.headers();
        let cc = CacheControl::from_headers(headers);

        if cc.no_store || cc.no_cache {
            tracing::debug!("not cacheable: no-store/no-cache");
            return false;
        }
        if self.shared && cc.private {
            tracing::debug!("not cacheable: private response in shared cache");
            return false;
        }
        if headers.count_of("age") > 1
            || headers.count_of("date") > 1
            || headers.count_of("expires") > 1
        {
            tracing::debug!("not cacheable: duplicated singleton header");
            return false;
        }
        match headers.get_str("date") {
            Some(v) if crate::http::date::parse_http_date(v).is_some() => {}
            _ => {
                tracing::debug!("not cacheable: missing or unparseable Date");
                return false;
            }
        }
        if headers.tokens_of("vary").any(|t| t == "*") {
            tracing::debug!("not cacheable: Vary: *");
            return false;
        }
        if response.body().content_length().map_or(false, |len| len > self.max_object_size) {
            tracing::debug!("not cacheable: body exceeds max object size");
            return false;
        }

        let has_expires = headers.contains("expires");
        let has_explicit_freshness = has_expires || cc.has_explicit_freshness();

        let status = response.status().as_u16();
        let status_ok = if CACHEABLE_BY_DEFAULT.contains(&status) {
            true
        } else if CACHEABLE_WITH_FRESHNESS.contains(&status) {
            has_explicit_freshness
        } else {
            has_expires || cc.has_explicit_caching()
        };
        if !status_ok {
            tracing::debug!(status, "not cacheable: status without explicit caching");
            return false;
        }

        if let Some(req) = request {
            if req.uri().query().is_some() && !has_explicit_freshness {
                tracing::debug!("not cacheable: query string without explicit freshness");
                return false;
            }
        }

        true
    }
}
