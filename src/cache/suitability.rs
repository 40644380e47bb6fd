//! Suitability: may this stored entry answer this request right now,
//! without revalidation?

use crate::cache::control::CacheControl;
use crate::cache::entry::CacheEntry;
use crate::http::message::HttpRequest;
use std::time::SystemTime;

/// Decides whether a cached entry may be served for a request.
#[derive(Debug, Clone)]
pub struct SuitabilityChecker {
    shared: bool,
}

impl SuitabilityChecker {
    pub fn new(shared: bool) -> Self {
        Self { shared }
    }

    pub fn can_use(&self, entry: &CacheEntry, request: &HttpRequest, now: SystemTime) -> bool {
        if !entry.is_fresh(now, self.shared) {
            tracing::debug!("unsuitable: entry is stale");
            return false;
        }
        if !entry.content_length_matches_actual() {
            tracing::debug!("unsuitable: Content-Length does not match stored body");
            return false;
        }

        let headers = request.headers();
        let cc = CacheControl::from_headers(headers);

        if cc.no_cache {
            tracing::debug!("unsuitable: request Cache-Control: no-cache");
            return false;
        }
        if headers.tokens_of("pragma").any(|t| t.eq_ignore_ascii_case("no-cache")) {
            tracing::debug!("unsuitable: request Pragma: no-cache");
            return false;
        }

        // Request numeric directives fail closed on malformed values.
        match cc.max_age.strict() {
            Ok(Some(n)) => {
                if entry.current_age(now) > n {
                    tracing::debug!("unsuitable: request max-age exceeded");
                    return false;
                }
            }
            Ok(None) => {}
            Err(()) => {
                tracing::debug!("unsuitable: malformed request max-age");
                return false;
            }
        }
        match cc.min_fresh.strict() {
            Ok(Some(n)) => {
                let remaining =
                    entry.freshness_lifetime(self.shared).saturating_sub(entry.current_age(now));
                if remaining < n {
                    tracing::debug!("unsuitable: request min-fresh not satisfiable");
                    return false;
                }
            }
            Ok(None) => {}
            Err(()) => {
                tracing::debug!("unsuitable: malformed request min-fresh");
                return false;
            }
        }

        // max-stale is recognized but never honored: stale entries are
        // filtered by the freshness check above.
        if cc.max_stale {
            tracing::debug!("request max-stale acknowledged; stale serving is disabled");
        }

        // A conditional request is answerable from cache only when the
        // entry provably has not changed since the requested date.
        if headers.contains("if-modified-since") {
            match entry.modified_since(headers) {
                Some(false) => {}
                _ => {
                    tracing::debug!("unsuitable: cannot satisfy If-Modified-Since from cache");
                    return false;
                }
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::body::EntityBody;
    use crate::http::date::format_http_date;
    use crate::http::headers::HeaderBag;
    use http::{Method, StatusCode, Version};
    use std::time::Duration;

    fn fresh_entry(t: SystemTime, extra: &[(&str, &str)]) -> CacheEntry {
        let mut headers = HeaderBag::new();
        headers.append("Date", &format_http_date(t)).unwrap();
        headers.append("Cache-Control", "max-age=100").unwrap();
        for (n, v) in extra {
            headers.append(n, v).unwrap();
        }
        CacheEntry::new(
            t,
            t,
            Version::HTTP_11,
            StatusCode::OK,
            None,
            headers,
            EntityBody::from("body"),
            Method::GET,
        )
    }

    fn request(pairs: &[(&str, &str)]) -> HttpRequest {
        let mut req = HttpRequest::get("/r".parse().unwrap());
        for (n, v) in pairs {
            req.headers_mut().append(n, v).unwrap();
        }
        req
    }

    #[test]
    fn test_fresh_entry_suitable() {
        let t = SystemTime::now();
        let checker = SuitabilityChecker::new(true);
        assert!(checker.can_use(&fresh_entry(t, &[]), &request(&[]), t));
    }

    #[test]
    fn test_stale_entry_unsuitable() {
        let t = SystemTime::now();
        let checker = SuitabilityChecker::new(true);
        let later = t + Duration::from_secs(500);
        assert!(!checker.can_use(&fresh_entry(t, &[]), &request(&[]), later));
    }

    #[test]
    fn test_request_no_cache_and_pragma() {
        let t = SystemTime::now();
        let checker = SuitabilityChecker::new(true);
        let entry = fresh_entry(t, &[]);
        assert!(!checker.can_use(&entry, &request(&[("Cache-Control", "no-cache")]), t));
        assert!(!checker.can_use(&entry, &request(&[("Pragma", "no-cache")]), t));
    }

    #[test]
    fn test_request_max_age() {
        let t = SystemTime::now();
        let checker = SuitabilityChecker::new(true);
        let entry = fresh_entry(t, &[]);
        let now = t + Duration::from_secs(30);
        assert!(checker.can_use(&entry, &request(&[("Cache-Control", "max-age=60")]), now));
        assert!(!checker.can_use(&entry, &request(&[("Cache-Control", "max-age=10")]), now));
    }

    #[test]
    fn test_request_min_fresh() {
        let t = SystemTime::now();
        let checker = SuitabilityChecker::new(true);
        let entry = fresh_entry(t, &[]);
        let now = t + Duration::from_secs(30);
        // 70 seconds of freshness remain.
        assert!(checker.can_use(&entry, &request(&[("Cache-Control", "min-fresh=60")]), now));
        assert!(!checker.can_use(&entry, &request(&[("Cache-Control", "min-fresh=80")]), now));
    }

    #[test]
    fn test_malformed_request_directives_fail_closed() {
        let t = SystemTime::now();
        let checker = SuitabilityChecker::new(true);
        let entry = fresh_entry(t, &[]);
        assert!(!checker.can_use(&entry, &request(&[("Cache-Control", "max-age=later")]), t));
        assert!(!checker.can_use(&entry, &request(&[("Cache-Control", "min-fresh=soon")]), t));
    }

    #[test]
    fn test_content_length_mismatch_unsuitable() {
        let t = SystemTime::now();
        let checker = SuitabilityChecker::new(true);
        let entry = fresh_entry(t, &[("Content-Length", "999")]);
        assert!(!checker.can_use(&entry, &request(&[]), t));
    }

    #[test]
    fn test_if_modified_since_served_when_unmodified() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let checker = SuitabilityChecker::new(true);
        let entry = fresh_entry(t, &[("Last-Modified", &format_http_date(t))]);

        let unmodified = request(&[(
            "If-Modified-Since",
            &format_http_date(t + Duration::from_secs(60)),
        )]);
        assert!(checker.can_use(&entry, &unmodified, t));

        let modified =
            request(&[("If-Modified-Since", &format_http_date(t - Duration::from_secs(60)))]);
        assert!(!checker.can_use(&entry, &modified, t));
    }

    #[test]
    fn test_max_stale_does_not_enable_stale_serving() {
        let t = SystemTime::now();
        let checker = SuitabilityChecker::new(true);
        let later = t + Duration::from_secs(500);
        let req = request(&[("Cache-Control", "max-stale=1000")]);
        assert!(!checker.can_use(&fresh_entry(t, &[]), &req, later));
    }
}
