//! Cache invalidation on unsafe methods and client cache directives.

use crate::cache::control::CacheControl;
use crate::cache::keys::primary_key;
use crate::cache::store::CacheStore;
use crate::http::message::{HttpRequest, Origin};
use http::Method;

/// Flushes cache entries that a request makes untrustworthy. Store
/// failures are logged and swallowed so invalidation can never fail the
/// request itself.
#[derive(Debug, Clone, Default)]
pub struct CacheInvalidator;

impl CacheInvalidator {
    pub fn new() -> Self {
        Self
    }

    /// Whether this request must flush the cache before executing:
    /// any non-GET/HEAD method, or a GET/HEAD carrying
    /// `Cache-Control: no-cache` or a `Pragma` header.
    pub fn requires_invalidation(request: &HttpRequest) -> bool {
        let method = request.method();
        if method != Method::GET && method != Method::HEAD {
            return true;
        }
        CacheControl::from_headers(request.headers()).no_cache
            || request.headers().contains("pragma")
    }

    /// Remove the request's primary entry and, when it is a variant
    /// index, every leaf it points to.
    pub async fn flush(&self, store: &dyn CacheStore, origin: &Origin, request: &HttpRequest) {
        let key = primary_key(origin, request);

        match store.get(&key).await {
            Ok(Some(entry)) if entry.has_variants() => {
                for child in entry.variant_map().values() {
                    if let Err(e) = store.remove(child).await {
                        tracing::warn!(key = %child, error = %e, "variant invalidation failed");
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "invalidation lookup failed");
            }
        }

        if let Err(e) = store.remove(&key).await {
            tracing::warn!(key = %key, error = %e, "invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::CacheEntry;
    use crate::cache::store::MemoryCacheStore;
    use crate::http::body::EntityBody;
    use crate::http::headers::HeaderBag;
    use http::{StatusCode, Version};
    use std::collections::BTreeMap;
    use std::time::SystemTime;

    fn entry() -> CacheEntry {
        CacheEntry::new(
            SystemTime::now(),
            SystemTime::now(),
            Version::HTTP_11,
            StatusCode::OK,
            None,
            HeaderBag::new(),
            EntityBody::from("x"),
            Method::GET,
        )
    }

    #[test]
    fn test_requires_invalidation() {
        let post = HttpRequest::new(Method::POST, "/r".parse().unwrap());
        assert!(CacheInvalidator::requires_invalidation(&post));

        let get = HttpRequest::get("/r".parse().unwrap());
        assert!(!CacheInvalidator::requires_invalidation(&get));

        let mut no_cache = HttpRequest::get("/r".parse().unwrap());
        no_cache.headers_mut().append("Cache-Control", "no-cache").unwrap();
        assert!(CacheInvalidator::requires_invalidation(&no_cache));

        let mut pragma = HttpRequest::get("/r".parse().unwrap());
        pragma.headers_mut().append("Pragma", "no-cache").unwrap();
        assert!(CacheInvalidator::requires_invalidation(&pragma));
    }

    #[tokio::test]
    async fn test_flush_removes_primary_entry() {
        let store = MemoryCacheStore::new(10);
        let origin = Origin::new("http", "h", 80);
        let request = HttpRequest::new(Method::POST, "/r".parse().unwrap());

        store.put("http://h/r", entry()).await.unwrap();
        CacheInvalidator::new().flush(&store, &origin, &request).await;
        assert!(store.get("http://h/r").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_flush_removes_variant_leaves() {
        let store = MemoryCacheStore::new(10);
        let origin = Origin::new("http", "h", 80);
        let request = HttpRequest::new(Method::POST, "/r".parse().unwrap());

        let mut map = BTreeMap::new();
        map.insert("{v=1}".to_string(), "{v=1}http://h/r".to_string());
        let index = entry().with_variant_map(map);

        store.put("http://h/r", index).await.unwrap();
        store.put("{v=1}http://h/r", entry()).await.unwrap();

        CacheInvalidator::new().flush(&store, &origin, &request).await;
        assert!(store.get("http://h/r").await.unwrap().is_none());
        assert!(store.get("{v=1}http://h/r").await.unwrap().is_none());
    }
}
