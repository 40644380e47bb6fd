//! Caching Execution Chain Tests
//!
//! Covers:
//! - Cache hits served with Age/Via decoration
//! - Invalidation on unsafe methods
//! - Conditional revalidation and 304 merging
//! - only-if-cached synthetic 504
//! - Vary variant storage and lookup

use async_trait::async_trait;
use coronet::base::CoreError;
use coronet::cache::{CacheConfig, CacheStore, CachingExecutor, MemoryCacheStore};
use coronet::http::date::format_http_date;
use coronet::http::{
    EntityBody, HttpExchange, HttpRequest, HttpResponse, Origin, StreamingResponse,
};
use http::{Method, StatusCode};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Scripted collaborator: pops one canned response per exchange and
/// records the requests it saw.
struct MockExchange {
    responses: Mutex<VecDeque<HttpResponse>>,
    seen: Mutex<Vec<(Method, Vec<(String, String)>)>>,
}

impl MockExchange {
    fn new(responses: Vec<HttpResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn request_headers(&self, call: usize) -> Vec<(String, String)> {
        self.seen.lock().unwrap()[call].1.clone()
    }

    fn header_of(&self, call: usize, name: &str) -> Option<String> {
        self.request_headers(call)
            .into_iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}

#[async_trait]
impl HttpExchange for MockExchange {
    async fn execute(
        &self,
        _origin: &Origin,
        request: HttpRequest,
    ) -> Result<HttpResponse, CoreError> {
        let headers = request
            .headers()
            .iter()
            .map(|(n, v)| (n.as_str().to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        self.seen.lock().unwrap().push((request.method().clone(), headers));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CoreError::transport("no scripted response left"))
    }

    async fn execute_stream(
        &self,
        _origin: &Origin,
        _request: HttpRequest,
    ) -> Result<StreamingResponse, CoreError> {
        Err(CoreError::transport("streaming not scripted"))
    }
}

fn response(status: u16, pairs: &[(&str, &str)], body: &'static str) -> HttpResponse {
    let mut resp = HttpResponse::new(StatusCode::from_u16(status).unwrap());
    resp.headers_mut().append("Date", &format_http_date(SystemTime::now())).unwrap();
    for (n, v) in pairs {
        resp.headers_mut().append(n, v).unwrap();
    }
    resp.set_body(EntityBody::from(body));
    resp
}

fn executor(exchange: Arc<MockExchange>) -> (CachingExecutor, Arc<MemoryCacheStore>) {
    let store = Arc::new(MemoryCacheStore::new(100));
    (CachingExecutor::new(store.clone(), exchange, CacheConfig::default()), store)
}

fn origin() -> Origin {
    Origin::new("http", "h", 80)
}

#[tokio::test]
async fn test_hit_is_served_from_cache_with_age() {
    let exchange = MockExchange::new(vec![response(
        200,
        &[("Cache-Control", "max-age=60"), ("X-Origin", "yes")],
        "payload",
    )]);
    let (chain, _) = executor(exchange.clone());

    let first = chain.execute(&origin(), HttpRequest::get("/r".parse().unwrap())).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(exchange.calls(), 1);

    let second = chain.execute(&origin(), HttpRequest::get("/r".parse().unwrap())).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    // No second exchange: the entry was suitable.
    assert_eq!(exchange.calls(), 1);
    assert!(second.headers().get_str("age").is_some());
    assert!(second.headers().get_str("via").unwrap().contains("coronet"));
    assert_eq!(second.headers().get_str("x-origin"), Some("yes"));
    assert_eq!(&second.into_bytes().await.unwrap()[..], b"payload");
}

#[tokio::test]
async fn test_post_invalidates_cached_entry() {
    let exchange = MockExchange::new(vec![
        response(200, &[("Cache-Control", "max-age=60")], "cached"),
        response(200, &[], "post result"),
        response(200, &[("Cache-Control", "max-age=60")], "fresh"),
    ]);
    let (chain, _) = executor(exchange.clone());

    chain.execute(&origin(), HttpRequest::get("/r".parse().unwrap())).await.unwrap();
    assert_eq!(exchange.calls(), 1);

    chain
        .execute(&origin(), HttpRequest::new(Method::POST, "/r".parse().unwrap()))
        .await
        .unwrap();
    assert_eq!(exchange.calls(), 2);

    // The GET after the POST must go back to the origin.
    let after = chain.execute(&origin(), HttpRequest::get("/r".parse().unwrap())).await.unwrap();
    assert_eq!(exchange.calls(), 3);
    assert_eq!(&after.into_bytes().await.unwrap()[..], b"fresh");
}

#[tokio::test]
async fn test_etag_revalidation_merges_304() {
    let exchange = MockExchange::new(vec![
        response(
            200,
            &[("Cache-Control", "max-age=0"), ("ETag", "\"W/x\"")],
            "v1",
        ),
        {
            let mut not_modified = HttpResponse::new(StatusCode::NOT_MODIFIED);
            not_modified.headers_mut().append("Cache-Control", "public, max-age=60").unwrap();
            not_modified
        },
    ]);
    let (chain, _) = executor(exchange.clone());

    chain.execute(&origin(), HttpRequest::get("/r".parse().unwrap())).await.unwrap();

    let revalidated =
        chain.execute(&origin(), HttpRequest::get("/r".parse().unwrap())).await.unwrap();
    assert_eq!(exchange.calls(), 2);

    // The conditional request carried the ETag and nothing else.
    assert_eq!(exchange.header_of(1, "if-none-match"), Some("\"W/x\"".to_string()));
    assert_eq!(exchange.header_of(1, "if-modified-since"), None);

    // The merge replaced Cache-Control but kept body, status, and ETag.
    assert_eq!(revalidated.status(), StatusCode::OK);
    assert_eq!(revalidated.headers().get_str("cache-control"), Some("public, max-age=60"));
    assert_eq!(revalidated.headers().get_str("etag"), Some("\"W/x\""));
    assert_eq!(&revalidated.into_bytes().await.unwrap()[..], b"v1");

    // The merged entry is now fresh: a third request is a pure hit.
    let hit = chain.execute(&origin(), HttpRequest::get("/r".parse().unwrap())).await.unwrap();
    assert_eq!(exchange.calls(), 2);
    assert_eq!(&hit.into_bytes().await.unwrap()[..], b"v1");
}

#[tokio::test]
async fn test_only_if_cached_miss_is_synthetic_504() {
    let exchange = MockExchange::new(vec![]);
    let (chain, _) = executor(exchange.clone());

    let mut request = HttpRequest::get("/missing".parse().unwrap());
    request.headers_mut().append("Cache-Control", "only-if-cached").unwrap();

    let resp = chain.execute(&origin(), request).await.unwrap();
    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(exchange.calls(), 0);
}

#[tokio::test]
async fn test_vary_stores_and_serves_variants() {
    let exchange = MockExchange::new(vec![
        response(
            200,
            &[("Cache-Control", "max-age=60"), ("Vary", "Accept-Encoding")],
            "gzip variant",
        ),
        response(
            200,
            &[("Cache-Control", "max-age=60"), ("Vary", "Accept-Encoding")],
            "identity variant",
        ),
    ]);
    let (chain, store) = executor(exchange.clone());

    let mut gzip = HttpRequest::get("/r".parse().unwrap());
    gzip.headers_mut().append("Accept-Encoding", "gzip").unwrap();
    chain.execute(&origin(), gzip).await.unwrap();

    let identity = HttpRequest::get("/r".parse().unwrap());
    chain.execute(&origin(), identity).await.unwrap();
    assert_eq!(exchange.calls(), 2);

    // Same headers again: both served from cache now.
    let mut gzip_again = HttpRequest::get("/r".parse().unwrap());
    gzip_again.headers_mut().append("Accept-Encoding", "gzip").unwrap();
    let hit = chain.execute(&origin(), gzip_again).await.unwrap();
    assert_eq!(exchange.calls(), 2);
    assert_eq!(&hit.into_bytes().await.unwrap()[..], b"gzip variant");

    // The index entry lives at the primary key and points at both leaves.
    let index = store.get("http://h/r").await.unwrap().unwrap();
    assert_eq!(index.variant_map().len(), 2);
    assert!(index.variant_map().contains_key("{accept-encoding=gzip}"));
    assert!(index.variant_map().contains_key("{accept-encoding=}"));
}

#[tokio::test]
async fn test_uncacheable_response_is_not_stored() {
    let exchange = MockExchange::new(vec![
        response(200, &[("Cache-Control", "no-store")], "secret"),
        response(200, &[("Cache-Control", "no-store")], "secret"),
    ]);
    let (chain, store) = executor(exchange.clone());

    chain.execute(&origin(), HttpRequest::get("/s".parse().unwrap())).await.unwrap();
    assert_eq!(store.entry_count().await.unwrap(), 0);

    chain.execute(&origin(), HttpRequest::get("/s".parse().unwrap())).await.unwrap();
    assert_eq!(exchange.calls(), 2);
}

#[tokio::test]
async fn test_head_served_from_get_entry_without_body() {
    let exchange = MockExchange::new(vec![response(
        200,
        &[("Cache-Control", "max-age=60")],
        "payload",
    )]);
    let (chain, _) = executor(exchange.clone());

    chain.execute(&origin(), HttpRequest::get("/r".parse().unwrap())).await.unwrap();

    let head = chain
        .execute(&origin(), HttpRequest::new(Method::HEAD, "/r".parse().unwrap()))
        .await
        .unwrap();
    assert_eq!(exchange.calls(), 1);
    assert_eq!(head.status(), StatusCode::OK);
    assert_eq!(&head.into_bytes().await.unwrap()[..], b"");
}

#[tokio::test]
async fn test_transport_error_propagates() {
    let exchange = MockExchange::new(vec![]);
    let (chain, _) = executor(exchange);

    let err = chain
        .execute(&origin(), HttpRequest::get("/r".parse().unwrap()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Transport { .. }));
}
