use coronet::cache::keys::{primary_key, variant_key};
use coronet::cache::{CacheEntry, ResponseCachePolicy};
use coronet::http::date::format_http_date;
use coronet::http::{EntityBody, HeaderBag, HttpRequest, HttpResponse, Origin};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use http::{Method, StatusCode, Version};
use std::time::{Duration, SystemTime};

fn sample_entry() -> CacheEntry {
    let t = SystemTime::now();
    let mut headers = HeaderBag::new();
    headers.append("Date", &format_http_date(t)).unwrap();
    headers.append("Cache-Control", "max-age=60, s-maxage=30").unwrap();
    headers.append("Vary", "Accept-Encoding, User-Agent").unwrap();
    headers.append("ETag", "\"abc123\"").unwrap();
    CacheEntry::new(
        t,
        t,
        Version::HTTP_11,
        StatusCode::OK,
        None,
        headers,
        EntityBody::from("0123456789abcdef"),
        Method::GET,
    )
}

fn bench_freshness(c: &mut Criterion) {
    let entry = sample_entry();
    let now = SystemTime::now() + Duration::from_secs(10);
    c.bench_function("entry_current_age", |b| {
        b.iter(|| black_box(entry.current_age(black_box(now))))
    });
    c.bench_function("entry_freshness_lifetime_shared", |b| {
        b.iter(|| black_box(entry.freshness_lifetime(true)))
    });
}

fn bench_policy(c: &mut Criterion) {
    let policy = ResponseCachePolicy::new(true, 1024 * 1024);
    let mut response = HttpResponse::new(StatusCode::OK);
    response.headers_mut().append("Date", &format_http_date(SystemTime::now())).unwrap();
    response.headers_mut().append("Cache-Control", "public, max-age=300").unwrap();
    response.set_body(EntityBody::from("body"));

    c.bench_function("policy_is_response_cacheable", |b| {
        b.iter(|| black_box(policy.is_response_cacheable(&Method::GET, &response, None)))
    });
}

fn bench_keys(c: &mut Criterion) {
    let origin = Origin::new("https", "api.example.com", 443);
    let mut request = HttpRequest::get("/v1/items?page=3&sort=desc".parse().unwrap());
    request.headers_mut().append("Accept-Encoding", "gzip, br").unwrap();
    request.headers_mut().append("User-Agent", "bench agent").unwrap();
    let entry = sample_entry();

    c.bench_function("primary_key", |b| b.iter(|| black_box(primary_key(&origin, &request))));
    c.bench_function("variant_key", |b| b.iter(|| black_box(variant_key(&request, &entry))));
}

criterion_group!(benches, bench_freshness, bench_policy, bench_keys);
criterion_main!(benches);
