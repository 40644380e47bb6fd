//! The caching execution chain: lookup → serve / revalidate / fetch →
//! store.
//!
//! Cache failures never fail the caller's request: store writes and
//! invalidation are best-effort, lookup errors degrade to misses.
//! Transport errors propagate.

use crate::base::error::CoreError;
use crate::cache::conditional::{CacheEntryUpdater, ConditionalRequestBuilder};
use crate::cache::control::CacheControl;
use crate::cache::entry::CacheEntry;
use crate::cache::invalidate::CacheInvalidator;
use crate::cache::keys::{primary_key, variant_entry_key, variant_key};
use crate::cache::policy::ResponseCachePolicy;
use crate::cache::store::CacheStore;
use crate::cache::suitability::SuitabilityChecker;
use crate::http::body::EntityBody;
use crate::http::message::{HttpRequest, HttpResponse, Origin};
use crate::http::transport::HttpExchange;
use http::{Method, StatusCode};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

/// Product token added to `Via` on responses served from the cache.
const VIA: &str = "1.1 coronet (cache)";

/// Cache behavior knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Shared-cache semantics (`s-maxage` honored, `private` refused).
    pub shared: bool,
    /// Largest body, in bytes, admitted to the cache.
    pub max_object_size: u64,
    /// Serve a stale entry with `Warning: 110` when revalidation hits a
    /// 5xx. Off by default.
    pub serve_stale_on_error: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { shared: true, max_object_size: 8 * 1024 * 1024, serve_stale_on_error: false }
    }
}

/// Executes requests through the cache: the public entry point of the
/// caching subsystem.
pub struct CachingExecutor {
    store: Arc<dyn CacheStore>,
    exchange: Arc<dyn HttpExchange>,
    policy: ResponseCachePolicy,
    suitability: SuitabilityChecker,
    invalidator: CacheInvalidator,
    conditional: ConditionalRequestBuilder,
    updater: CacheEntryUpdater,
    serve_stale_on_error: bool,
}

impl CachingExecutor {
    pub fn new(
        store: Arc<dyn CacheStore>,
        exchange: Arc<dyn HttpExchange>,
        config: CacheConfig,
    ) -> Self {
        Self {
            store,
            exchange,
            policy: ResponseCachePolicy::new(config.shared, config.max_object_size),
            suitability: SuitabilityChecker::new(config.shared),
            invalidator: CacheInvalidator::new(),
            conditional: ConditionalRequestBuilder::new(),
            updater: CacheEntryUpdater::new(),
            serve_stale_on_error: config.serve_stale_on_error,
        }
    }

    pub async fn execute(
        &self,
        origin: &Origin,
        request: HttpRequest,
    ) -> Result<HttpResponse, CoreError> {
        // Unsafe requests flush the cache and go straight to the origin;
        // their responses are never stored.
        if CacheInvalidator::requires_invalidation(&request) {
            self.invalidator.flush(self.store.as_ref(), origin, &request).await;
            return self.exchange.execute(origin, request).await;
        }

        let key = primary_key(origin, &request);
        let root = self.lookup(&key).await;

        if root.is_none() && CacheControl::from_headers(request.headers()).only_if_cached {
            tracing::debug!(key = %key, "only-if-cached with no entry");
            return Ok(synthetic_gateway_timeout());
        }

        // Resolve a variant index down to its leaf for this request.
        let (entry, entry_key) = match root {
            Some(root) if root.has_variants() => {
                let variant = variant_key(&request, &root);
                match root.variant_map().get(&variant) {
                    Some(leaf_key) => (self.lookup(leaf_key).await, leaf_key.clone()),
                    None => (None, key.clone()),
                }
            }
            other => (other, key.clone()),
        };

        if let Some(entry) = &entry {
            let now = SystemTime::now();
            if !entry.has_variants() && self.suitability.can_use(entry, &request, now) {
                tracing::debug!(key = %entry_key, "cache hit");
                return Ok(self.synthesize(entry, &request, now));
            }
        }

        if let Some(entry) = &entry {
            if entry.is_revalidatable() {
                return self.revalidate(origin, &request, entry, &entry_key, &key).await;
            }
        }

        tracing::debug!(key = %key, "cache miss");
        let (response, request_date, response_date) = self.fetch(origin, &request).await?;
        self.maybe_store(&request, &key, response, request_date, response_date).await
    }

    /// Best-effort store read: errors degrade to a miss.
    async fn lookup(&self, key: &str) -> Option<Arc<CacheEntry>> {
        match self.store.get(key).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache lookup failed; treating as miss");
                None
            }
        }
    }

    async fn revalidate(
        &self,
        origin: &Origin,
        request: &HttpRequest,
        entry: &CacheEntry,
        entry_key: &str,
        primary: &str,
    ) -> Result<HttpResponse, CoreError> {
        let conditional = self.conditional.build(request, entry);
        let request_date = SystemTime::now();
        let response = self.exchange.execute(origin, conditional).await?;
        let response_date = SystemTime::now();

        if response.status() == StatusCode::NOT_MODIFIED {
            tracing::debug!(key = %entry_key, "revalidated");
            let merged = self.updater.update(entry, request_date, response_date, &response);
            let stored = merged.clone();
            if let Err(e) = self
                .store
                .update(entry_key, Box::new(move |_| Some(stored)))
                .await
            {
                tracing::warn!(key = %entry_key, error = %e, "storing revalidated entry failed");
            }
            return Ok(self.synthesize(&merged, request, SystemTime::now()));
        }

        if response.status().is_server_error() && self.serve_stale_on_error {
            tracing::debug!(key = %entry_key, status = %response.status(), "serving stale on error");
            let now = SystemTime::now();
            let mut stale = self.synthesize(entry, request, now);
            let _ = stale.headers_mut().append("Warning", "110 coronet \"Response is stale\"");
            return Ok(stale);
        }

        // The origin answered with a full response; treat it as a fresh
        // fetch.
        self.maybe_store(request, primary, response, request_date, response_date).await
    }

    async fn fetch(
        &self,
        origin: &Origin,
        request: &HttpRequest,
    ) -> Result<(HttpResponse, SystemTime, SystemTime), CoreError> {
        let request_date = SystemTime::now();
        let response = self.exchange.execute(origin, request.clone_for_retry()).await?;
        let response_date = SystemTime::now();
        Ok((response, request_date, response_date))
    }

    /// Buffer the response body, store the response when the policy
    /// admits it, and hand the response back. A body that cannot be read
    /// to completion propagates its error and stores nothing.
    async fn maybe_store(
        &self,
        request: &HttpRequest,
        primary: &str,
        mut response: HttpResponse,
        request_date: SystemTime,
        response_date: SystemTime,
    ) -> Result<HttpResponse, CoreError> {
        if !response.body().is_repeatable() {
            let body = std::mem::replace(response.body_mut(), EntityBody::empty());
            let bytes = body.into_bytes().await?;
            response.set_body(EntityBody::Bytes(bytes));
        }

        if !self.policy.is_response_cacheable(request.method(), &response, Some(request)) {
            return Ok(response);
        }

        let entry = CacheEntry::new(
            request_date,
            response_date,
            response.version(),
            response.status(),
            Some(response.reason().to_string()),
            response.headers().clone(),
            response.body().try_clone().unwrap_or_else(EntityBody::empty),
            Method::GET,
        );

        if entry.headers().tokens_of("vary").next().is_some() {
            self.store_variant(request, primary, entry).await;
        } else if let Err(e) = self.store.put(primary, entry).await {
            tracing::warn!(key = %primary, error = %e, "cache write failed");
        }

        Ok(response)
    }

    /// Store a leaf under its variant key and fold the mapping into the
    /// primary index entry.
    async fn store_variant(&self, request: &HttpRequest, primary: &str, leaf: CacheEntry) {
        let variant = variant_key(request, &leaf);
        let leaf_key = variant_entry_key(&variant, primary);

        if let Err(e) = self.store.put(&leaf_key, leaf.clone()).await {
            tracing::warn!(key = %leaf_key, error = %e, "variant cache write failed");
            return;
        }

        let index_template = leaf;
        let primary_owned = primary.to_string();
        let result = self
            .store
            .update(
                primary,
                Box::new(move |existing| {
                    let mut map = match &existing {
                        Some(e) if e.has_variants() => e.variant_map().clone(),
                        _ => BTreeMap::new(),
                    };
                    map.insert(variant, leaf_key);
                    Some(index_template.with_variant_map(map))
                }),
            )
            .await;
        if let Err(e) = result {
            tracing::warn!(key = %primary_owned, error = %e, "variant index update failed");
        }
    }

    /// Build the caller-facing response for a cache hit: stored status
    /// line and headers, a recomputed `Age`, a cache `Via` token, and
    /// the stored body (elided for HEAD).
    fn synthesize(&self, entry: &CacheEntry, request: &HttpRequest, now: SystemTime) -> HttpResponse {
        let mut response = HttpResponse::new(entry.status());
        response.set_version(entry.version());
        if let Some(reason) = entry.reason() {
            response.set_reason(reason);
        }
        *response.headers_mut() = entry.headers().clone();

        let age = entry.current_age(now).max(0);
        let _ = response.headers_mut().set("Age", &age.to_string());
        let _ = response.headers_mut().append("Via", VIA);

        if request.method() == Method::HEAD {
            response.set_body(EntityBody::empty());
        } else {
            response
                .set_body(entry.body().try_clone().unwrap_or_else(EntityBody::empty));
        }
        response
    }
}

fn synthetic_gateway_timeout() -> HttpResponse {
    let mut response = HttpResponse::new(StatusCode::GATEWAY_TIMEOUT);
    response.set_reason("Gateway Timeout");
    response
}
