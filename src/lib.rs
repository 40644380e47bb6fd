//! # coronet
//!
//! An HTTP client core for Rust: the hard parts of production HTTP
//! behavior, built on top of a narrow transport seam.
//!
//! ## Subsystems
//!
//! - **Response caching** ([`cache`]): an RFC 7234 shared/private cache
//!   with freshness math, `Vary` variant handling, conditional
//!   revalidation, invalidation on unsafe methods, and a bounded MRU
//!   store with per-key atomic updates.
//! - **Connection pooling** ([`pool`]): per-route leases with global and
//!   per-route caps, waiter queues with timeouts, idle eviction, and
//!   leak-safe reclamation through RAII release guards.
//! - **Server-Sent Events** ([`sse`]): an incremental
//!   `text/event-stream` parser and an event source engine with
//!   policy-driven reconnection that honors server hints.
//!
//! Request building, wire framing, TLS, cookies, and authentication are
//! out of scope: they live behind [`http::transport::HttpExchange`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use coronet::cache::{CacheConfig, CachingExecutor, MemoryCacheStore};
//! use coronet::http::{HttpRequest, Origin};
//! use std::sync::Arc;
//!
//! # async fn run(exchange: Arc<dyn coronet::http::HttpExchange>) {
//! let store = Arc::new(MemoryCacheStore::new(1000));
//! let executor = CachingExecutor::new(store, exchange, CacheConfig::default());
//!
//! let origin = Origin::new("https", "example.com", 443);
//! let response = executor
//!     .execute(&origin, HttpRequest::get("/".parse().unwrap()))
//!     .await
//!     .unwrap();
//! println!("status: {}", response.status());
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Core error taxonomy
//! - [`http`] - Shared HTTP vocabulary and the transport seam
//! - [`cache`] - RFC 7234 response caching
//! - [`pool`] - Bounded per-route connection pooling
//! - [`sse`] - Server-Sent Events parsing and streaming

pub mod base;
pub mod cache;
pub mod http;
pub mod pool;
pub mod sse;

pub use base::CoreError;
