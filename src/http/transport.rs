//! The transport seam.
//!
//! Everything below the cache, pool, and SSE engine (request
//! serialization, HTTP framing, TLS) lives behind [`HttpExchange`]. The
//! contract is narrow: an exchange yields status, reason, version, and
//! headers before any body bytes, and the body is consumed at most once.

use crate::base::error::CoreError;
use crate::http::body::ByteStream;
use crate::http::headers::HeaderBag;
use crate::http::message::{HttpRequest, HttpResponse, Origin};
use async_trait::async_trait;
use http::{StatusCode, Version};

/// A response whose body arrives incrementally. Used by the SSE engine,
/// which must observe bytes as they arrive rather than after collection.
pub struct StreamingResponse {
    pub status: StatusCode,
    pub version: Version,
    pub reason: Option<String>,
    pub headers: HeaderBag,
    pub body: ByteStream,
}

impl StreamingResponse {
    /// First `Content-Type` value, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get_str("content-type")
    }
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers.len())
            .finish()
    }
}

/// The HTTP collaborator: performs one exchange against an origin.
#[async_trait]
pub trait HttpExchange: Send + Sync {
    /// Execute a request and deliver the response with its body fully
    /// available (in memory or file-backed).
    async fn execute(&self, origin: &Origin, request: HttpRequest)
        -> Result<HttpResponse, CoreError>;

    /// Execute a request and deliver the body as a byte stream.
    async fn execute_stream(
        &self,
        origin: &Origin,
        request: HttpRequest,
    ) -> Result<StreamingResponse, CoreError>;
}
