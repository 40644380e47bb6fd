use crate::base::error::CoreError;
use crate::http::body::EntityBody;
use crate::http::headers::HeaderBag;
use http::{Method, StatusCode, Uri, Version};
use url::Url;

/// The target origin of an exchange: scheme, host, and port.
///
/// Carried separately from the request because request URIs are
/// origin-relative; the pair identifies the cache's primary key space.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    scheme: String,
    host: String,
    port: u16,
}

impl Origin {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        let scheme: String = scheme.into();
        let host: String = host.into();
        Self { scheme: scheme.to_ascii_lowercase(), host: host.to_ascii_lowercase(), port }
    }

    pub fn from_url(url: &Url) -> Result<Self, CoreError> {
        let host = url.host_str().ok_or_else(|| CoreError::parse("origin host", url.as_str()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| CoreError::parse("origin port", url.as_str()))?;
        Ok(Self::new(url.scheme(), host, port))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the port is the scheme's default and may be elided from
    /// canonical forms.
    pub fn is_default_port(&self) -> bool {
        matches!((self.scheme.as_str(), self.port), ("http", 80) | ("https", 443))
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_default_port() {
            write!(f, "{}://{}", self.scheme, self.host)
        } else {
            write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
        }
    }
}

/// An HTTP request as the core sees it: method, origin-relative URI,
/// ordered headers, optional body.
#[derive(Debug)]
pub struct HttpRequest {
    method: Method,
    uri: Uri,
    headers: HeaderBag,
    body: Option<EntityBody>,
}

impl HttpRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self { method, uri, headers: HeaderBag::new(), body: None }
    }

    /// Convenience constructor for a bodiless GET.
    pub fn get(uri: Uri) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderBag {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderBag {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&EntityBody> {
        self.body.as_ref()
    }

    pub fn set_body(&mut self, body: EntityBody) {
        self.body = Some(body);
    }

    pub fn take_body(&mut self) -> Option<EntityBody> {
        self.body.take()
    }

    /// Clone the request. Streaming bodies cannot be replayed and are
    /// dropped from the clone; repeatable bodies are carried over.
    pub fn clone_for_retry(&self) -> Self {
        Self {
            method: self.method.clone(),
            uri: self.uri.clone(),
            headers: self.headers.clone(),
            body: self.body.as_ref().and_then(EntityBody::try_clone),
        }
    }
}

/// An HTTP response as delivered by the collaborator or synthesized from
/// the cache.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    version: Version,
    reason: Option<String>,
    headers: HeaderBag,
    body: EntityBody,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            version: Version::HTTP_11,
            reason: None,
            headers: HeaderBag::new(),
            body: EntityBody::empty(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    /// Reason phrase as sent by the origin, falling back to the status
    /// code's canonical reason.
    pub fn reason(&self) -> &str {
        match &self.reason {
            Some(r) => r,
            None => self.status.canonical_reason().unwrap_or(""),
        }
    }

    pub fn set_reason(&mut self, reason: impl Into<String>) {
        self.reason = Some(reason.into());
    }

    pub fn headers(&self) -> &HeaderBag {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderBag {
        &mut self.headers
    }

    pub fn body(&self) -> &EntityBody {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut EntityBody {
        &mut self.body
    }

    pub fn set_body(&mut self, body: EntityBody) {
        self.body = body;
    }

    pub fn into_body(self) -> EntityBody {
        self.body
    }

    /// Consume the response, collecting the body into memory.
    pub async fn into_bytes(self) -> Result<bytes::Bytes, CoreError> {
        self.body.into_bytes().await
    }
}
