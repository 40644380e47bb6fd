use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Crate-wide error type covering the cache, pool, and SSE subsystems.
///
/// Variants map one-to-one onto the failure kinds the library
/// distinguishes: parse failures (normally swallowed with a sentinel),
/// cache persistence failures (swallowed on writes, surfaced on explicit
/// reads), pool lifecycle errors, transport failures from the HTTP
/// collaborator, SSE protocol violations, and benign cancellation.
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    /// A header or date value could not be parsed.
    ///
    /// Callers that can degrade (freshness math, directive scanning)
    /// substitute a sentinel instead of propagating this.
    #[error("malformed {what}: {value:?}")]
    Parse { what: &'static str, value: String },

    /// The cache persistence layer failed.
    #[error("cache store failure: {0}")]
    CacheStore(String),

    /// The connection pool has been shut down and refuses leases.
    #[error("connection pool is shut down")]
    PoolShutdown,

    /// No pooled connection became available within the lease timeout.
    #[error("timed out waiting for a pooled connection")]
    LeaseTimeout,

    /// The HTTP collaborator failed to complete an exchange.
    #[error("transport failure: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Arc<io::Error>>,
    },

    /// The peer violated protocol expectations (for SSE: a status other
    /// than 200/204, or a non-`text/event-stream` content type).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The server requested a terminal close of an SSE stream (204).
    #[error("server closed the event stream")]
    ServerClose,

    /// The operation was cancelled by the caller or by shutdown.
    #[error("operation cancelled")]
    Cancelled,
}

impl CoreError {
    /// Parse failure for a named header or field.
    pub fn parse(what: &'static str, value: impl Into<String>) -> Self {
        Self::Parse { what, value: value.into() }
    }

    /// Transport failure with a free-form reason.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport { reason: reason.into(), source: None }
    }

    /// Transport failure wrapping an underlying I/O error.
    pub fn transport_io(reason: impl Into<String>, source: io::Error) -> Self {
        Self::Transport { reason: reason.into(), source: Some(Arc::new(source)) }
    }

    /// Cache store failure with a free-form reason.
    pub fn cache_store(reason: impl Into<String>) -> Self {
        Self::CacheStore(reason.into())
    }

    /// True for errors that are expected during an orderly cancel or
    /// shutdown and must not be reported as failures.
    pub fn is_benign_cancel(&self) -> bool {
        matches!(self, Self::Cancelled | Self::PoolShutdown)
    }
}

impl From<io::Error> for CoreError {
    fn from(e: io::Error) -> Self {
        let reason = e.kind().to_string();
        Self::Transport { reason, source: Some(Arc::new(e)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_display() {
        let err = CoreError::parse("Date", "yesterday-ish");
        assert_eq!(err.to_string(), "malformed Date: \"yesterday-ish\"");
    }

    #[test]
    fn test_io_maps_to_transport() {
        let io = io::Error::new(io::ErrorKind::ConnectionReset, "rst");
        let err = CoreError::from(io);
        assert!(matches!(err, CoreError::Transport { .. }));
    }

    #[test]
    fn test_benign_cancel() {
        assert!(CoreError::Cancelled.is_benign_cancel());
        assert!(CoreError::PoolShutdown.is_benign_cancel());
        assert!(!CoreError::LeaseTimeout.is_benign_cancel());
        assert!(!CoreError::ServerClose.is_benign_cancel());
    }
}
