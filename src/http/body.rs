//! Entity body representation.
//!
//! A single tagged type covers the three storage classes a body can have:
//! an in-memory byte buffer, a file on disk, or a one-shot byte stream.
//! The first two are repeatable and can back cache entries; a stream can
//! be consumed exactly once.

use crate::base::error::CoreError;
use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::pin::Pin;

/// One-shot byte stream delivered by the HTTP collaborator.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, CoreError>> + Send + Sync + 'static>>;

/// An HTTP entity body.
pub enum EntityBody {
    /// In-memory bytes.
    Bytes(Bytes),
    /// File-backed bytes with a recorded length.
    File { path: PathBuf, len: u64 },
    /// A one-shot stream of unknown length.
    Stream(ByteStream),
}

impl EntityBody {
    /// The empty in-memory body.
    pub fn empty() -> Self {
        Self::Bytes(Bytes::new())
    }

    /// Whether the body can be produced more than once.
    pub fn is_repeatable(&self) -> bool {
        !matches!(self, Self::Stream(_))
    }

    /// Known length in bytes, if any.
    pub fn content_length(&self) -> Option<u64> {
        match self {
            Self::Bytes(b) => Some(b.len() as u64),
            Self::File { len, .. } => Some(*len),
            Self::Stream(_) => None,
        }
    }

    /// Copy a repeatable body into `sink`, returning the bytes written.
    /// Streams are not repeatable and cannot be written this way.
    pub fn write_to(&self, sink: &mut dyn Write) -> Result<u64, CoreError> {
        match self {
            Self::Bytes(b) => {
                sink.write_all(b)?;
                Ok(b.len() as u64)
            }
            Self::File { path, .. } => {
                let mut f = std::fs::File::open(path)?;
                Ok(io::copy(&mut f, sink)?)
            }
            Self::Stream(_) => {
                Err(CoreError::transport("streaming body cannot be replayed into a sink"))
            }
        }
    }

    /// Consume the body, collecting it fully into memory.
    pub async fn into_bytes(self) -> Result<Bytes, CoreError> {
        match self {
            Self::Bytes(b) => Ok(b),
            Self::File { path, .. } => {
                let data = tokio::fs::read(&path).await?;
                Ok(Bytes::from(data))
            }
            Self::Stream(mut s) => {
                let mut out = Vec::new();
                while let Some(chunk) = s.next().await {
                    out.extend_from_slice(&chunk?);
                }
                Ok(Bytes::from(out))
            }
        }
    }

    /// Clone a repeatable body. Streams yield `None`.
    pub fn try_clone(&self) -> Option<Self> {
        match self {
            Self::Bytes(b) => Some(Self::Bytes(b.clone())),
            Self::File { path, len } => Some(Self::File { path: path.clone(), len: *len }),
            Self::Stream(_) => None,
        }
    }
}

impl std::fmt::Debug for EntityBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::File { path, len } => {
                f.debug_struct("File").field("path", path).field("len", len).finish()
            }
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for EntityBody {
    fn from(b: Bytes) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<u8>> for EntityBody {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(v))
    }
}

impl From<&'static str> for EntityBody {
    fn from(s: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(s.as_bytes()))
    }
}
