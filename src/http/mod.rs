//! HTTP vocabulary shared by the cache, pool, and SSE subsystems:
//! - [`headers`]: ordered multi-valued header bag
//! - [`message`]: request/response value types and [`message::Origin`]
//! - [`body`]: tagged entity bodies (bytes, file, stream)
//! - [`date`]: RFC 1123 date handling with sentinel fallbacks
//! - [`transport`]: the [`transport::HttpExchange`] collaborator seam

pub mod body;
pub mod date;
pub mod headers;
pub mod message;
pub mod transport;

pub use body::{ByteStream, EntityBody};
pub use headers::HeaderBag;
pub use message::{HttpRequest, HttpResponse, Origin};
pub use transport::{HttpExchange, StreamingResponse};
