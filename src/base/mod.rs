//! Base types and error handling.
//!
//! Provides the foundational error taxonomy shared by the cache,
//! connection pool, and SSE subsystems:
//! - [`CoreError`]: crate-wide error type

pub mod error;

pub use error::CoreError;
