//! Connection pooling.
//!
//! Provides bounded per-route connection management:
//! - [`route`]: the (host, port, secure, proxy) connection class
//! - [`manager`]: the pool itself: caps, waiter queues, idle reaping
//! - [`lease`]: RAII holds on pooled connections

pub mod lease;
pub mod manager;
pub mod route;

pub use lease::Lease;
pub use manager::{ConnectionFactory, ConnectionPool, ManagedConnection, PoolConfig, PoolStats};
pub use route::Route;
