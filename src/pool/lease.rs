use crate::pool::manager::{ManagedConnection, PoolInner};
use crate::pool::route::Route;
use std::sync::Arc;
use std::time::Instant;

/// Registry entry for an outstanding lease, used by the supervisor to
/// force-reclaim leases that outlive the configured ceiling.
pub(crate) struct LeaseRecord {
    pub(crate) route: Route,
    pub(crate) leased_at: Instant,
}

/// An exclusive hold on a pooled connection.
///
/// The lease is a scope-bound release guard: dropping it returns the
/// connection to the pool (reusable while still open). The lease holds
/// only a handle into the pool; the pool never references the lease.
pub struct Lease {
    id: u64,
    route: Route,
    conn: Option<Box<dyn ManagedConnection>>,
    pool: Arc<PoolInner>,
}

impl Lease {
    pub(crate) fn new(
        id: u64,
        route: Route,
        conn: Box<dyn ManagedConnection>,
        pool: Arc<PoolInner>,
    ) -> Self {
        Self { id, route, conn: Some(conn), pool }
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// The leased connection. Present for the lease's whole lifetime.
    pub fn connection(&mut self) -> &mut dyn ManagedConnection {
        match self.conn.as_mut() {
            Some(conn) => conn.as_mut(),
            // The option is only emptied by release()/drop, both of
            // which consume the lease.
            None => unreachable!("lease accessed after release"),
        }
    }

    /// Return the connection explicitly. `reusable: false` closes it
    /// instead of pooling it.
    pub fn release(mut self, reusable: bool) {
        if let Some(conn) = self.conn.take() {
            self.pool.release_connection(self.id, &self.route, conn, reusable);
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let reusable = conn.is_open();
            self.pool.release_connection(self.id, &self.route, conn, reusable);
        }
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.id)
            .field("route", &self.route)
            .field("held", &self.conn.is_some())
            .finish()
    }
}
