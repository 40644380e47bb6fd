//! The connection pool: per-route leases with global and per-route
//! caps, waiter queues, idle eviction, and leak-safe reclamation.
//!
//! All pool state lives behind a single mutex held only for short,
//! non-blocking critical sections; waiting happens on per-waiter oneshot
//! channels so the cap invariants hold at every observable instant.

use crate::base::error::CoreError;
use crate::pool::lease::{Lease, LeaseRecord};
use crate::pool::route::Route;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// A transport connection the pool can manage. Implementations close
/// their resources on drop.
pub trait ManagedConnection: Send + 'static {
    /// Whether the connection is still usable.
    fn is_open(&self) -> bool;
}

/// Builds new transport connections for a route.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self, route: &Route) -> Result<Box<dyn ManagedConnection>, CoreError>;
}

/// Pool limits and maintenance intervals.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Cap across all routes.
    pub max_total: usize,
    /// Cap per route, unless overridden for a specific route.
    pub max_per_route: usize,
    /// Free connections idle longer than this are closed by the reaper.
    pub idle_timeout: Duration,
    /// Leases older than this are force-reclaimed by the supervisor.
    pub lease_ceiling: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total: 200,
            max_per_route: 100,
            idle_timeout: Duration::from_secs(60),
            lease_ceiling: Duration::from_secs(300),
        }
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub leased: usize,
    pub free: usize,
    pub pending: usize,
    pub max: usize,
}

enum WaiterSignal {
    /// A released connection handed directly to this waiter; lease
    /// accounting has already been transferred.
    Granted(Box<dyn ManagedConnection>),
    /// Capacity may be available; recompute under the lock.
    Retry,
    Shutdown,
}

struct Waiter {
    route: Route,
    tx: oneshot::Sender<WaiterSignal>,
}

struct IdleConn {
    conn: Box<dyn ManagedConnection>,
    became_idle_at: Instant,
}

#[derive(Default)]
struct RoutePool {
    /// Front = most recently used.
    free: VecDeque<IdleConn>,
    leased: usize,
    waiters: VecDeque<u64>,
    max_override: Option<usize>,
}

impl RoutePool {
    fn total(&self) -> usize {
        self.leased + self.free.len()
    }
}

#[derive(Default)]
struct PoolState {
    routes: HashMap<Route, RoutePool>,
    waiters: HashMap<u64, Waiter>,
    global_waiters: VecDeque<u64>,
    total_leased: usize,
    total_free: usize,
    next_waiter_id: u64,
}

impl PoolState {
    fn route_mut(&mut self, route: &Route) -> &mut RoutePool {
        self.routes.entry(route.clone()).or_default()
    }

    fn route_cap(&self, route: &Route, config: &PoolConfig) -> usize {
        self.routes
            .get(route)
            .and_then(|rp| rp.max_override)
            .unwrap_or(config.max_per_route)
    }

    /// Pop the most recently used live free connection for `route`,
    /// discarding dead ones along the way.
    fn pop_free(&mut self, route: &Route) -> Option<Box<dyn ManagedConnection>> {
        loop {
            let idle = self.route_mut(route).free.pop_front()?;
            self.total_free -= 1;
            if idle.conn.is_open() {
                return Some(idle.conn);
            }
            tracing::debug!(route = %route, "discarding dead idle connection");
        }
    }

    /// Close the least-recently-used free connection across all routes.
    fn evict_lru_idle(&mut self) -> bool {
        let victim = self
            .routes
            .iter()
            .filter_map(|(r, rp)| rp.free.back().map(|idle| (r.clone(), idle.became_idle_at)))
            .min_by_key(|(_, at)| *at)
            .map(|(r, _)| r);
        match victim {
            Some(route) => {
                if let Some(rp) = self.routes.get_mut(&route) {
                    if rp.free.pop_back().is_some() {
                        self.total_free -= 1;
                        tracing::debug!(route = %route, "evicted idle connection for another route");
                        return true;
                    }
                }
                false
            }
            None => false,
        }
    }

    fn enqueue_waiter(&mut self, route: &Route) -> (u64, oneshot::Receiver<WaiterSignal>) {
        let id = self.next_waiter_id;
        self.next_waiter_id += 1;
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(id, Waiter { route: route.clone(), tx });
        self.route_mut(route).waiters.push_back(id);
        self.global_waiters.push_back(id);
        (id, rx)
    }

    /// Remove a waiter from the map and from both queues it joined.
    fn remove_waiter(&mut self, id: u64) -> Option<Waiter> {
        let waiter = self.waiters.remove(&id)?;
        if let Some(rp) = self.routes.get_mut(&waiter.route) {
            rp.waiters.retain(|x| *x != id);
        }
        self.global_waiters.retain(|x| *x != id);
        Some(waiter)
    }

    fn next_route_waiter(&mut self, route: &Route) -> Option<Waiter> {
        loop {
            let id = self.routes.get_mut(route)?.waiters.pop_front()?;
            if self.waiters.contains_key(&id) {
                self.global_waiters.retain(|x| *x != id);
                return self.waiters.remove(&id);
            }
        }
    }

    fn next_global_waiter(&mut self) -> Option<Waiter> {
        loop {
            let id = self.global_waiters.pop_front()?;
            if let Some(waiter) = self.waiters.remove(&id) {
                if let Some(rp) = self.routes.get_mut(&waiter.route) {
                    rp.waiters.retain(|x| *x != id);
                }
                return Some(waiter);
            }
        }
    }

    /// Wake one waiter with a retry signal, preferring the route's own
    /// queue.
    fn wake_one(&mut self, route: &Route) {
        loop {
            let waiter = match self.next_route_waiter(route) {
                Some(w) => Some(w),
                None => self.next_global_waiter(),
            };
            match waiter {
                Some(w) => {
                    if w.tx.send(WaiterSignal::Retry).is_ok() {
                        return;
                    }
                }
                None => return,
            }
        }
    }

    fn wake_one_global(&mut self) {
        loop {
            match self.next_global_waiter() {
                Some(w) => {
                    if w.tx.send(WaiterSignal::Retry).is_ok() {
                        return;
                    }
                }
                None => return,
            }
        }
    }
}

enum Acquire {
    Granted(Box<dyn ManagedConnection>),
    Connect,
    Wait(u64, oneshot::Receiver<WaiterSignal>),
}

pub(crate) struct PoolInner {
    pub(crate) config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    state: Mutex<PoolState>,
    shutdown: AtomicBool,
    /// Outstanding leases, for supervisor reclamation. A lease absent
    /// from the registry has already been reclaimed and must not touch
    /// the counters again.
    pub(crate) leases: DashMap<u64, LeaseRecord>,
    next_lease_id: std::sync::atomic::AtomicU64,
}

impl PoolInner {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn release_connection(
        self: &Arc<Self>,
        lease_id: u64,
        route: &Route,
        conn: Box<dyn ManagedConnection>,
        reusable: bool,
    ) {
        if self.leases.remove(&lease_id).is_none() {
            // Force-reclaimed: the counters were already adjusted.
            drop(conn);
            return;
        }

        let mut st = self.state();
        if self.shutdown.load(Ordering::SeqCst) || !reusable || !conn.is_open() {
            st.route_mut(route).leased -= 1;
            st.total_leased -= 1;
            st.wake_one(route);
            drop(st);
            drop(conn);
            return;
        }

        // Hand off directly to a waiter on this route; the connection
        // stays leased through the transfer.
        let mut conn = conn;
        loop {
            match st.next_route_waiter(route) {
                Some(waiter) => match waiter.tx.send(WaiterSignal::Granted(conn)) {
                    Ok(()) => return,
                    Err(WaiterSignal::Granted(returned)) => conn = returned,
                    Err(_) => return,
                },
                None => break,
            }
        }

        st.route_mut(route).leased -= 1;
        st.total_leased -= 1;
        st.route_mut(route).free.push_front(IdleConn { conn, became_idle_at: Instant::now() });
        st.total_free += 1;
        // A freed connection can unblock a saturated waiter on another
        // route through the eviction path.
        st.wake_one_global();
    }

    fn register_lease(self: &Arc<Self>, route: &Route, conn: Box<dyn ManagedConnection>) -> Lease {
        let id = self.next_lease_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.leases.insert(id, LeaseRecord { route: route.clone(), leased_at: Instant::now() });
        Lease::new(id, route.clone(), conn, Arc::clone(self))
    }
}

/// The connection pool manager.
///
/// Cloning shares the underlying pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(factory: Arc<dyn ConnectionFactory>, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                factory,
                state: Mutex::new(PoolState::default()),
                shutdown: AtomicBool::new(false),
                leases: DashMap::new(),
                next_lease_id: std::sync::atomic::AtomicU64::new(0),
            }),
        }
    }

    /// Lease a connection for `route`, waiting up to `timeout` when the
    /// pool is saturated.
    pub async fn lease(&self, route: &Route, timeout: Duration) -> Result<Lease, CoreError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.inner.shutdown.load(Ordering::SeqCst) {
                return Err(CoreError::PoolShutdown);
            }

            let action = {
                let mut st = self.inner.state();
                let cap = st.route_cap(route, &self.inner.config);
                let max_total = self.inner.config.max_total;

                if let Some(conn) = st.pop_free(route) {
                    st.route_mut(route).leased += 1;
                    st.total_leased += 1;
                    Acquire::Granted(conn)
                } else if st.route_mut(route).total() < cap
                    && st.total_leased + st.total_free < max_total
                {
                    // Reserve the slot before the (unlocked) connect.
                    st.route_mut(route).leased += 1;
                    st.total_leased += 1;
                    Acquire::Connect
                } else if st.route_mut(route).total() < cap
                    && st.total_free > 0
                    && st.evict_lru_idle()
                {
                    st.route_mut(route).leased += 1;
                    st.total_leased += 1;
                    Acquire::Connect
                } else {
                    let (id, rx) = st.enqueue_waiter(route);
                    Acquire::Wait(id, rx)
                }
            };

            match action {
                Acquire::Granted(conn) => return Ok(self.inner.register_lease(route, conn)),
                Acquire::Connect => match self.inner.factory.connect(route).await {
                    Ok(conn) => return Ok(self.inner.register_lease(route, conn)),
                    Err(e) => {
                        let mut st = self.inner.state();
                        st.route_mut(route).leased -= 1;
                        st.total_leased -= 1;
                        st.wake_one(route);
                        return Err(e);
                    }
                },
                Acquire::Wait(id, mut rx) => {
                    match tokio::time::timeout_at(deadline, &mut rx).await {
                        Ok(Ok(WaiterSignal::Granted(conn))) => {
                            return Ok(self.inner.register_lease(route, conn));
                        }
                        Ok(Ok(WaiterSignal::Retry)) => continue,
                        Ok(Ok(WaiterSignal::Shutdown)) => return Err(CoreError::PoolShutdown),
                        Ok(Err(_)) => continue,
                        Err(_) => {
                            // Timed out: leave both queues. A signal can
                            // race the timeout; it must not be lost.
                            let removed = {
                                let mut st = self.inner.state();
                                st.remove_waiter(id).is_some()
                            };
                            if !removed {
                                match rx.try_recv() {
                                    Ok(WaiterSignal::Granted(conn)) => {
                                        // The handoff completed before we
                                        // left the queues; accept it.
                                        return Ok(self.inner.register_lease(route, conn));
                                    }
                                    Ok(WaiterSignal::Retry) => {
                                        // Pass the missed capacity signal
                                        // on to another waiter.
                                        self.inner.state().wake_one(route);
                                    }
                                    _ => {}
                                }
                            }
                            return Err(CoreError::LeaseTimeout);
                        }
                    }
                }
            }
        }
    }

    /// Raise or lower the cap for a single route. Waiters are nudged so
    /// a raised cap takes effect immediately.
    pub fn set_max_per_route(&self, route: &Route, max: usize) {
        let mut st = self.inner.state();
        st.route_mut(route).max_override = Some(max);
        st.wake_one(route);
    }

    /// Close free connections idle for longer than `max_idle`.
    pub fn close_idle(&self, max_idle: Duration) {
        let mut closed = Vec::new();
        let mut st = self.inner.state();
        let now = Instant::now();
        let mut removed = 0;
        for rp in st.routes.values_mut() {
            let before = rp.free.len();
            let (keep, expired): (VecDeque<_>, VecDeque<_>) = rp
                .free
                .drain(..)
                .partition(|idle| now.duration_since(idle.became_idle_at) <= max_idle);
            rp.free = keep;
            closed.extend(expired);
            removed += before - rp.free.len();
        }
        st.total_free -= removed;
        drop(st);
        // Connections close on drop, outside the lock.
        drop(closed);
    }

    /// Close free connections that have outlived the configured idle
    /// timeout.
    pub fn close_expired(&self) {
        self.close_idle(self.inner.config.idle_timeout);
    }

    /// Force-reclaim leases older than the configured ceiling. Their
    /// slots are returned to the pool; a late release of a reclaimed
    /// lease only drops the connection.
    pub fn reclaim_overdue_leases(&self) {
        let ceiling = self.inner.config.lease_ceiling;
        let overdue: Vec<(u64, Route)> = self
            .inner
            .leases
            .iter()
            .filter(|kv| kv.value().leased_at.elapsed() > ceiling)
            .map(|kv| (*kv.key(), kv.value().route.clone()))
            .collect();
        for (id, route) in overdue {
            if self.inner.leases.remove(&id).is_some() {
                tracing::warn!(route = %route, "force-reclaiming overdue lease");
                let mut st = self.inner.state();
                st.route_mut(&route).leased -= 1;
                st.total_leased -= 1;
                st.wake_one(&route);
            }
        }
    }

    /// Spawn the periodic maintenance task (idle reaping plus lease
    /// supervision). Call once after construction.
    pub fn start_maintenance(&self) {
        let pool = self.clone();
        let interval = pool.inner.config.idle_timeout.min(Duration::from_secs(30)).max(Duration::from_millis(10));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if pool.inner.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                pool.close_expired();
                pool.reclaim_overdue_leases();
            }
        });
    }

    /// Drain free connections, interrupt all waiters, and refuse
    /// further leases. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut st = self.inner.state();
        let mut drained = 0;
        for rp in st.routes.values_mut() {
            drained += rp.free.len();
            rp.free.clear();
            rp.waiters.clear();
        }
        st.total_free -= drained;
        st.global_waiters.clear();
        for (_, waiter) in st.waiters.drain() {
            let _ = waiter.tx.send(WaiterSignal::Shutdown);
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    /// Counters across all routes.
    pub fn total_stats(&self) -> PoolStats {
        let st = self.inner.state();
        PoolStats {
            leased: st.total_leased,
            free: st.total_free,
            pending: st.waiters.len(),
            max: self.inner.config.max_total,
        }
    }

    /// Counters for one route.
    pub fn route_stats(&self, route: &Route) -> PoolStats {
        let st = self.inner.state();
        let cap = st.route_cap(route, &self.inner.config);
        match st.routes.get(route) {
            Some(rp) => PoolStats {
                leased: rp.leased,
                free: rp.free.len(),
                pending: rp.waiters.len(),
                max: cap,
            },
            None => PoolStats { leased: 0, free: 0, pending: 0, max: cap },
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.total_stats();
        f.debug_struct("ConnectionPool")
            .field("leased", &stats.leased)
            .field("free", &stats.free)
            .field("pending", &stats.pending)
            .field("max_total", &stats.max)
            .finish()
    }
}
