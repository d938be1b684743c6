//! # Connection Pool
//!
//! Per-authority pooling of backend connections.
//!
//! ## Overview
//!
//! A [`ConnectionPool`] lends connections created by a [`Connector`] through
//! [`Pooled`] guards. Dropping a guard returns its connection for reuse;
//! calling [`Pooled::invalidate`] first (typically after a transport error)
//! closes it instead.
//!
//! ```text
//! borrow(authority) ──▶ idle connection? ──yes──▶ validate ──▶ Pooled
//!                            │ no
//!                            ▼
//!                  below max_per_authority? ──yes──▶ connect ──▶ Pooled
//!                            │ no
//!                            ▼
//!                   ExhaustedPolicy (Block / Grow / Fail)
//! ```
//!
//! Bookkeeping lives behind one mutex. Connecting and closing happen outside
//! of it, so a slow backend never blocks borrowers of other authorities.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use anyfs_ops::{Authority, Connection, ConnectionPool, Connector, OpResult, PoolConfig, Uri};
//!
//! struct Echo;
//! struct EchoConn;
//!
//! impl Connection for EchoConn {
//!     fn is_open(&self) -> bool { true }
//!     fn close(self) {}
//! }
//!
//! impl Connector for Echo {
//!     type Conn = EchoConn;
//!     fn connect(&self, _: &Authority) -> OpResult<EchoConn> { Ok(EchoConn) }
//! }
//!
//! let pool = Arc::new(ConnectionPool::new(Echo, PoolConfig::default()));
//! let authority = Authority::from_uri(&Uri::parse("echo://host/").unwrap()).unwrap();
//! {
//!     let _conn = pool.borrow(&authority).unwrap();
//!     assert_eq!(pool.stats().active, 1);
//! }
//! assert_eq!(pool.stats().idle, 1);
//! ```

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::{Authority, ExhaustedPolicy, OpError, OpResult, PoolConfig};

/// A live backend connection.
pub trait Connection: Send {
    /// Returns `true` while the connection can still carry requests.
    fn is_open(&self) -> bool;

    /// Release the connection's backend resources.
    fn close(self);
}

/// Opens connections for a [`ConnectionPool`].
pub trait Connector: Send + Sync + 'static {
    /// Connection type produced by this connector.
    type Conn: Connection;

    /// Open a new connection to `authority`.
    ///
    /// # Errors
    ///
    /// [`OpError::Connectivity`] if the backend cannot be reached.
    fn connect(&self, authority: &Authority) -> OpResult<Self::Conn>;

    /// Check a connection before it is lent out again or returned to the
    /// idle list. Connections failing the check are closed.
    fn validate(&self, conn: &Self::Conn) -> bool {
        conn.is_open()
    }
}

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections waiting in idle lists.
    pub idle: usize,
    /// Connections currently lent out.
    pub active: usize,
    /// Connections opened over the pool's lifetime.
    pub opened: usize,
    /// Connections closed over the pool's lifetime.
    pub closed: usize,
}

struct IdleConn<C> {
    conn: C,
    since: Instant,
}

struct PoolState<C> {
    idle: HashMap<Authority, Vec<IdleConn<C>>>,
    active: HashMap<Authority, usize>,
    shut_down: bool,
}

impl<C> PoolState<C> {
    fn active_for(&self, authority: &Authority) -> usize {
        self.active.get(authority).copied().unwrap_or(0)
    }

    fn acquire_slot(&mut self, authority: &Authority) {
        *self.active.entry(authority.clone()).or_insert(0) += 1;
    }

    fn release_slot(&mut self, authority: &Authority) {
        if let Some(count) = self.active.get_mut(authority) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.active.remove(authority);
            }
        }
    }

    fn take_idle(&mut self, authority: &Authority) -> Option<C> {
        let list = self.idle.get_mut(authority)?;
        // Most recently returned first.
        let idle = list.pop();
        if list.is_empty() {
            self.idle.remove(authority);
        }
        idle.map(|idle| idle.conn)
    }

    /// Remove idle connections to `authority` that sat longer than `timeout`.
    fn take_expired(&mut self, authority: &Authority, timeout: Duration) -> Vec<C> {
        let Some(list) = self.idle.get_mut(authority) else {
            return Vec::new();
        };
        let (keep, old): (Vec<_>, Vec<_>) = std::mem::take(list)
            .into_iter()
            .partition(|idle| idle.since.elapsed() < timeout);
        *list = keep;
        if list.is_empty() {
            self.idle.remove(authority);
        }
        old.into_iter().map(|idle| idle.conn).collect()
    }
}

/// Thread-safe pool of connections keyed by [`Authority`].
///
/// Share it through an `Arc`; [`borrow`](Self::borrow) needs one so that the
/// returned guard can give the connection back on drop.
pub struct ConnectionPool<K: Connector> {
    connector: K,
    config: PoolConfig,
    state: Mutex<PoolState<K::Conn>>,
    returned: Condvar,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl<K: Connector> ConnectionPool<K> {
    /// Create an empty pool.
    pub fn new(connector: K, config: PoolConfig) -> Self {
        Self {
            connector,
            config,
            state: Mutex::new(PoolState {
                idle: HashMap::new(),
                active: HashMap::new(),
                shut_down: false,
            }),
            returned: Condvar::new(),
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        }
    }

    /// The connector used to open connections.
    pub fn connector(&self) -> &K {
        &self.connector
    }

    /// Pool settings.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<K::Conn>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Borrow a connection to `authority`.
    ///
    /// Closes idle connections older than `idle_timeout`, then reuses an
    /// idle connection when one passes validation, otherwise opens a new one
    /// within `max_per_authority`. At the bound, the
    /// [`ExhaustedPolicy`] decides whether to wait, grow or fail.
    ///
    /// # Errors
    ///
    /// - [`OpError::PoolExhausted`] under `Fail`, or when a `Block` wait
    ///   times out
    /// - [`OpError::Connectivity`] if connecting fails or the pool was shut
    ///   down
    pub fn borrow(self: &Arc<Self>, authority: &Authority) -> OpResult<Pooled<K>> {
        let deadline = match self.config.when_exhausted {
            ExhaustedPolicy::Block { timeout } => Some(Instant::now() + timeout),
            _ => None,
        };
        let mut state = self.lock();
        loop {
            if state.shut_down {
                return Err(OpError::Connectivity {
                    authority: authority.to_string(),
                    reason: "connection pool is shut down".into(),
                });
            }

            let expired = state.take_expired(authority, self.config.idle_timeout);
            if !expired.is_empty() {
                drop(state);
                trace!(%authority, count = expired.len(), "closing expired idle connections");
                for conn in expired {
                    self.close(conn);
                }
                state = self.lock();
                continue;
            }

            if let Some(conn) = state.take_idle(authority) {
                state.acquire_slot(authority);
                drop(state);
                if self.connector.validate(&conn) {
                    trace!(%authority, "reusing pooled connection");
                    return Ok(Pooled::new(Arc::clone(self), authority.clone(), conn));
                }
                trace!(%authority, "discarding stale pooled connection");
                self.close(conn);
                state = self.lock();
                state.release_slot(authority);
                continue;
            }

            let at_bound = state.active_for(authority) >= self.config.max_per_authority;
            if !at_bound || self.config.when_exhausted == ExhaustedPolicy::Grow {
                state.acquire_slot(authority);
                drop(state);
                return match self.connector.connect(authority) {
                    Ok(conn) => {
                        self.opened.fetch_add(1, Ordering::Relaxed);
                        trace!(%authority, "opened connection");
                        Ok(Pooled::new(Arc::clone(self), authority.clone(), conn))
                    }
                    Err(err) => {
                        self.lock().release_slot(authority);
                        self.returned.notify_all();
                        Err(err)
                    }
                };
            }

            let Some(deadline) = deadline else {
                return Err(OpError::PoolExhausted {
                    authority: authority.to_string(),
                });
            };
            let now = Instant::now();
            if now >= deadline {
                return Err(OpError::PoolExhausted {
                    authority: authority.to_string(),
                });
            }
            trace!(%authority, "waiting for a returned connection");
            let (guard, _) = self
                .returned
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    fn give_back(&self, authority: &Authority, conn: K::Conn, invalidated: bool) {
        let reusable = !invalidated && self.connector.validate(&conn);
        let mut state = self.lock();
        state.release_slot(authority);
        let leftover = if reusable && !state.shut_down {
            state
                .idle
                .entry(authority.clone())
                .or_default()
                .push(IdleConn {
                    conn,
                    since: Instant::now(),
                });
            None
        } else {
            Some(conn)
        };
        drop(state);
        self.returned.notify_all();

        if let Some(conn) = leftover {
            if invalidated {
                warn!(%authority, "closing invalidated connection");
            } else {
                trace!(%authority, "closing connection not fit for reuse");
            }
            self.close(conn);
        } else {
            trace!(%authority, "returned connection to pool");
        }
    }

    fn close(&self, conn: K::Conn) {
        conn.close();
        self.closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Close idle connections older than `idle_timeout`. Returns how many
    /// were closed.
    pub fn evict_idle(&self) -> usize {
        let timeout = self.config.idle_timeout;
        let mut expired = Vec::new();
        {
            let mut state = self.lock();
            state.idle.retain(|_, list| {
                let (keep, old): (Vec<_>, Vec<_>) = std::mem::take(list)
                    .into_iter()
                    .partition(|idle| idle.since.elapsed() < timeout);
                expired.extend(old.into_iter().map(|idle| idle.conn));
                *list = keep;
                !list.is_empty()
            });
        }
        let count = expired.len();
        for conn in expired {
            self.close(conn);
        }
        if count > 0 {
            trace!(count, "evicted idle connections");
        }
        count
    }

    /// Close every idle connection and refuse further borrows. Connections
    /// still lent out are closed when their guards drop.
    pub fn shutdown(&self) {
        let drained: Vec<K::Conn> = {
            let mut state = self.lock();
            state.shut_down = true;
            state
                .idle
                .drain()
                .flat_map(|(_, list)| list.into_iter().map(|idle| idle.conn))
                .collect()
        };
        self.returned.notify_all();
        for conn in drained {
            self.close(conn);
        }
    }

    /// Current counters.
    pub fn stats(&self) -> PoolStats {
        let state = self.lock();
        PoolStats {
            idle: state.idle.values().map(Vec::len).sum(),
            active: state.active.values().sum(),
            opened: self.opened.load(Ordering::Relaxed),
            closed: self.closed.load(Ordering::Relaxed),
        }
    }
}

impl<K: Connector> std::fmt::Debug for ConnectionPool<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// A borrowed connection. Returns to its pool on drop.
pub struct Pooled<K: Connector> {
    pool: Arc<ConnectionPool<K>>,
    authority: Authority,
    conn: Option<K::Conn>,
    invalidated: bool,
}

impl<K: Connector> Pooled<K> {
    fn new(pool: Arc<ConnectionPool<K>>, authority: Authority, conn: K::Conn) -> Self {
        Self {
            pool,
            authority,
            conn: Some(conn),
            invalidated: false,
        }
    }

    /// Authority this connection belongs to.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Mark the connection as broken; it is closed instead of reused.
    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    /// Returns `true` if [`invalidate`](Self::invalidate) was called.
    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }
}

impl<K: Connector> Deref for Pooled<K> {
    type Target = K::Conn;

    fn deref(&self) -> &K::Conn {
        self.conn
            .as_ref()
            .expect("pooled connection is present until drop")
    }
}

impl<K: Connector> DerefMut for Pooled<K> {
    fn deref_mut(&mut self) -> &mut K::Conn {
        self.conn
            .as_mut()
            .expect("pooled connection is present until drop")
    }
}

impl<K: Connector> Drop for Pooled<K> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.give_back(&self.authority, conn, self.invalidated);
        }
    }
}

impl<K: Connector> std::fmt::Debug for Pooled<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pooled")
            .field("authority", &self.authority)
            .field("invalidated", &self.invalidated)
            .finish()
    }
}
