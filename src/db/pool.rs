//! Fixed-capacity blocking connection pool.
//!
//! The pool owns every idle connection and hands them out under mutual
//! exclusion. `acquire` is the single suspension point in the crate: it
//! parks the calling thread on a condition variable until a connection is
//! idle or shutdown is observed. A bounded pool gives backpressure: a burst
//! of callers beyond capacity queues on `acquire` instead of opening
//! unbounded connections.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::db::driver::{BoxedConnection, Driver};

struct PoolState {
    idle: VecDeque<BoxedConnection>,
    shutting_down: bool,
}

/// A bounded pool of live connections with blocking checkout.
///
/// Every connection is in exactly one place at a time: the idle set, the
/// hands of one borrower, or destroyed.
pub struct ConnectionPool {
    state: Mutex<PoolState>,
    available: Condvar,
    capacity: usize,
}

impl ConnectionPool {
    /// Eagerly open `capacity` connections against `target`.
    ///
    /// Each failed open is logged and skipped, so the pool may start with
    /// fewer than `capacity` idle connections. That is not a construction
    /// error; callers observe it through `idle_count`.
    pub fn new(driver: Arc<dyn Driver>, target: &str, capacity: usize) -> Self {
        info!(capacity, "Initializing connection pool");
        let mut idle = VecDeque::with_capacity(capacity);
        for _ in 0..capacity {
            match driver.connect(target) {
                Ok(conn) if conn.is_open() => {
                    idle.push_back(conn);
                    debug!(idle = idle.len(), "Connection created and pooled");
                }
                Ok(_) => {
                    warn!("Driver returned a connection that is not open; discarding");
                }
                Err(e) => {
                    warn!(error = %e, "Failed to create pooled connection");
                }
            }
        }
        info!(idle = idle.len(), capacity, "Connection pool initialized");
        Self {
            state: Mutex::new(PoolState {
                idle,
                shutting_down: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Block until a connection is idle or the pool is shutting down.
    ///
    /// Returns `None` only when shutdown has been initiated and no idle
    /// connections remain.
    pub fn acquire(&self) -> Option<BoxedConnection> {
        let mut state = self.state.lock();
        while state.idle.is_empty() && !state.shutting_down {
            self.available.wait(&mut state);
        }
        let conn = state.idle.pop_front();
        match &conn {
            Some(_) => debug!(idle = state.idle.len(), "Connection acquired from pool"),
            None => debug!("Acquire observed shutdown with no idle connections"),
        }
        conn
    }

    /// Return a borrowed connection to the idle set, waking one waiter.
    ///
    /// Must not be called with a connection known to be broken; use
    /// [`discard`](Self::discard) for those. After shutdown the connection
    /// is destroyed instead of pooled.
    pub fn release(&self, conn: BoxedConnection) {
        let mut state = self.state.lock();
        if state.shutting_down {
            drop(state);
            debug!("Pool shutting down; destroying released connection");
            drop(conn);
            return;
        }
        state.idle.push_back(conn);
        debug!(idle = state.idle.len(), "Connection released to pool");
        self.available.notify_one();
    }

    /// Destroy a connection that must never return to the idle set.
    pub fn discard(&self, conn: BoxedConnection) {
        warn!("Discarding broken connection");
        drop(conn);
    }

    /// Initiate shutdown: wake all waiters and destroy every idle
    /// connection. Connections currently checked out are destroyed when
    /// their holder releases them. Idempotent.
    pub fn shutdown(&self) {
        let drained: Vec<BoxedConnection> = {
            let mut state = self.state.lock();
            state.shutting_down = true;
            self.available.notify_all();
            state.idle.drain(..).collect()
        };
        if !drained.is_empty() {
            info!(count = drained.len(), "Destroying idle connections");
        }
        // Closing sessions can block on the wire; do it outside the lock.
        drop(drained);
        info!("Connection pool shut down");
    }

    /// Number of currently idle connections.
    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.state.lock().shutting_down
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
