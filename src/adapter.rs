//! Adapter facade over the pool, executor and transaction manager.
//!
//! The adapter owns one connection pool and delegates all data operations.
//! Its wrapped surface degrades failures to sentinel values (empty result
//! set, `-1`, `false`) paired with an emitted event; callers that need to
//! distinguish "zero rows" from "failed" use the `try_*` methods, which
//! return the underlying `Result`.

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::db::driver::Driver;
use crate::db::executor::ResilientExecutor;
use crate::db::pool::ConnectionPool;
use crate::db::transaction::TransactionManager;
use crate::error::{AdapterError, AdapterResult};
use crate::events::{AdapterEvent, EventBus};
use crate::models::{ParamValue, Row};

/// Pool capacity used when none is configured.
pub const DEFAULT_POOL_CAPACITY: usize = 4;

/// Affected-rows sentinel meaning "execution did not happen at all".
pub const NON_QUERY_FAILED: i64 = -1;

struct RuntimeState {
    pool: Arc<ConnectionPool>,
    transactions: Arc<TransactionManager>,
}

struct AdapterConfigState {
    target: String,
    capacity: usize,
    runtime: Option<RuntimeState>,
}

/// Database adapter: configuration, delegation and event emission.
pub struct Adapter {
    driver: Arc<dyn Driver>,
    executor: ResilientExecutor,
    state: Mutex<AdapterConfigState>,
    events: EventBus,
}

impl Adapter {
    /// Create an adapter with no pool; set a connection target to build one.
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            executor: ResilientExecutor::new(),
            state: Mutex::new(AdapterConfigState {
                target: String::new(),
                capacity: DEFAULT_POOL_CAPACITY,
                runtime: None,
            }),
            events: EventBus::new(),
        }
    }

    /// Subscribe to adapter events.
    pub fn subscribe(&self) -> Receiver<AdapterEvent> {
        self.events.subscribe()
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    /// Set the connection target and rebuild the pool. An empty target
    /// tears the pool down without creating a new one.
    pub fn set_connection_target(&self, target: impl Into<String>) {
        let mut state = self.state.lock();
        state.target = target.into();
        self.rebuild_runtime(&mut state);
    }

    /// Currently configured connection target.
    pub fn connection_target(&self) -> String {
        self.state.lock().target.clone()
    }

    /// Set the pool capacity. Zero is rejected and the existing capacity is
    /// retained. When a pool already exists it is rebuilt at the new size.
    pub fn set_pool_capacity(&self, capacity: usize) {
        if capacity == 0 {
            warn!("Pool capacity must be greater than 0; keeping current configuration");
            return;
        }
        let mut state = self.state.lock();
        state.capacity = capacity;
        if state.runtime.is_some() {
            self.rebuild_runtime(&mut state);
        }
    }

    /// Currently configured pool capacity.
    pub fn pool_capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Report whether a pool is available. Does not open new connections;
    /// the pool was built eagerly when the target was set.
    pub fn connect(&self) -> bool {
        let state = self.state.lock();
        if state.runtime.is_none() {
            warn!("Connection pool is not initialized; set a connection target first");
            return false;
        }
        true
    }

    /// Shut the pool down, rolling back any open transaction first.
    pub fn disconnect(&self) {
        let mut state = self.state.lock();
        if let Some(runtime) = state.runtime.take() {
            info!("Shutting down connection pool");
            if runtime.transactions.is_active() {
                let _ = runtime.transactions.rollback();
                self.events.emit(AdapterEvent::TransactionRolledBack);
            }
            runtime.pool.shutdown();
        } else {
            info!("No connection pool to disconnect");
        }
    }

    fn rebuild_runtime(&self, state: &mut AdapterConfigState) {
        if let Some(old) = state.runtime.take() {
            if old.transactions.is_active() {
                let _ = old.transactions.rollback();
            }
            old.pool.shutdown();
        }
        if !state.target.is_empty() {
            let pool = Arc::new(ConnectionPool::new(
                Arc::clone(&self.driver),
                &state.target,
                state.capacity,
            ));
            let transactions = Arc::new(TransactionManager::new(Arc::clone(&pool)));
            state.runtime = Some(RuntimeState { pool, transactions });
        }
    }

    /// Snapshot the live pool and transaction manager without holding the
    /// configuration lock across blocking pool operations.
    fn runtime(&self) -> AdapterResult<(Arc<ConnectionPool>, Arc<TransactionManager>)> {
        let state = self.state.lock();
        match &state.runtime {
            Some(rt) => Ok((Arc::clone(&rt.pool), Arc::clone(&rt.transactions))),
            None => Err(AdapterError::acquisition_failed(
                "connection pool is not initialized",
            )),
        }
    }

    // -------------------------------------------------------------------------
    // Statement execution
    // -------------------------------------------------------------------------

    /// Execute a row-returning statement, with failures surfaced as errors.
    pub fn try_execute_query(&self, sql: &str, params: &[ParamValue]) -> AdapterResult<Vec<Row>> {
        let (pool, _) = self.runtime()?;
        self.executor.execute_query(&pool, sql, params)
    }

    /// Execute a row-returning statement. Failures yield an empty result
    /// set (indistinguishable from zero matching rows) plus a failure event.
    pub fn execute_query(&self, sql: &str, params: &[ParamValue]) -> Vec<Row> {
        match self.try_execute_query(sql, params) {
            Ok(rows) => {
                self.events.emit(AdapterEvent::QueryCompleted { rows: rows.clone() });
                rows
            }
            Err(e) => {
                self.emit_failure(sql, &e, /* non_query = */ false);
                Vec::new()
            }
        }
    }

    /// Execute an effect statement, with failures surfaced as errors.
    pub fn try_execute_non_query(&self, sql: &str, params: &[ParamValue]) -> AdapterResult<u64> {
        let (pool, _) = self.runtime()?;
        self.executor.execute_non_query(&pool, sql, params)
    }

    /// Execute an effect statement. Failures yield [`NON_QUERY_FAILED`]
    /// plus a failure event.
    pub fn execute_non_query(&self, sql: &str, params: &[ParamValue]) -> i64 {
        match self.try_execute_non_query(sql, params) {
            Ok(affected) => {
                self.events
                    .emit(AdapterEvent::NonQueryCompleted { affected_rows: affected });
                affected as i64
            }
            Err(e) => {
                self.emit_failure(sql, &e, /* non_query = */ true);
                NON_QUERY_FAILED
            }
        }
    }

    fn emit_failure(&self, sql: &str, err: &AdapterError, non_query: bool) {
        warn!(sql = %sql, error = %err, "Statement execution failed");
        match err {
            AdapterError::BrokenConnection { .. }
            | AdapterError::PoolExhausted { .. }
            | AdapterError::AcquisitionFailed { .. } => {
                self.events.emit(AdapterEvent::ConnectionError {
                    error: err.to_string(),
                });
            }
            _ => {}
        }
        if non_query {
            self.events.emit(AdapterEvent::NonQueryFailed {
                statement: sql.to_string(),
                error: err.to_string(),
            });
        } else {
            self.events.emit(AdapterEvent::QueryFailed {
                statement: sql.to_string(),
                error: err.to_string(),
            });
        }
    }

    // -------------------------------------------------------------------------
    // Async wrappers
    // -------------------------------------------------------------------------
    //
    // These add no concurrency semantics beyond "the completion notification
    // happens after execution finishes": the synchronous path runs on a
    // worker thread and emits the same events it always does.

    /// Run `execute_query` on a worker thread; observe the outcome through
    /// the event subscription.
    pub fn execute_query_async(self: &Arc<Self>, sql: String, params: Vec<ParamValue>) {
        let adapter = Arc::clone(self);
        thread::spawn(move || {
            let _ = adapter.execute_query(&sql, &params);
        });
    }

    /// Run `execute_non_query` on a worker thread; observe the outcome
    /// through the event subscription.
    pub fn execute_non_query_async(self: &Arc<Self>, sql: String, params: Vec<ParamValue>) {
        let adapter = Arc::clone(self);
        thread::spawn(move || {
            let _ = adapter.execute_non_query(&sql, &params);
        });
    }

    // -------------------------------------------------------------------------
    // Transactions
    // -------------------------------------------------------------------------

    /// Begin a transaction. Returns `false` when one is already active or
    /// acquisition fails.
    pub fn begin_transaction(&self) -> bool {
        let transactions = match self.runtime() {
            Ok((_, tx)) => tx,
            Err(e) => {
                warn!(error = %e, "Cannot begin transaction");
                self.events.emit(AdapterEvent::TransactionFailed {
                    error: e.to_string(),
                });
                return false;
            }
        };
        match transactions.begin() {
            Ok(()) => {
                self.events.emit(AdapterEvent::TransactionStarted);
                true
            }
            Err(e @ AdapterError::InvalidState { .. }) => {
                warn!(error = %e, "Transaction already in progress");
                false
            }
            Err(e) => {
                warn!(error = %e, "Failed to begin transaction");
                self.events.emit(AdapterEvent::TransactionFailed {
                    error: e.to_string(),
                });
                false
            }
        }
    }

    /// Commit the active transaction.
    pub fn commit_transaction(&self) -> bool {
        let transactions = match self.runtime() {
            Ok((_, tx)) => tx,
            Err(e) => {
                self.events.emit(AdapterEvent::TransactionFailed {
                    error: e.to_string(),
                });
                return false;
            }
        };
        match transactions.commit() {
            Ok(()) => {
                self.events.emit(AdapterEvent::TransactionCommitted);
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to commit transaction");
                self.events.emit(AdapterEvent::TransactionFailed {
                    error: e.to_string(),
                });
                false
            }
        }
    }

    /// Roll back the active transaction. Returns `false` when none is
    /// active.
    pub fn rollback_transaction(&self) -> bool {
        let transactions = match self.runtime() {
            Ok((_, tx)) => tx,
            Err(e) => {
                warn!(error = %e, "Cannot rollback transaction");
                return false;
            }
        };
        match transactions.rollback() {
            Ok(()) => {
                self.events.emit(AdapterEvent::TransactionRolledBack);
                true
            }
            Err(e) => {
                warn!(error = %e, "No active transaction to rollback");
                false
            }
        }
    }

    /// Execute a row-returning statement inside the active transaction.
    /// Failures (including "no active transaction") yield an empty result
    /// set plus a failure event.
    pub fn execute_query_in_transaction(&self, sql: &str, params: &[ParamValue]) -> Vec<Row> {
        let result = self
            .runtime()
            .and_then(|(_, tx)| tx.execute_query_in_transaction(sql, params));
        match result {
            Ok(rows) => {
                self.events.emit(AdapterEvent::QueryCompleted { rows: rows.clone() });
                rows
            }
            Err(e) => {
                warn!(sql = %sql, error = %e, "Query in transaction failed");
                self.events.emit(AdapterEvent::QueryFailed {
                    statement: sql.to_string(),
                    error: e.to_string(),
                });
                Vec::new()
            }
        }
    }

    /// Execute an effect statement inside the active transaction. Failures
    /// yield [`NON_QUERY_FAILED`] plus a failure event.
    pub fn execute_non_query_in_transaction(&self, sql: &str, params: &[ParamValue]) -> i64 {
        let result = self
            .runtime()
            .and_then(|(_, tx)| tx.execute_non_query_in_transaction(sql, params));
        match result {
            Ok(affected) => {
                self.events
                    .emit(AdapterEvent::NonQueryCompleted { affected_rows: affected });
                affected as i64
            }
            Err(e) => {
                warn!(sql = %sql, error = %e, "Non-query in transaction failed");
                self.events.emit(AdapterEvent::NonQueryFailed {
                    statement: sql.to_string(),
                    error: e.to_string(),
                });
                NON_QUERY_FAILED
            }
        }
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(runtime) = state.runtime.take() {
            if runtime.transactions.is_active() {
                let _ = runtime.transactions.rollback();
            }
            runtime.pool.shutdown();
        }
    }
}
