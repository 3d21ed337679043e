//! Explicit multi-statement transaction lifecycle.
//!
//! A transaction holds one connection outside normal pool rotation from
//! `begin` until `commit` or `rollback`. The state machine is
//! Idle → Active → Idle; it is not reentrant and not nestable, and the
//! manager assumes a single logical caller drives it while Active. `begin`
//! reserves the slot before blocking on the pool checkout, so the state
//! stays observable while a begin waits for a connection.
//!
//! There is no retry inside a transaction: a broken connection surfaces as a
//! statement failure, the transaction stays Active, and the caller is
//! expected to roll back.

use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::db::driver::BoxedConnection;
use crate::db::executor::is_schema_statement;
use crate::db::pool::ConnectionPool;
use crate::error::{AdapterError, AdapterResult};
use crate::models::{encode_params, ParamValue, Row};

enum TxState {
    Idle,
    /// A begin is in flight: the slot is reserved while the pool checkout
    /// runs outside the state lock.
    Beginning,
    Active(BoxedConnection),
}

/// Manages at most one open transaction over a shared pool.
pub struct TransactionManager {
    pool: Arc<ConnectionPool>,
    state: Mutex<TxState>,
}

impl TransactionManager {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self {
            pool,
            state: Mutex::new(TxState::Idle),
        }
    }

    /// Whether a transaction is currently open.
    pub fn is_active(&self) -> bool {
        matches!(*self.state.lock(), TxState::Active(_))
    }

    /// Open a transaction, taking one connection from the pool and holding
    /// it exclusively until `commit` or `rollback`.
    pub fn begin(&self) -> AdapterResult<()> {
        {
            let mut state = self.state.lock();
            if !matches!(*state, TxState::Idle) {
                return Err(AdapterError::invalid_state("transaction already active"));
            }
            *state = TxState::Beginning;
        }

        // The checkout can block on the pool. The state lock must not be
        // held across it, or every observer of the state (including a
        // shutdown that wants to wake the pool) wedges behind the pending
        // begin.
        let mut conn = match self.checkout() {
            Ok(conn) => conn,
            Err(e) => {
                *self.state.lock() = TxState::Idle;
                return Err(e);
            }
        };

        if let Err(e) = conn.begin() {
            warn!(error = %e, "Failed to start transaction");
            self.free(conn);
            *self.state.lock() = TxState::Idle;
            return Err(e.into());
        }

        *self.state.lock() = TxState::Active(conn);
        info!("Transaction started");
        Ok(())
    }

    /// Take one open connection from the pool.
    fn checkout(&self) -> AdapterResult<BoxedConnection> {
        let conn = self
            .pool
            .acquire()
            .ok_or_else(|| AdapterError::acquisition_failed("no connection available"))?;
        if !conn.is_open() {
            // Never pool a dead connection; nothing usable was taken.
            self.pool.discard(conn);
            return Err(AdapterError::acquisition_failed(
                "acquired connection is not open",
            ));
        }
        Ok(conn)
    }

    /// Execute a row-returning statement on the held connection.
    pub fn execute_query_in_transaction(
        &self,
        sql: &str,
        params: &[ParamValue],
    ) -> AdapterResult<Vec<Row>> {
        let mut state = self.state.lock();
        let conn = match *state {
            TxState::Active(ref mut conn) => conn,
            _ => return Err(AdapterError::invalid_state("no active transaction")),
        };

        let encoded = encode_params(params)?;
        debug!(sql = %sql, params = params.len(), "Executing query in transaction");
        let rows = conn.query(sql, &encoded)?;
        debug!(rows = rows.len(), "Query in transaction executed");
        Ok(rows)
    }

    /// Execute an effect statement on the held connection, with the same
    /// schema-definition affected-rows convention as the executor.
    pub fn execute_non_query_in_transaction(
        &self,
        sql: &str,
        params: &[ParamValue],
    ) -> AdapterResult<u64> {
        let mut state = self.state.lock();
        let conn = match *state {
            TxState::Active(ref mut conn) => conn,
            _ => return Err(AdapterError::invalid_state("no active transaction")),
        };

        let encoded = encode_params(params)?;
        debug!(sql = %sql, params = params.len(), "Executing non-query in transaction");
        let affected = conn.execute(sql, &encoded)?;
        let affected = if is_schema_statement(sql) { 0 } else { affected };
        debug!(affected, "Non-query in transaction executed");
        Ok(affected)
    }

    /// Commit the open transaction. On failure a compensating rollback is
    /// attempted and the original commit error is reported; either way the
    /// held connection is freed and the state ends Idle.
    pub fn commit(&self) -> AdapterResult<()> {
        let mut state = self.state.lock();
        let mut conn = match mem::replace(&mut *state, TxState::Idle) {
            TxState::Active(conn) => conn,
            other => {
                *state = other;
                return Err(AdapterError::invalid_state("no active transaction to commit"));
            }
        };

        match conn.commit() {
            Ok(()) => {
                self.free(conn);
                info!("Transaction committed");
                Ok(())
            }
            Err(commit_err) => {
                warn!(error = %commit_err, "Commit failed; rolling back");
                if let Err(rollback_err) = conn.rollback() {
                    warn!(error = %rollback_err, "Compensating rollback failed");
                }
                self.free(conn);
                Err(commit_err.into())
            }
        }
    }

    /// Abort the open transaction. Abort errors are logged and swallowed;
    /// the held connection is always freed and the state always ends Idle.
    pub fn rollback(&self) -> AdapterResult<()> {
        let mut state = self.state.lock();
        let mut conn = match mem::replace(&mut *state, TxState::Idle) {
            TxState::Active(conn) => conn,
            other => {
                *state = other;
                return Err(AdapterError::invalid_state(
                    "no active transaction to rollback",
                ));
            }
        };

        if let Err(e) = conn.rollback() {
            warn!(error = %e, "Error during rollback");
        }
        self.free(conn);
        info!("Transaction rolled back");
        Ok(())
    }

    /// Return a connection to the pool if it is still usable, destroy it
    /// otherwise. The pool never takes back a known-broken connection.
    fn free(&self, conn: BoxedConnection) {
        if conn.is_open() {
            self.pool.release(conn);
        } else {
            self.pool.discard(conn);
        }
    }
}

impl Drop for TransactionManager {
    fn drop(&mut self) {
        // Teardown while Active is a forced rollback.
        let state = self.state.get_mut();
        if let TxState::Active(mut conn) = mem::replace(state, TxState::Idle) {
            warn!("Transaction manager dropped while active; rolling back");
            if let Err(e) = conn.rollback() {
                warn!(error = %e, "Error during forced rollback");
            }
            if conn.is_open() {
                self.pool.release(conn);
            } else {
                self.pool.discard(conn);
            }
        }
    }
}
