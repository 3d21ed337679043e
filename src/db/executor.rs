//! Resilient statement execution.
//!
//! One statement, one pooled connection, at most two attempts. The executor
//! distinguishes "the connection died" (worth one retry against a fresh
//! resource) from "the statement was rejected" (retrying would repeat the
//! same failure): broken connections are discarded and the statement is
//! attempted once more on a newly acquired connection; every other error
//! aborts immediately with the connection released back to the pool.

use tracing::{debug, error, warn};

use crate::db::driver::{Connection, DriverError};
use crate::db::pool::ConnectionPool;
use crate::error::{AdapterError, AdapterResult};
use crate::models::{encode_params, ParamValue, Row};

/// Total attempts per statement, including the first.
const MAX_ATTEMPTS: u32 = 2;

/// Statement executor with broken-connection retry.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResilientExecutor;

impl ResilientExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Execute a statement returning rows.
    pub fn execute_query(
        &self,
        pool: &ConnectionPool,
        sql: &str,
        params: &[ParamValue],
    ) -> AdapterResult<Vec<Row>> {
        // Validation happens before acquisition so a rejected call never
        // touches the pool.
        let encoded = encode_params(params)?;
        debug!(sql = %sql, params = params.len(), "Executing query");
        let rows = self.with_retry(pool, |conn| conn.query(sql, &encoded))?;
        debug!(rows = rows.len(), "Query executed");
        Ok(rows)
    }

    /// Execute a statement for effect, returning the affected-row count.
    ///
    /// Schema-definition statements report 0 by convention instead of the
    /// driver's count; some backends cannot report one for DDL.
    pub fn execute_non_query(
        &self,
        pool: &ConnectionPool,
        sql: &str,
        params: &[ParamValue],
    ) -> AdapterResult<u64> {
        let encoded = encode_params(params)?;
        debug!(sql = %sql, params = params.len(), "Executing non-query");
        let affected = self.with_retry(pool, |conn| conn.execute(sql, &encoded))?;
        let affected = if is_schema_statement(sql) { 0 } else { affected };
        debug!(affected, "Non-query executed");
        Ok(affected)
    }

    /// Acquire a connection and run `op` with at most [`MAX_ATTEMPTS`]
    /// attempts. A connection observed closed before execution counts as a
    /// broken attempt.
    fn with_retry<T>(
        &self,
        pool: &ConnectionPool,
        mut op: impl FnMut(&mut dyn Connection) -> Result<T, DriverError>,
    ) -> AdapterResult<T> {
        let mut conn = pool
            .acquire()
            .ok_or_else(|| AdapterError::pool_exhausted("no connection available"))?;

        for attempt in 0..MAX_ATTEMPTS {
            if !conn.is_open() {
                warn!(attempt, "Connection not open before execution");
                pool.discard(conn);
                if attempt + 1 == MAX_ATTEMPTS {
                    return Err(AdapterError::broken_connection(
                        "connection not open after retry",
                    ));
                }
                conn = pool
                    .acquire()
                    .ok_or_else(|| AdapterError::pool_exhausted("no connection available"))?;
                continue;
            }

            match op(conn.as_mut()) {
                Ok(value) => {
                    pool.release(conn);
                    return Ok(value);
                }
                Err(e) if e.is_broken() => {
                    warn!(attempt, error = %e, "Execution failed on broken connection");
                    pool.discard(conn);
                    if attempt + 1 == MAX_ATTEMPTS {
                        return Err(e.into());
                    }
                    conn = pool
                        .acquire()
                        .ok_or_else(|| AdapterError::pool_exhausted("no connection available"))?;
                }
                Err(e) => {
                    // Statement-level failure; the connection is presumed
                    // good and goes back to the pool.
                    pool.release(conn);
                    return Err(e.into());
                }
            }
        }

        error!("Execution loop finished without returning; this should not happen");
        Err(AdapterError::broken_connection("retry attempts exhausted"))
    }
}

/// Classify a statement by its leading keyword: CREATE, DROP, ALTER and
/// TRUNCATE are schema definition, case-insensitive with surrounding
/// whitespace ignored.
pub(crate) fn is_schema_statement(sql: &str) -> bool {
    let trimmed = sql.trim();
    ["CREATE", "DROP", "ALTER", "TRUNCATE"].iter().any(|kw| {
        trimmed
            .as_bytes()
            .get(..kw.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(kw.as_bytes()))
    })
}
