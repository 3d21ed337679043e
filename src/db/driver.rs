//! Driver boundary: live database sessions behind a trait.
//!
//! The pool, executor and transaction manager only ever see `dyn Connection`.
//! The real implementation wraps the synchronous `postgres` client; tests
//! substitute scriptable connections through the same seam.

use std::fmt;

use postgres::types::ToSql;
use postgres::{Client, NoTls, SimpleQueryMessage};
use tracing::{debug, warn};

use crate::models::Row;

/// A failure reported by the driver, classified at the boundary.
///
/// `broken` distinguishes session loss (the connection can serve no further
/// statements) from statement rejection (the connection is still good).
#[derive(Debug)]
pub struct DriverError {
    message: String,
    broken: bool,
    sql_state: Option<String>,
}

impl DriverError {
    /// The session died; the connection must be discarded.
    pub fn broken(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            broken: true,
            sql_state: None,
        }
    }

    /// The database rejected the statement; the connection is still usable.
    pub fn statement(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self {
            message: message.into(),
            broken: false,
            sql_state,
        }
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn sql_state(&self) -> Option<&str> {
        self.sql_state.as_deref()
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sql_state {
            Some(code) => write!(f, "{} (SQLSTATE: {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for DriverError {}

/// One live database session. Owned exclusively by whichever component holds
/// it; never shared across threads concurrently.
pub trait Connection: Send {
    /// Driver-reported open/closed state. Authoritative.
    fn is_open(&self) -> bool;

    /// Run a statement returning rows. Parameters are pre-encoded text
    /// literals bound positionally.
    fn query(&mut self, sql: &str, params: &[String]) -> Result<Vec<Row>, DriverError>;

    /// Run a statement for effect, returning the affected-row count.
    fn execute(&mut self, sql: &str, params: &[String]) -> Result<u64, DriverError>;

    /// Open a transaction on this session.
    fn begin(&mut self) -> Result<(), DriverError>;

    /// Commit the open transaction.
    fn commit(&mut self) -> Result<(), DriverError>;

    /// Abort the open transaction.
    fn rollback(&mut self) -> Result<(), DriverError>;
}

/// Boxed connection handle as handed out by the pool.
pub type BoxedConnection = Box<dyn Connection>;

/// Opens connections against a target DSN.
pub trait Driver: Send + Sync {
    fn connect(&self, target: &str) -> Result<BoxedConnection, DriverError>;
}

// =============================================================================
// PostgreSQL implementation
// =============================================================================

/// Driver for PostgreSQL over the synchronous `postgres` client.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgDriver;

impl PgDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Driver for PgDriver {
    fn connect(&self, target: &str) -> Result<BoxedConnection, DriverError> {
        let client = Client::connect(target, NoTls).map_err(|e| classify(&e, None))?;
        debug!("Opened PostgreSQL connection");
        Ok(Box::new(PgConnection { client }))
    }
}

struct PgConnection {
    client: Client,
}

impl PgConnection {
    fn params_as_sql(params: &[String]) -> Vec<&(dyn ToSql + Sync)> {
        params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
    }
}

impl Connection for PgConnection {
    fn is_open(&self) -> bool {
        !self.client.is_closed()
    }

    fn query(&mut self, sql: &str, params: &[String]) -> Result<Vec<Row>, DriverError> {
        if params.is_empty() {
            // Text protocol: every column arrives as text, matching the
            // string-encoded result surface directly.
            let messages = self
                .client
                .simple_query(sql)
                .map_err(|e| classify(&e, Some(&self.client)))?;
            let rows = messages
                .into_iter()
                .filter_map(|m| match m {
                    SimpleQueryMessage::Row(row) => Some(simple_row_to_row(&row)),
                    _ => None,
                })
                .collect();
            Ok(rows)
        } else {
            let refs = Self::params_as_sql(params);
            let rows = self
                .client
                .query(sql, &refs)
                .map_err(|e| classify(&e, Some(&self.client)))?;
            Ok(rows.iter().map(typed_row_to_row).collect())
        }
    }

    fn execute(&mut self, sql: &str, params: &[String]) -> Result<u64, DriverError> {
        if params.is_empty() {
            // Raw path: some statements reject the prepared protocol.
            let messages = self
                .client
                .simple_query(sql)
                .map_err(|e| classify(&e, Some(&self.client)))?;
            let affected = messages
                .into_iter()
                .filter_map(|m| match m {
                    SimpleQueryMessage::CommandComplete(n) => Some(n),
                    _ => None,
                })
                .last()
                .unwrap_or(0);
            Ok(affected)
        } else {
            let refs = Self::params_as_sql(params);
            self.client
                .execute(sql, &refs)
                .map_err(|e| classify(&e, Some(&self.client)))
        }
    }

    fn begin(&mut self) -> Result<(), DriverError> {
        self.client
            .batch_execute("BEGIN")
            .map_err(|e| classify(&e, Some(&self.client)))
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.client
            .batch_execute("COMMIT")
            .map_err(|e| classify(&e, Some(&self.client)))
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.client
            .batch_execute("ROLLBACK")
            .map_err(|e| classify(&e, Some(&self.client)))
    }
}

/// Classify a postgres error at the boundary: session loss vs statement
/// rejection. The client's closed flag is authoritative.
fn classify(err: &postgres::Error, client: Option<&Client>) -> DriverError {
    let closed = err.is_closed() || client.map(Client::is_closed).unwrap_or(false);
    if closed {
        DriverError::broken(err.to_string())
    } else {
        let sql_state = err.code().map(|c| c.code().to_string());
        DriverError::statement(err.to_string(), sql_state)
    }
}

fn simple_row_to_row(row: &postgres::SimpleQueryRow) -> Row {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        out.push(column.name(), row.get(idx).unwrap_or(""));
    }
    out
}

/// Convert a typed row to the text-encoded result surface. SQL NULL and
/// column types without a defined text conversion encode as the empty
/// string.
fn typed_row_to_row(row: &postgres::Row) -> Row {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = match column.type_().name() {
            "bool" => row
                .try_get::<_, Option<bool>>(idx)
                .map(|v| v.map(|b| if b { "true".to_string() } else { "false".to_string() })),
            "int2" => row
                .try_get::<_, Option<i16>>(idx)
                .map(|v| v.map(|n| n.to_string())),
            "int4" => row
                .try_get::<_, Option<i32>>(idx)
                .map(|v| v.map(|n| n.to_string())),
            "int8" => row
                .try_get::<_, Option<i64>>(idx)
                .map(|v| v.map(|n| n.to_string())),
            "float4" => row
                .try_get::<_, Option<f32>>(idx)
                .map(|v| v.map(|n| n.to_string())),
            "float8" => row
                .try_get::<_, Option<f64>>(idx)
                .map(|v| v.map(|n| n.to_string())),
            _ => row.try_get::<_, Option<String>>(idx),
        };
        let text = match value {
            Ok(v) => v.unwrap_or_default(),
            Err(e) => {
                warn!(
                    column = column.name(),
                    ty = %column.type_(),
                    error = %e,
                    "No text conversion for column value"
                );
                String::new()
            }
        };
        out.push(column.name(), text);
    }
    out
}
