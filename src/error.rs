//! Error types for the adapter.
//!
//! All error variants are defined with `thiserror`. The taxonomy matters for
//! control flow: `BrokenConnection` is the one class the executor retries,
//! everything else propagates immediately.

use thiserror::Error;

use crate::db::driver::DriverError;

#[derive(Error, Debug)]
pub enum AdapterError {
    /// The connection died mid-use. Retried exactly once at the executor
    /// level; terminal inside an active transaction.
    #[error("Broken connection: {message}")]
    BrokenConnection { message: String },

    /// The pool yielded no connection (shut down, or drained with no waiter
    /// deadline).
    #[error("Connection pool exhausted: {message}")]
    PoolExhausted { message: String },

    /// A transaction could not take a connection from the pool.
    #[error("Failed to acquire connection: {message}")]
    AcquisitionFailed { message: String },

    /// A parameter has no literal encoding, or the list exceeds the cap.
    #[error("Unsupported parameter: {message}")]
    UnsupportedParameter { message: String },

    /// The database rejected the statement. Never retried.
    #[error("Statement failed: {message}")]
    Statement {
        message: String,
        /// e.g. "42601" for a syntax error
        sql_state: Option<String>,
    },

    /// A transaction operation attempted outside its required state.
    #[error("Invalid transaction state: {message}")]
    InvalidState { message: String },
}

impl AdapterError {
    /// Create a broken connection error.
    pub fn broken_connection(message: impl Into<String>) -> Self {
        Self::BrokenConnection {
            message: message.into(),
        }
    }

    /// Create a pool exhausted error.
    pub fn pool_exhausted(message: impl Into<String>) -> Self {
        Self::PoolExhausted {
            message: message.into(),
        }
    }

    /// Create an acquisition failed error.
    pub fn acquisition_failed(message: impl Into<String>) -> Self {
        Self::AcquisitionFailed {
            message: message.into(),
        }
    }

    /// Create an unsupported parameter error.
    pub fn unsupported_parameter(message: impl Into<String>) -> Self {
        Self::UnsupportedParameter {
            message: message.into(),
        }
    }

    /// Create a statement error with optional SQLSTATE.
    pub fn statement(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Statement {
            message: message.into(),
            sql_state,
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Check if this error is retryable against a fresh connection.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BrokenConnection { .. })
    }
}

/// Convert driver errors to AdapterError, preserving the broken-connection
/// classification the retry loop dispatches on.
impl From<DriverError> for AdapterError {
    fn from(err: DriverError) -> Self {
        if err.is_broken() {
            AdapterError::broken_connection(err.to_string())
        } else {
            let sql_state = err.sql_state().map(str::to_string);
            AdapterError::statement(err.to_string(), sql_state)
        }
    }
}

/// Result type alias for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;
