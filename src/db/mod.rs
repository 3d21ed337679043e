//! Database access core.
//!
//! - Driver boundary traits and the PostgreSQL implementation
//! - Fixed-capacity blocking connection pool
//! - Resilient single-retry statement executor
//! - Explicit transaction lifecycle

pub mod driver;
pub mod executor;
pub mod pool;
pub mod transaction;

pub use driver::{BoxedConnection, Connection, Driver, DriverError, PgDriver};
pub use executor::ResilientExecutor;
pub use pool::ConnectionPool;
pub use transaction::TransactionManager;
