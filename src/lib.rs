//! Pooled, retrying PostgreSQL access layer.
//!
//! The crate is built around three pieces: a fixed-capacity blocking
//! [`ConnectionPool`](db::ConnectionPool), a
//! [`ResilientExecutor`](db::ResilientExecutor) that retries a statement
//! once when the connection it borrowed turns out to be dead, and a
//! [`TransactionManager`](db::TransactionManager) that pins one connection
//! for an explicit begin/commit/rollback lifecycle. The
//! [`Adapter`](adapter::Adapter) facade wires them together behind a
//! sentinel-value surface with lifecycle events.

pub mod adapter;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;

pub use adapter::Adapter;
pub use config::Config;
pub use error::{AdapterError, AdapterResult};
