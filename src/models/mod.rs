//! Data models for the adapter.

pub mod params;
pub mod row;

pub use params::{encode_params, ParamValue, MAX_PARAMS};
pub use row::Row;
