//! Result row representation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single result row: an ordered mapping from column name to the value's
/// text encoding. Column order follows the order returned by the database;
/// names are unique within a row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    columns: IndexMap<String, String>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column. Later values for the same name overwrite in place,
    /// keeping the original position.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.columns.insert(name.into(), value.into());
    }

    /// Look up a column value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.columns.get(name).map(String::as_str)
    }

    /// Number of columns in the row.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate columns in database order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}
