//! Row representation for query execution.
//!
//! Rows are maps from canonical selector keys (`agg(db.table.col)`) to
//! typed values. Keying by selector rather than by position is what lets
//! the reader pipeline stack joins, projections, and aggregations without
//! re-shuffling columns.

use std::collections::HashMap;

use crate::encoding::encode_selector;
use crate::value::{SqlType, TypedValue};

/// A single row of named values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: HashMap<String, TypedValue>,
}

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value under a selector key.
    #[must_use]
    pub fn get(&self, selector: &str) -> Option<&TypedValue> {
        self.values.get(selector)
    }

    /// Inserts a value under a selector key.
    pub fn insert(&mut self, selector: impl Into<String>, value: TypedValue) {
        self.values.insert(selector.into(), value);
    }

    /// Merges all values of `other` into this row.
    pub fn merge(&mut self, other: &Row) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
    }

    /// Number of values in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(selector, value)` pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TypedValue)> {
        self.values.iter()
    }
}

/// Description of one output column of a row reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColDescriptor {
    /// Aggregate function name, empty for plain columns.
    pub agg_fn: String,
    /// Database name.
    pub database: String,
    /// Table name or alias.
    pub table: String,
    /// Column name.
    pub column: String,
    /// Output type.
    pub sql_type: SqlType,
}

impl ColDescriptor {
    /// Creates a plain column descriptor.
    #[must_use]
    pub fn new(
        database: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        sql_type: SqlType,
    ) -> Self {
        Self {
            agg_fn: String::new(),
            database: database.into(),
            table: table.into(),
            column: column.into(),
            sql_type,
        }
    }

    /// The canonical selector key for this column.
    #[must_use]
    pub fn selector(&self) -> String {
        encode_selector(&self.agg_fn, &self.database, &self.table, &self.column)
    }
}

/// Column descriptors of a reader, keyed by selector.
pub type ColsByName = HashMap<String, ColDescriptor>;

/// Builds a [`ColsByName`] map from descriptors.
#[must_use]
pub fn cols_by_name(cols: &[ColDescriptor]) -> ColsByName {
    cols.iter().map(|c| (c.selector(), c.clone())).collect()
}
