//! Table Management Module
//!
//! This module defines the Table type that represents a table's schema.
//! Column names are matched ignoring ASCII case.

use super::column::Column;
use serde::{Serialize, Deserialize};

/// Represents a database table schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name
    name: String,
    /// Columns in declaration order
    columns: Vec<Column>,
}

impl Table {
    /// Create a new table with the given name and columns
    pub fn new(name: String, columns: Vec<Column>) -> Self {
        Table { name, columns }
    }

    /// Get the table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get all columns
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Get a column by name
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// Check if the table has a column with the given name
    pub fn has_column(&self, name: &str) -> bool {
        self.get_column(name).is_some()
    }

    /// Get the column index for a column name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name().eq_ignore_ascii_case(name))
    }
}
